//! # Toolchain Module
//!
//! Locates the MSVC compiler, MSBuild, and the Windows SDK headers from
//! their installation-convention paths, and provides the process-invocation
//! seam the build tasks go through.
//!
//! The `ToolRunner` trait exists so tests can record the exact command lines
//! the tasks would run without spawning real tools. Production code uses
//! [`Spawner`], which blocks on the child process and reports its exit code.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use log::debug;

/// MSVC toolset version under `VC/Tools/MSVC/`. Update when Visual Studio is
/// upgraded.
pub const MSVC_TOOLS_VERSION: &str = "14.31.31103";

/// Windows SDK version under `Windows Kits/10/Include/`.
pub const SDK_VERSION: &str = "10.0.19041.0";

/// Resolved locations of the external tools. Only the `headers` target needs
/// the compiler and SDK; `debug`/`release` need MSBuild.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Root of the MSVC toolset (contains `bin/` and `include/`).
    pub msvc_root: PathBuf,
    /// `cl.exe`, the x64-hosted x64-targeting compiler.
    pub compiler: PathBuf,
    /// `MSBuild.exe`.
    pub msbuild: PathBuf,
    /// SDK include root (contains `um/`, `shared/`, `ucrt/`).
    pub sdk_include: PathBuf,
}

impl Toolchain {
    /// Resolve tool paths from the standard installation locations, rooted at
    /// the `ProgramFiles` environment variables.
    pub fn from_env() -> Result<Self> {
        let program_files = std::env::var("ProgramFiles")
            .context("ProgramFiles environment variable is not set")?;
        let program_files_x86 = std::env::var("ProgramFiles(x86)")
            .context("ProgramFiles(x86) environment variable is not set")?;

        let visual_studio =
            Path::new(&program_files).join("Microsoft Visual Studio/2022/Community");
        let msvc_root = visual_studio
            .join("VC/Tools/MSVC")
            .join(MSVC_TOOLS_VERSION);
        Ok(Self {
            compiler: msvc_root.join("bin/Hostx64/x64/cl.exe"),
            msbuild: visual_studio.join("MSBuild/Current/Bin/MSBuild.exe"),
            sdk_include: Path::new(&program_files_x86)
                .join("Windows Kits/10/Include")
                .join(SDK_VERSION),
            msvc_root,
        })
    }

    /// The toolset's own include directory (CRT and C++ standard library).
    pub fn compiler_include(&self) -> PathBuf {
        self.msvc_root.join("include")
    }

    /// SDK include directories, in the order they are passed to the compiler.
    pub fn sdk_includes(&self) -> [PathBuf; 3] {
        [
            self.sdk_include.join("um"),
            self.sdk_include.join("shared"),
            self.sdk_include.join("ucrt"),
        ]
    }
}

/// Abstraction over child-process invocation, so the build tasks can be
/// exercised in tests without Visual Studio installed.
pub trait ToolRunner {
    /// Run a tool to completion and return its exit code. An error means the
    /// process could not be launched at all.
    fn run(&self, program: &Path, args: &[String]) -> Result<i32>;
}

/// The real implementation: spawn the tool, inherit stdio, block until exit.
pub struct Spawner;

impl ToolRunner for Spawner {
    fn run(&self, program: &Path, args: &[String]) -> Result<i32> {
        debug!("running {} {}", program.display(), args.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("failed to launch {}", program.display()))?;
        // A signal-terminated child has no code; treat it as a plain failure.
        Ok(status.code().unwrap_or(1))
    }
}

/// Records every invocation instead of spawning anything.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockRunner {
    pub invocations: std::sync::Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub exit_code: i32,
}

#[cfg(test)]
impl MockRunner {
    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ToolRunner for MockRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<i32> {
        self.invocations
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        Ok(self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Toolchain {
        let visual_studio = PathBuf::from("/pf/Microsoft Visual Studio/2022/Community");
        let msvc_root = visual_studio.join("VC/Tools/MSVC").join(MSVC_TOOLS_VERSION);
        Toolchain {
            compiler: msvc_root.join("bin/Hostx64/x64/cl.exe"),
            msbuild: visual_studio.join("MSBuild/Current/Bin/MSBuild.exe"),
            sdk_include: PathBuf::from("/pfx86/Windows Kits/10/Include").join(SDK_VERSION),
            msvc_root,
        }
    }

    #[test]
    fn include_directories() {
        let toolchain = dummy();
        assert!(toolchain.compiler_include().ends_with("include"));
        let [um, shared, ucrt] = toolchain.sdk_includes();
        assert!(um.ends_with("um"));
        assert!(shared.ends_with("shared"));
        assert!(ucrt.ends_with("ucrt"));
    }

    #[test]
    fn mock_runner_records_command_lines() {
        let runner = MockRunner::default();
        let code = runner
            .run(Path::new("cl.exe"), &["/nologo".into(), "/c".into()])
            .unwrap();
        assert_eq!(code, 0);
        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].1, vec!["/nologo", "/c"]);
    }
}
