//! # Build Tasks
//!
//! The non-generator targets: deleting cached build state, driving MSBuild
//! for debug/release builds, and the standalone header-compilation sweep
//! that validates every header pulls in its own dependencies.
//!
//! Everything here is a thin, blocking delegation to an external tool; exit
//! codes are reported back to the caller and nothing is retried.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use walkdir::WalkDir;

use crate::toolchain::{ToolRunner, Toolchain};

/// The project file, relative to the project root.
pub const PROJECT_FILE: &str = "application.vcxproj";

/// The filters file, relative to the project root.
pub const FILTERS_FILE: &str = "application.vcxproj.filters";

/// The source tree, relative to the project root.
pub const SOURCE_DIR: &str = "code";

/// Intermediate state removed by the `clean` target.
const CLEAN_ITEMS: [&str; 3] = [".cache", ".vs", "application.vcxproj.user"];

/// Delete cached build state under the project root. Missing items are fine.
pub fn clean_all(root: &Path) -> Result<()> {
    info!("Deleting intermediate files");
    for item in CLEAN_ITEMS {
        let path = root.join(item);
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("cannot delete {}", path.display()))?;
        } else if path.exists() {
            fs::remove_file(&path).with_context(|| format!("cannot delete {}", path.display()))?;
        }
    }
    Ok(())
}

/// Build the executable through MSBuild. Returns MSBuild's exit code.
pub fn build_executable(
    runner: &impl ToolRunner,
    toolchain: &Toolchain,
    root: &Path,
    config: &str,
) -> Result<i32> {
    info!("Building Windows {config} executable");
    let vcxproj = root.join(PROJECT_FILE);
    let args = vec![
        vcxproj.display().to_string(),
        "/nologo".to_string(),
        "/verbosity:minimal".to_string(),
        format!("/p:Configuration={config}"),
        "/p:Platform=x64".to_string(),
    ];
    runner.run(&toolchain.msbuild, &args)
}

/// Compile every header standalone into a scratch directory, then delete the
/// scratch directory. A header that fails to compile on its own is missing
/// includes. Returns the first non-zero compiler exit code, or zero.
pub fn build_headers(runner: &impl ToolRunner, toolchain: &Toolchain, root: &Path) -> Result<i32> {
    info!("Compiling header files");
    let scratch = std::env::temp_dir().join("compiler_output");
    fs::create_dir_all(&scratch)
        .with_context(|| format!("cannot create {}", scratch.display()))?;
    let extra = ["/D", "_WINDOWS", "/D", "_DEBUG", "/W4"];
    let code = compile_all(
        runner,
        toolchain,
        &root.join(SOURCE_DIR),
        "h",
        &extra,
        &scratch,
    );
    fs::remove_dir_all(&scratch)
        .with_context(|| format!("cannot delete {}", scratch.display()))?;
    code
}

/// Compile every file with the given extension under `source_root`,
/// skipping the `external` and `generated` subtrees (vendored and
/// protobuf-generated code is not held to the standalone-header rule).
///
/// The sweep keeps going past failures so one broken header does not hide
/// the rest; the first failing exit code is what gets reported.
fn compile_all(
    runner: &impl ToolRunner,
    toolchain: &Toolchain,
    source_root: &Path,
    extension: &str,
    extra_options: &[&str],
    output_dir: &Path,
) -> Result<i32> {
    let mut failed = 0;
    for entry in WalkDir::new(source_root).sort_by_file_name() {
        let entry = entry.context("cannot walk source tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_root)
            .expect("walk entries live under the root");
        if relative
            .parent()
            .is_some_and(|dir| dir.components().any(|c| {
                c.as_os_str() == "external" || c.as_os_str() == "generated"
            }))
        {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let object = output_dir
            .join(entry.path().file_stem().unwrap_or_default())
            .with_extension("obj");
        let code = compile_file(runner, toolchain, source_root, entry.path(), &object, extra_options)?;
        if failed == 0 && code != 0 {
            failed = code;
        }
    }
    Ok(failed)
}

/// Invoke the compiler once for a single translation unit.
fn compile_file(
    runner: &impl ToolRunner,
    toolchain: &Toolchain,
    source_root: &Path,
    source: &Path,
    object: &Path,
    extra_options: &[&str],
) -> Result<i32> {
    let mut args: Vec<String> = [
        "/nologo", "/MP", "/analyze-", "/c", "/TP", "/EHsc", "/Zc:wchar_t", "/Gm-", "/GF", "/MDd",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend(["/D".to_string(), "WIN32_LEAN_AND_MEAN".to_string()]);
    args.extend(["/D".to_string(), "_WIN32_WINNT=0x0A00".to_string()]);
    for include in std::iter::once(source_root.to_path_buf())
        .chain(std::iter::once(toolchain.compiler_include()))
        .chain(toolchain.sdk_includes())
    {
        args.push("/I".to_string());
        args.push(include.display().to_string());
    }
    args.push(format!("/Fo{}", object.display()));
    args.extend(extra_options.iter().map(|s| s.to_string()));
    args.push(source.display().to_string());

    runner.run(&toolchain.compiler, &args)
}
