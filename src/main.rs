//! # vcxforge: The Main Entry Point
//!
//! Command Line Interface (CLI) parsing, logging initialization, and target
//! dispatch. One or more build targets are given on the command line and run
//! in order; the first failure stops the run and its exit code becomes this
//! process's exit code.
//!
//! ```text
//! vcxforge msvc            # regenerate application.vcxproj + .filters
//! vcxforge clean release   # wipe cached state, then build release
//! vcxforge headers         # compile every header standalone
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{LevelFilter, error, info};
use simplelog::{Config, SimpleLogger};

mod project;
mod tasks;
mod toolchain;
mod xml;

use toolchain::{Spawner, ToolRunner, Toolchain};

/// The primary Command Line Interface (CLI) configuration.
#[derive(Parser)]
#[command(name = "vcxforge")]
#[command(about = "Build helper for the MSVC application project", long_about = None)]
struct Cli {
    /// Build targets to run, in order.
    #[arg(value_enum, required = true, num_args = 1..)]
    targets: Vec<Target>,

    /// Project root: the directory holding application.vcxproj and code/.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Available build targets.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    /// Delete all intermediate build files.
    Clean,
    /// Build the debug executable.
    Debug,
    /// Build the release executable.
    Release,
    /// Regenerate the .vcxproj project file and its .filters companion.
    Msvc,
    /// Compile header files individually (validates dependencies).
    Headers,
}

impl Target {
    fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Debug => "debug",
            Self::Release => "release",
            Self::Msvc => "msvc",
            Self::Headers => "headers",
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Determine log level based on verbosity flag
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Initialize logger
    // We ignore the result here as logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    let runner = Spawner;
    for target in &cli.targets {
        match run_target(*target, &cli.root, &runner) {
            Ok(0) => {}
            Ok(code) => {
                // The external tool already printed its own diagnostics.
                error!("{} failed with exit code {code}", target.name());
                std::process::exit(code);
            }
            Err(e) => {
                error!("{} failed: {e:#}", target.name());
                std::process::exit(1);
            }
        }
    }
}

/// Run a single target, returning the exit code to propagate (zero on
/// success). Tool locations are resolved lazily so `clean` and `msvc` work
/// without Visual Studio installed.
fn run_target(target: Target, root: &Path, runner: &impl ToolRunner) -> Result<i32> {
    match target {
        Target::Clean => {
            tasks::clean_all(root)?;
            Ok(0)
        }
        Target::Debug => tasks::build_executable(runner, &Toolchain::from_env()?, root, "debug"),
        Target::Release => {
            tasks::build_executable(runner, &Toolchain::from_env()?, root, "release")
        }
        Target::Msvc => {
            info!("Generating project file");
            let vcxproj = root.join(tasks::PROJECT_FILE);
            project::generate(
                &root.join(tasks::SOURCE_DIR),
                &vcxproj,
                &vcxproj,
                &root.join(tasks::FILTERS_FILE),
            )?;
            Ok(0)
        }
        Target::Headers => tasks::build_headers(runner, &Toolchain::from_env()?, root),
    }
}
