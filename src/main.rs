//! dotnope launcher CLI.
//!
//! Single command, deliberately minimal: run a script or an arbitrary
//! command with the native enforcement plane active. `--check` and
//! `--status` are diagnostics for the interposer setup.

use std::path::PathBuf;
use std::process::ExitStatus;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use tracing::{debug, info};

use dotnope::config;
use dotnope::launcher::{self, LaunchTarget};
use dotnope::logging;
use dotnope::policy::PolicyModel;

/// Run a command with the environment firewall's native plane active.
#[derive(Parser)]
#[command(name = "dotnope", version, about)]
struct Cli {
    /// Script to run (.js/.mjs/.cjs invoke the interpreter); other paths
    /// run directly.
    script: Option<PathBuf>,

    /// Arguments passed to the script.
    args: Vec<String>,

    /// Locate the interposer library; exit 0 when found, 1 otherwise.
    #[arg(long)]
    check: bool,

    /// Print the native-plane status and exit.
    #[arg(long)]
    status: bool,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Append the interposer's decision log to this file.
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Arbitrary command to run, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dotnope: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    if cli.check {
        return Ok(match launcher::locate_interposer() {
            Some(path) => {
                println!("{}", path.display());
                0
            }
            None => {
                eprintln!("interposer library not found");
                1
            }
        });
    }

    if cli.status {
        print_status();
        return Ok(0);
    }

    let target = match (cli.script, cli.command.is_empty()) {
        (Some(script), _) => launcher::target_for(script, cli.args),
        (None, false) => {
            let mut parts = cli.command.into_iter();
            let program = parts.next().unwrap_or_default();
            LaunchTarget::Command {
                program,
                args: parts.collect(),
            }
        }
        (None, true) => {
            Cli::command().print_help().ok();
            return Ok(2);
        }
    };

    let descriptor = PathBuf::from("package.json");
    let model = if descriptor.is_file() {
        config::load_from_descriptor(&descriptor)?
    } else {
        info!("no package descriptor found; publishing the allow-none policy");
        PolicyModel::default()
    };

    let Some(library) = launcher::locate_interposer() else {
        bail!(
            "interposer library not found; build it or set {} to its path",
            launcher::LIBRARY_ENV
        );
    };

    let current_preload = std::env::var(launcher::PRELOAD_ENV).ok();
    let plan = launcher::build_plan(
        target,
        &model,
        &library,
        cli.log.as_deref(),
        current_preload.as_deref(),
    );

    debug!(program = %plan.program, library = %library.display(), "spawning child");
    let mut command = std::process::Command::new(&plan.program);
    command.args(&plan.args);
    for (key, value) in &plan.env {
        command.env(key, value);
    }

    let status = command
        .status()
        .with_context(|| format!("failed to execute {}", plan.program))?;
    Ok(finish(status))
}

fn print_status() {
    let preload = std::env::var(launcher::PRELOAD_ENV).unwrap_or_default();
    let policy = std::env::var(launcher::POLICY_ENV).ok();
    let library = launcher::locate_interposer();

    println!(
        "platform:       {}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!("preload active: {}", launcher::preload_active());
    println!(
        "library:        {}",
        library
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not found)".to_owned())
    );
    println!("{}:     {}", launcher::PRELOAD_ENV, preload);
    println!(
        "{}: {}",
        launcher::POLICY_ENV,
        policy.unwrap_or_else(|| "(unset)".to_owned())
    );
}

/// Forward the child's exit code; on a fatal signal, re-raise the same
/// signal so our parent observes the same termination.
#[cfg(unix)]
fn finish(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(not(unix))]
fn finish(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
