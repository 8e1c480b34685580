//! Launcher plumbing — the process-environment contract for children.
//!
//! The native plane rides on three variables: the loader preload list
//! carries the interposer, `DOTNOPE_POLICY` carries the serialized
//! allow-set, and `DOTNOPE_LOG` optionally points the interposer's
//! decision log at a file. This module builds that contract and locates
//! the interposer library; process spawning itself lives in the binary.

use std::path::{Path, PathBuf};

use crate::config;
use crate::policy::PolicyModel;

/// Loader preload list consumed by the OS loader.
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

/// Serialized allow-set consumed by the interposer.
pub const POLICY_ENV: &str = "DOTNOPE_POLICY";

/// Optional interposer decision-log path.
pub const LOG_ENV: &str = "DOTNOPE_LOG";

/// Override for the interposer library location.
pub const LIBRARY_ENV: &str = "DOTNOPE_INTERPOSER";

/// File name of the interposer shared library.
pub const INTERPOSER_FILE: &str = "libdotnope_interposer.so";

/// Script extensions that trigger interpreter invocation.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Interpreter used for script targets.
const RUNTIME_PROGRAM: &str = "node";

/// What the launcher was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// A script run through the interpreter.
    Script {
        /// Script path.
        path: PathBuf,
        /// Arguments after the script path.
        args: Vec<String>,
    },
    /// An arbitrary command.
    Command {
        /// Program to execute.
        program: String,
        /// Program arguments.
        args: Vec<String>,
    },
}

/// Classify a positional target: known script extensions go through the
/// interpreter, anything else is executed directly.
pub fn target_for(path: PathBuf, args: Vec<String>) -> LaunchTarget {
    let is_script = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));
    if is_script {
        LaunchTarget::Script { path, args }
    } else {
        LaunchTarget::Command {
            program: path.to_string_lossy().into_owned(),
            args,
        }
    }
}

/// Fully resolved child invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Program to spawn.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Environment entries set on the child.
    pub env: Vec<(String, String)>,
}

/// Build the child invocation and its native-plane environment.
pub fn build_plan(
    target: LaunchTarget,
    model: &PolicyModel,
    library: &Path,
    log: Option<&Path>,
    current_preload: Option<&str>,
) -> LaunchPlan {
    let (program, args) = match target {
        LaunchTarget::Script { path, args } => {
            let mut full = vec![path.to_string_lossy().into_owned()];
            full.extend(args);
            (RUNTIME_PROGRAM.to_owned(), full)
        }
        LaunchTarget::Command { program, args } => (program, args),
    };

    let mut env = vec![
        (PRELOAD_ENV.to_owned(), merge_preload(current_preload, library)),
        (POLICY_ENV.to_owned(), config::generate_policy(model)),
    ];
    if let Some(log) = log {
        env.push((LOG_ENV.to_owned(), log.to_string_lossy().into_owned()));
    }

    LaunchPlan { program, args, env }
}

/// Prepend the interposer to an existing preload list, without
/// duplicating it.
pub fn merge_preload(existing: Option<&str>, library: &Path) -> String {
    let library = library.to_string_lossy();
    match existing.filter(|e| !e.is_empty()) {
        Some(existing) => {
            if existing.split(':').any(|entry| entry == library) {
                existing.to_owned()
            } else {
                format!("{library}:{existing}")
            }
        }
        None => library.into_owned(),
    }
}

/// Locate the interposer shared library.
///
/// Checks the explicit override, then the launcher's own directory, then
/// the conventional sibling and build-tree locations.
pub fn locate_interposer() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(LIBRARY_ENV) {
        let path = PathBuf::from(explicit);
        return path.is_file().then_some(path);
    }

    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(INTERPOSER_FILE));
            candidates.push(dir.join("..").join("lib").join(INTERPOSER_FILE));
        }
    }
    for profile in ["debug", "release"] {
        candidates.push(PathBuf::from("target").join(profile).join(INTERPOSER_FILE));
    }

    candidates.into_iter().find(|path| path.is_file())
}

/// Whether the interposer is preloaded and a policy is published for it
/// in this process's environment.
pub fn preload_active() -> bool {
    let preload = std::env::var(PRELOAD_ENV).unwrap_or_default();
    let interposed = preload
        .split(':')
        .any(|entry| Path::new(entry).file_name().and_then(|n| n.to_str()) == Some(INTERPOSER_FILE));
    interposed && std::env::var(POLICY_ENV).is_ok()
}
