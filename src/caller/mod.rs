//! Caller Identifier — maps an access to the responsible module identity.
//!
//! Given a stack snapshot taken at an interception point, walk outward,
//! discard frames belonging to the mediator itself or to runtime
//! internals, and attribute the first remaining frame to a package (via
//! the dependency-directory convention) or to the host application. Frames
//! that look like dynamically generated code flag the caller as
//! eval-context on the way.

pub mod capture;
pub mod origin;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::{CallerId, Frame, ResolvedCaller};

pub use capture::{FallbackCapture, StackCapture, StaticCapture};
pub use origin::OriginRegistry;

/// Paths the VM synthesizes for generated code. Never resolvable.
const SYNTHETIC_PATHS: &[&str] = &["[eval]", "<anonymous>"];
const SYNTHETIC_PATH_PREFIXES: &[&str] = &["eval at", "evalmachine."];

/// Function-name fragments that mark generated code.
const EVAL_NAME_MARKERS: &[&str] = &["eval", "Function", "anonymous"];

/// Identification settings. Defaults cover the common host layout; the
/// lists stay configurable for embedders with unconventional trees.
#[derive(Debug, Clone)]
pub struct IdentifierConfig {
    /// The mediator's own package identity, skipped during the walk.
    pub own_package: String,
    /// File suffixes of the mediator's shim files, for development
    /// checkouts that do not live under the dependency directory.
    pub own_file_suffixes: Vec<String>,
    /// Path prefixes of runtime-internal modules.
    pub internal_prefixes: Vec<String>,
    /// Directory segment separating application code from dependencies.
    pub dependency_dir: String,
    /// Mediator frames at the top of every capture, skipped unconditionally.
    pub skip_frames: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        IdentifierConfig {
            own_package: "dotnope".to_owned(),
            own_file_suffixes: vec![
                "/mediator.js".to_owned(),
                "/index.js".to_owned(),
                "/register.js".to_owned(),
            ],
            internal_prefixes: vec!["node:".to_owned(), "internal/".to_owned()],
            dependency_dir: "node_modules".to_owned(),
            skip_frames: 0,
        }
    }
}

/// Resolves caller identities from stack snapshots.
///
/// Holds the append-only path-to-identity cache; entries are immutable
/// once inserted and the cache is bounded only by the set of source paths
/// the process loads.
pub struct CallerIdentifier {
    capture: Arc<dyn StackCapture>,
    config: IdentifierConfig,
    cache: RwLock<HashMap<String, CallerId>>,
    origins: Arc<OriginRegistry>,
}

impl CallerIdentifier {
    /// Identifier over the given capture backend with default settings.
    pub fn new(capture: Arc<dyn StackCapture>) -> Self {
        Self::with_config(capture, IdentifierConfig::default())
    }

    /// Identifier with explicit settings.
    pub fn with_config(capture: Arc<dyn StackCapture>, config: IdentifierConfig) -> Self {
        CallerIdentifier {
            capture,
            config,
            cache: RwLock::new(HashMap::new()),
            origins: Arc::new(OriginRegistry::new()),
        }
    }

    /// Share an origin registry for cross-context attribution.
    pub fn with_origins(mut self, origins: Arc<OriginRegistry>) -> Self {
        self.origins = origins;
        self
    }

    /// Whether the active backend is the trusted one.
    pub fn is_trusted(&self) -> bool {
        self.capture.is_trusted()
    }

    /// Capture the current stack and attribute it.
    pub fn resolve(&self) -> ResolvedCaller {
        let frames = self.capture.capture();
        self.resolve_frames(&frames)
    }

    /// Attribute an already-captured snapshot.
    pub fn resolve_frames(&self, frames: &[Frame]) -> ResolvedCaller {
        let mut saw_eval = false;

        for frame in frames.iter().skip(self.config.skip_frames) {
            if frame_suggests_eval(frame) {
                saw_eval = true;
            }

            let Some(path) = frame.file_path.as_deref() else {
                continue;
            };
            if path.is_empty() || is_synthetic_path(path) {
                continue;
            }
            if self.is_internal(path) || self.is_own_frame(path) {
                continue;
            }

            let id = self.identify_path(path);
            return ResolvedCaller { id, is_eval: saw_eval };
        }

        // Suspension point with no attributable frame: fall back to the
        // package that created the running context. Never upgrades to main.
        if let Some(package) = self.origins.current_package() {
            return ResolvedCaller {
                id: CallerId::Package(package),
                is_eval: saw_eval,
            };
        }

        ResolvedCaller {
            id: CallerId::Unknown,
            is_eval: saw_eval,
        }
    }

    fn is_internal(&self, path: &str) -> bool {
        self.config
            .internal_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_own_frame(&self, path: &str) -> bool {
        match package_from_path(&self.config.dependency_dir, path) {
            // Installed under the dependency tree.
            Some(package) => package == self.config.own_package,
            // Development checkout: a known shim file under a directory
            // named after us.
            None => {
                let own_dir = format!("/{}/", self.config.own_package);
                path.contains(&own_dir)
                    && self
                        .config
                        .own_file_suffixes
                        .iter()
                        .any(|suffix| path.ends_with(suffix.as_str()))
            }
        }
    }

    fn identify_path(&self, path: &str) -> CallerId {
        if let Ok(cache) = self.cache.read() {
            if let Some(id) = cache.get(path) {
                return id.clone();
            }
        }
        let id = match package_from_path(&self.config.dependency_dir, path) {
            Some(package) => CallerId::Package(package),
            None => CallerId::Main,
        };
        if let Ok(mut cache) = self.cache.write() {
            cache.entry(path.to_owned()).or_insert_with(|| id.clone());
        }
        id
    }

    /// Number of distinct source paths attributed so far.
    pub fn cache_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Package name for a source path under the dependency directory.
///
/// The *last* dependency-directory segment wins (nested installs), and a
/// leading at-sign segment pulls in the following segment as its scope
/// member. Paths outside the dependency directory yield `None` (host
/// application code).
pub fn package_from_path(dependency_dir: &str, path: &str) -> Option<String> {
    let normalized;
    let path = if path.contains('\\') {
        normalized = path.replace('\\', "/");
        normalized.as_str()
    } else {
        path
    };

    let needle = format!("/{dependency_dir}/");
    let start = match path.rfind(&needle) {
        Some(idx) => idx + needle.len(),
        None if path.starts_with(&needle[1..]) => needle.len() - 1,
        None => return None,
    };

    let mut segments = path[start..].split('/');
    let first = segments.next().filter(|s| !s.is_empty())?;
    if first.starts_with('@') {
        let member = segments.next().filter(|s| !s.is_empty())?;
        Some(format!("{first}/{member}"))
    } else {
        Some(first.to_owned())
    }
}

/// Whether the path is one the VM synthesizes for generated code.
pub fn is_synthetic_path(path: &str) -> bool {
    SYNTHETIC_PATHS.contains(&path)
        || SYNTHETIC_PATH_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
}

/// The eval heuristic: VM flag, eval origin, tell-tale function names,
/// synthetic paths, or an unnamed file carrying a named function.
pub fn frame_suggests_eval(frame: &Frame) -> bool {
    if frame.is_eval {
        return true;
    }
    if frame.eval_origin.as_deref().is_some_and(|o| !o.is_empty()) {
        return true;
    }
    if let Some(name) = frame.function_name.as_deref() {
        if EVAL_NAME_MARKERS.iter().any(|marker| name.contains(marker)) {
            return true;
        }
    }
    match frame.file_path.as_deref() {
        Some(path) if is_synthetic_path(path) => true,
        Some(path) if !path.is_empty() => false,
        _ => frame
            .function_name
            .as_deref()
            .is_some_and(|name| !name.is_empty() && name != "anonymous"),
    }
}
