//! Cross-context attribution for suspension points.
//!
//! When the runtime tracks deferred-execution contexts, each context
//! records the package that created it. A stack walk that yields no
//! attributable frame falls back to the recorded origin of the context the
//! current thread is running. Best-effort augmentation only; it never
//! upgrades a resolved package to the host application.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::RwLock;

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Append-mostly table mapping execution-context IDs to creator packages.
#[derive(Debug, Default)]
pub struct OriginRegistry {
    origins: RwLock<HashMap<u64, String>>,
}

impl OriginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        OriginRegistry::default()
    }

    /// Record the package that created context `ctx`. First writer wins.
    pub fn record(&self, ctx: u64, package: impl Into<String>) {
        if let Ok(mut origins) = self.origins.write() {
            origins.entry(ctx).or_insert_with(|| package.into());
        }
    }

    /// Drop a completed context.
    pub fn forget(&self, ctx: u64) {
        if let Ok(mut origins) = self.origins.write() {
            origins.remove(&ctx);
        }
    }

    /// Mark `ctx` as the running context on this thread until the guard
    /// drops.
    pub fn enter(ctx: u64) -> ContextGuard {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(ctx)));
        ContextGuard { previous }
    }

    /// Originating package of the context running on this thread, if any.
    pub fn current_package(&self) -> Option<String> {
        let ctx = CURRENT_CONTEXT.with(Cell::get)?;
        self.origins.read().ok()?.get(&ctx).cloned()
    }
}

/// Restores the previously running context on drop.
pub struct ContextGuard {
    previous: Option<u64>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|current| current.set(self.previous));
    }
}
