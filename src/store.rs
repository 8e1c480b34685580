//! Environment stores the mediator fronts.
//!
//! The mediator owns the only published handle to one of these; its
//! security derives from that, not from making the store immutable.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// The full access vocabulary of an environment mapping.
pub trait EnvStore: Send + Sync {
    /// Value of `key`, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Set `key` to `value`, overwriting any existing entry.
    fn set(&self, key: &str, value: &str);

    /// Remove `key`; true when an entry existed.
    fn remove(&self, key: &str) -> bool;

    /// All keys, sorted.
    fn keys(&self) -> Vec<String>;

    /// Membership test.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Store backed by the process environment.
///
/// Reads and writes go straight to the process table; an internal lock
/// serializes mutation against enumeration. Entries that are not valid
/// UTF-8 are skipped at enumeration time and invisible to `get`.
#[derive(Default)]
pub struct ProcessEnv {
    write_lock: RwLock<()>,
}

impl ProcessEnv {
    /// Store over the current process environment.
    pub fn new() -> Self {
        ProcessEnv::default()
    }
}

impl EnvStore for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.write_lock.read();
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        let _guard = self.write_lock.write();
        std::env::set_var(key, value);
    }

    fn remove(&self, key: &str) -> bool {
        let _guard = self.write_lock.write();
        let existed = std::env::var_os(key).is_some();
        std::env::remove_var(key);
        existed
    }

    fn keys(&self) -> Vec<String> {
        let _guard = self.write_lock.read();
        let mut keys: Vec<String> = std::env::vars().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }
}

/// In-memory store for worker contexts and tests.
pub struct MemoryEnv {
    vars: RwLock<BTreeMap<String, String>>,
}

impl MemoryEnv {
    /// Empty store.
    pub fn new() -> Self {
        MemoryEnv {
            vars: RwLock::new(BTreeMap::new()),
        }
    }

    /// Store seeded from key-value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        MemoryEnv {
            vars: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }
}

impl Default for MemoryEnv {
    fn default() -> Self {
        MemoryEnv::new()
    }
}

impl std::fmt::Debug for MemoryEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.keys();
        f.debug_struct("MemoryEnv")
            .field("keys", &keys)
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl EnvStore for MemoryEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut vars) = self.vars.write() {
            vars.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove(&self, key: &str) -> bool {
        self.vars
            .write()
            .map(|mut vars| vars.remove(key).is_some())
            .unwrap_or(false)
    }

    fn keys(&self) -> Vec<String> {
        self.vars
            .read()
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default()
    }
}
