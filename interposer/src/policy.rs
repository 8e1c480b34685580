//! Serialized allow-set parsing and the read decision.
//!
//! `DOTNOPE_POLICY` is either `*` (allow-all), the empty string
//! (allow-none), or a comma-separated sorted list of variable names.
//! An unset variable leaves the interposer inert so a bare preload does
//! not break unconfigured processes.

use std::collections::BTreeSet;

/// Control-plane names the interposer always forwards so the runtime
/// plane can inspect its own contract.
const CONTROL_PREFIX: &str = "DOTNOPE_";
const PRELOAD_NAME: &str = "LD_PRELOAD";

/// The parsed allow-set, constructed once per process at first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPolicy {
    /// No policy variable published: every read forwards.
    Inert,
    /// `*`: every read forwards.
    AllowAll,
    /// Empty string: only control-plane names forward.
    AllowNone,
    /// Explicit allow-set.
    List(BTreeSet<String>),
}

impl ParsedPolicy {
    /// Parse the raw `DOTNOPE_POLICY` value.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => ParsedPolicy::Inert,
            Some("*") => ParsedPolicy::AllowAll,
            Some("") => ParsedPolicy::AllowNone,
            Some(csv) => ParsedPolicy::List(
                csv.split(',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
        }
    }

    /// Whether a read of `name` forwards to the real environment.
    pub fn allows(&self, name: &str) -> bool {
        if name.starts_with(CONTROL_PREFIX) || name == PRELOAD_NAME {
            return true;
        }
        match self {
            ParsedPolicy::Inert | ParsedPolicy::AllowAll => true,
            ParsedPolicy::AllowNone => false,
            ParsedPolicy::List(names) => names.contains(name),
        }
    }

    /// Whether a name outside the policy vocabulary (not valid UTF-8)
    /// forwards. Only the unrestricted policies pass those through; a
    /// restricted allow-set cannot name them, so they read as absent.
    pub fn allows_opaque(&self) -> bool {
        matches!(self, ParsedPolicy::Inert | ParsedPolicy::AllowAll)
    }
}

/// One decision-log line.
pub fn log_line(unix_seconds: u64, name: &str, allowed: bool) -> String {
    let verdict = if allowed { "allow" } else { "deny" };
    format!("{unix_seconds} getenv {name} {verdict}\n")
}
