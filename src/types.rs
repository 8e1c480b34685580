// Core vocabulary shared by both enforcement planes.

use serde::{Deserialize, Serialize};

/// Identity attributed to an environment access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallerId {
    /// The host application's own top-level code — highest trust.
    Main,
    /// A third-party module, named by its dependency-tree entry
    /// (slash-joined, optional leading `@scope/` segment).
    Package(String),
    /// No attributable module: empty stack, dynamically generated code,
    /// or a tampered stack.
    Unknown,
}

impl CallerId {
    /// Stable label used in decision-log entries and error messages.
    pub fn label(&self) -> &str {
        match self {
            CallerId::Main => "main",
            CallerId::Package(name) => name,
            CallerId::Unknown => "unknown",
        }
    }
}

/// Operation classes mediated by the firewall.
///
/// Membership tests and descriptor queries map to [`Operation::Read`]
/// before reaching the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Value read, membership test, or descriptor query.
    Read,
    /// Value write.
    Write,
    /// Entry removal.
    Delete,
    /// Own-key enumeration.
    Enumerate,
}

impl Operation {
    /// Lowercase operation name as carried in errors and log entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::Enumerate => "enumerate",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stack frame as reported by a capture backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Source path of the frame, if the runtime reported one.
    pub file_path: Option<String>,
    /// Function name, if the runtime reported one.
    pub function_name: Option<String>,
    /// VM-reported eval flag.
    pub is_eval: bool,
    /// Origin string for eval'd code, when the VM tracks one.
    pub eval_origin: Option<String>,
    /// Whether the frame is a constructor call.
    pub is_constructor: bool,
}

impl Frame {
    /// Frame with only a source path set. Test and embedder convenience.
    pub fn from_path(path: impl Into<String>) -> Self {
        Frame {
            file_path: Some(path.into()),
            ..Frame::default()
        }
    }
}

/// Caller identity plus the eval flag observed while walking the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCaller {
    /// The attributed identity.
    pub id: CallerId,
    /// True when any walked frame satisfied the eval heuristic.
    pub is_eval: bool,
}

impl ResolvedCaller {
    /// A caller with the eval flag clear.
    pub fn plain(id: CallerId) -> Self {
        ResolvedCaller { id, is_eval: false }
    }
}

/// Whether a key is a variable name the firewall mediates.
///
/// Keys outside the identifier alphabet are the runtime's reflection
/// namespace and are forwarded to the underlying store untouched.
pub fn is_variable_name(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_labels() {
        assert_eq!(CallerId::Main.label(), "main");
        assert_eq!(CallerId::Unknown.label(), "unknown");
        assert_eq!(CallerId::Package("@scope/pkg".to_owned()).label(), "@scope/pkg");
    }

    #[test]
    fn variable_names() {
        assert!(is_variable_name("AWS_SECRET"));
        assert!(is_variable_name("node_env2"));
        assert!(!is_variable_name(""));
        assert!(!is_variable_name("has space"));
        assert!(!is_variable_name("sym(foo)"));
        assert!(!is_variable_name("*"));
    }

    #[test]
    fn operation_strings() {
        assert_eq!(Operation::Read.as_str(), "read");
        assert_eq!(Operation::Enumerate.to_string(), "enumerate");
    }
}
