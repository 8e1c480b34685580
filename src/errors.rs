//! Typed error surface with stable wire-level codes.
//!
//! Every denial or control-plane failure maps to one `ERR_DOTNOPE_*` code.
//! The codes are the contract; the Rust variant names are not.

use thiserror::Error;

use crate::types::Operation;

/// Errors raised by the mediation engine and the control surface.
#[derive(Debug, Error)]
pub enum DotnopeError {
    /// Per-variable read/write/delete denied by policy.
    #[error("package '{package}' is not authorized to {operation} '{variable}'")]
    Unauthorized {
        /// Package the access was attributed to.
        package: String,
        /// Variable the access targeted.
        variable: String,
        /// Operation class that was denied.
        operation: Operation,
    },

    /// Caller identity resolved to unknown while fail-closed mode is active.
    #[error("unidentifiable caller denied {operation} of '{variable}' (fail-closed)")]
    UnknownCaller {
        /// Variable the access targeted.
        variable: String,
        /// Operation class that was denied.
        operation: Operation,
    },

    /// Caller frame originated from dynamically generated code and
    /// `allowEval` is off.
    #[error("eval-context caller denied {operation} of '{variable}'")]
    EvalContext {
        /// Variable the access targeted.
        variable: String,
        /// Operation class that was denied.
        operation: Operation,
    },

    /// The unconditional-disable legacy surface was called.
    #[error("disableStrictEnv() was removed for security; present the install token to ControlHandle::disable")]
    Deprecated,

    /// Native-file hash or size mismatch; the native caller-ID path is
    /// disabled for this process.
    #[error("native helper integrity verification failed: {reason}")]
    Integrity {
        /// Human-readable mismatch description.
        reason: String,
    },

    /// Teardown attempted without the handle's token.
    #[error("teardown rejected: token missing or mismatched")]
    InvalidToken,

    /// A second installation was attempted while one is active.
    #[error("a mediator is already installed in this process")]
    AlreadyInstalled,
}

impl DotnopeError {
    /// Stable error code carried across process and logging boundaries.
    pub fn code(&self) -> &'static str {
        match self {
            DotnopeError::Unauthorized { .. } => "ERR_DOTNOPE_UNAUTHORIZED",
            DotnopeError::UnknownCaller { .. } => "ERR_DOTNOPE_UNKNOWN_CALLER",
            DotnopeError::EvalContext { .. } => "ERR_DOTNOPE_EVAL_CONTEXT",
            DotnopeError::Deprecated => "ERR_DOTNOPE_DEPRECATED",
            DotnopeError::Integrity { .. } => "ERR_DOTNOPE_INTEGRITY",
            DotnopeError::InvalidToken => "ERR_DOTNOPE_INVALID_TOKEN",
            DotnopeError::AlreadyInstalled => "ERR_DOTNOPE_ALREADY_INSTALLED",
        }
    }
}
