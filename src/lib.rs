//! dotnope — a per-package environment-variable access firewall.
//!
//! Constrains which third-party modules loaded into a host runtime may
//! read, write, delete, or enumerate process environment variables, so a
//! compromised dependency cannot silently exfiltrate the secrets the host
//! legitimately holds. Two enforcement planes share one policy model and
//! one decision function: an in-runtime mediator wrapping the environment
//! store, and a loader-preloaded interposer (the `interposer/` crate)
//! closing the C-level `getenv` side door.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod caller;
pub mod config;
pub mod decision;
pub mod errors;
pub mod handle;
pub mod integrity;
pub mod launcher;
pub mod logging;
pub mod mediator;
pub mod policy;
pub mod store;
pub mod types;

pub use errors::DotnopeError;
pub use handle::{disable_strict_env, enable_strict_env, ControlHandle, EnableOptions};
pub use mediator::Mediator;
pub use policy::PolicyModel;
