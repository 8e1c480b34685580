//! Decision Engine — the pure authorization function.
//!
//! `decide` is side-effect free and depends only on its four arguments.
//! Both enforcement planes route every mediated access through it; the
//! native plane applies it indirectly, via the serialized allow-set that
//! [`crate::config::generate_policy`] derives from the same model.

use crate::errors::DotnopeError;
use crate::policy::PolicyModel;
use crate::types::{CallerId, Operation, ResolvedCaller};

/// Outcome of an authorization check.
#[derive(Debug)]
pub enum Verdict {
    /// The access proceeds against the underlying store.
    Allow,
    /// The access is refused with a structured reason.
    Deny(DotnopeError),
}

impl Verdict {
    /// True for [`Verdict::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// Authorize one access.
///
/// Rules apply in order: unrestricted host application, unprotected
/// operation classes, unidentifiable callers, eval-context callers, then
/// per-package variable sets. Enumeration by a package is always allowed
/// here; denial is expressed downstream by key omission, not by error.
pub fn decide(caller: &ResolvedCaller, op: Operation, var: &str, policy: &PolicyModel) -> Verdict {
    let options = &policy.options;

    if caller.id == CallerId::Main && options.treat_main_as_unrestricted {
        return Verdict::Allow;
    }

    let protected = match op {
        Operation::Read => true,
        Operation::Write => options.protect_writes,
        Operation::Delete => options.protect_deletes,
        Operation::Enumerate => options.protect_enumeration,
    };
    if !protected {
        return Verdict::Allow;
    }

    if caller.id == CallerId::Unknown {
        return if options.fail_closed {
            Verdict::Deny(DotnopeError::UnknownCaller {
                variable: var.to_owned(),
                operation: op,
            })
        } else {
            Verdict::Allow
        };
    }

    if caller.is_eval && !options.allow_eval {
        return Verdict::Deny(DotnopeError::EvalContext {
            variable: var.to_owned(),
            operation: op,
        });
    }

    // A restricted host application (treat_main_as_unrestricted off) is
    // subject to the same sets as a package, under the reserved name "main".
    let name = caller.id.label();
    let allowed = match op {
        Operation::Read => policy.may_read(name, var),
        Operation::Write => policy.may_write(name, var),
        Operation::Delete => policy.may_delete(name, var),
        Operation::Enumerate => true,
    };

    if allowed {
        Verdict::Allow
    } else {
        Verdict::Deny(DotnopeError::Unauthorized {
            package: name.to_owned(),
            variable: var.to_owned(),
            operation: op,
        })
    }
}
