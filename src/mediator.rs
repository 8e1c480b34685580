//! Runtime Mediator — the in-runtime enforcement plane.
//!
//! Wraps the host's environment store with the full access vocabulary:
//! read, write, delete, key enumeration, membership test, and descriptor
//! query. Every mediated operation identifies the caller, asks the
//! decision engine for a verdict, and only then touches the underlying
//! store. Denials raise before any mutation; enumeration denial is silent
//! filtering. The store itself is never frozen — security derives from the
//! mediator being the only published handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::audit::{AccessOutcome, DecisionLog};
use crate::caller::CallerIdentifier;
use crate::decision::{decide, Verdict};
use crate::errors::DotnopeError;
use crate::policy::{PolicyModel, WILDCARD};
use crate::store::EnvStore;
use crate::types::{is_variable_name, CallerId, Operation, ResolvedCaller};

/// Per-operation counters, incremented on every mediated access.
#[derive(Debug, Default)]
pub struct AccessStats {
    reads_allowed: AtomicU64,
    reads_denied: AtomicU64,
    writes_allowed: AtomicU64,
    writes_denied: AtomicU64,
    deletes_allowed: AtomicU64,
    deletes_denied: AtomicU64,
    enumerations: AtomicU64,
}

impl AccessStats {
    fn record(&self, op: Operation, allowed: bool) {
        let counter = match (op, allowed) {
            (Operation::Read, true) => &self.reads_allowed,
            (Operation::Read, false) => &self.reads_denied,
            (Operation::Write, true) => &self.writes_allowed,
            (Operation::Write, false) => &self.writes_denied,
            (Operation::Delete, true) => &self.deletes_allowed,
            (Operation::Delete, false) => &self.deletes_denied,
            (Operation::Enumerate, _) => &self.enumerations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads_allowed: self.reads_allowed.load(Ordering::Relaxed),
            reads_denied: self.reads_denied.load(Ordering::Relaxed),
            writes_allowed: self.writes_allowed.load(Ordering::Relaxed),
            writes_denied: self.writes_denied.load(Ordering::Relaxed),
            deletes_allowed: self.deletes_allowed.load(Ordering::Relaxed),
            deletes_denied: self.deletes_denied.load(Ordering::Relaxed),
            enumerations: self.enumerations.load(Ordering::Relaxed),
        }
    }
}

/// Access counters as exposed through the control handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Reads that proceeded.
    pub reads_allowed: u64,
    /// Reads refused by policy.
    pub reads_denied: u64,
    /// Writes that proceeded.
    pub writes_allowed: u64,
    /// Writes refused by policy.
    pub writes_denied: u64,
    /// Deletes that proceeded.
    pub deletes_allowed: u64,
    /// Deletes refused by policy.
    pub deletes_denied: u64,
    /// Enumerations served, filtered or not.
    pub enumerations: u64,
}

/// Result of a descriptor query on a present variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDescriptor {
    /// Current value.
    pub value: String,
    /// Mirrors the underlying store: entries stay writable.
    pub writable: bool,
    /// Mirrors the underlying store: entries stay enumerable.
    pub enumerable: bool,
    /// Mirrors the underlying store: entries stay configurable.
    pub configurable: bool,
}

/// The mediating wrapper around an environment store.
pub struct Mediator {
    store: Arc<dyn EnvStore>,
    policy: PolicyModel,
    identifier: CallerIdentifier,
    stats: AccessStats,
    decision_log: Option<DecisionLog>,
    enforcing: AtomicBool,
}

impl Mediator {
    /// Mediator over `store` enforcing `policy`, attributing callers via
    /// `identifier`. Enforcement starts enabled.
    pub fn new(store: Arc<dyn EnvStore>, policy: PolicyModel, identifier: CallerIdentifier) -> Self {
        Mediator {
            store,
            policy,
            identifier,
            stats: AccessStats::default(),
            decision_log: None,
            enforcing: AtomicBool::new(true),
        }
    }

    /// Attach a decision log.
    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.decision_log = Some(log);
        self
    }

    /// The enforced policy.
    pub fn policy(&self) -> &PolicyModel {
        &self.policy
    }

    /// The caller identifier in use.
    pub fn identifier(&self) -> &CallerIdentifier {
        &self.identifier
    }

    /// Point-in-time access counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether mediated operations are currently enforced.
    pub fn is_enforcing(&self) -> bool {
        self.enforcing.load(Ordering::Acquire)
    }

    pub(crate) fn set_enforcing(&self, enforcing: bool) {
        self.enforcing.store(enforcing, Ordering::Release);
    }

    /// Mediated read.
    pub fn get(&self, name: &str) -> Result<Option<String>, DotnopeError> {
        if self.forwards_directly(name) {
            return Ok(self.store.get(name));
        }
        self.authorize(Operation::Read, name)?;
        Ok(self.store.get(name))
    }

    /// Mediated write. The store is untouched on denial.
    pub fn set(&self, name: &str, value: &str) -> Result<(), DotnopeError> {
        if self.forwards_directly(name) {
            self.store.set(name, value);
            return Ok(());
        }
        self.authorize(Operation::Write, name)?;
        self.store.set(name, value);
        Ok(())
    }

    /// Mediated delete. The store is untouched on denial.
    pub fn remove(&self, name: &str) -> Result<bool, DotnopeError> {
        if self.forwards_directly(name) {
            return Ok(self.store.remove(name));
        }
        self.authorize(Operation::Delete, name)?;
        Ok(self.store.remove(name))
    }

    /// Mediated membership test (a read).
    pub fn contains(&self, name: &str) -> Result<bool, DotnopeError> {
        if self.forwards_directly(name) {
            return Ok(self.store.contains(name));
        }
        self.authorize(Operation::Read, name)?;
        Ok(self.store.contains(name))
    }

    /// Mediated descriptor query (a read).
    pub fn describe(&self, name: &str) -> Result<Option<VarDescriptor>, DotnopeError> {
        if !self.forwards_directly(name) {
            self.authorize(Operation::Read, name)?;
        }
        Ok(self.store.get(name).map(|value| VarDescriptor {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }))
    }

    /// Mediated own-key enumeration. Never raises: denial is expressed by
    /// key omission.
    pub fn keys(&self) -> Vec<String> {
        if !self.is_enforcing() || !self.policy.options.protect_enumeration {
            return self.store.keys();
        }

        let caller = self.identifier.resolve();
        match decide(&caller, Operation::Enumerate, WILDCARD, &self.policy) {
            Verdict::Allow => {
                self.stats.record(Operation::Enumerate, true);
                let all = self.store.keys();
                match &caller.id {
                    // Unrestricted main and fail-open unknown see everything;
                    // anything else sees its visible subset.
                    CallerId::Main if self.policy.options.treat_main_as_unrestricted => all,
                    CallerId::Unknown => all,
                    id => self.policy.visible_keys(id.label(), &all),
                }
            }
            Verdict::Deny(err) => {
                self.stats.record(Operation::Enumerate, false);
                self.log(&caller, WILDCARD, Operation::Enumerate, AccessOutcome::Denied, Some(err.code()));
                Vec::new()
            }
        }
    }

    /// Names outside the variable alphabet are the runtime's reflection
    /// namespace: forwarded untouched, no identification, no policy.
    fn forwards_directly(&self, name: &str) -> bool {
        !self.is_enforcing() || !is_variable_name(name)
    }

    fn authorize(&self, op: Operation, name: &str) -> Result<(), DotnopeError> {
        let caller = self.identifier.resolve();
        match decide(&caller, op, name, &self.policy) {
            Verdict::Allow => {
                self.stats.record(op, true);
                self.log(&caller, name, op, AccessOutcome::Allowed, None);
                Ok(())
            }
            Verdict::Deny(err) => {
                self.stats.record(op, false);
                debug!(
                    caller = caller.id.label(),
                    variable = name,
                    operation = %op,
                    code = err.code(),
                    "access denied"
                );
                self.log(&caller, name, op, AccessOutcome::Denied, Some(err.code()));
                Err(err)
            }
        }
    }

    fn log(
        &self,
        caller: &ResolvedCaller,
        variable: &str,
        op: Operation,
        outcome: AccessOutcome,
        reason: Option<&str>,
    ) {
        if let Some(ref log) = self.decision_log {
            if let Err(e) = log.log_decision(&caller.id, variable, op, outcome, reason) {
                debug!(error = %e, "decision log write failed");
            }
        }
    }
}
