//! Decision log — structured JSON entries, one per line, append-only.
//!
//! Records mediated-access outcomes for after-the-fact review. Variable
//! values never appear in entries, only names and verdicts.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::types::{CallerId, Operation};

/// Verdict recorded for one access.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The access proceeded against the underlying store.
    Allowed,
    /// The access was refused or filtered.
    Denied,
}

#[derive(Debug, Serialize)]
struct DecisionEntry<'a> {
    timestamp: String,
    caller: &'a str,
    variable: &'a str,
    operation: Operation,
    outcome: AccessOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Append-only JSONL writer for mediation decisions.
pub struct DecisionLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl DecisionLog {
    /// Log appending to the given file path.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Log over an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Record one decision.
    pub fn log_decision(
        &self,
        caller: &CallerId,
        variable: &str,
        operation: Operation,
        outcome: AccessOutcome,
        reason: Option<&str>,
    ) -> anyhow::Result<()> {
        let entry = DecisionEntry {
            timestamp: Utc::now().to_rfc3339(),
            caller: caller.label(),
            variable,
            operation,
            outcome,
            reason,
        };
        let line = serde_json::to_string(&entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("decision log lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
