//! OutcomeLedger - what happened to every planned operation

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::domain::NodeId;
use crate::planning::{OperationKind, ProvisionOperation};
use crate::provision::{IssueTypeSubstitution, ProvisionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Planned, not attempted
    Pending,
    Created,
    Failed,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Created => write!(f, "created"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why an entry ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The tracker or host rejected this operation
    OwnError { error: ProvisionError },
    /// Not attempted: the parent's ticket was never created
    ParentFailed { parent: NodeId },
    /// Not attempted: the base branch could not be resolved
    BaseBranchUnavailable { base: String, error: ProvisionError },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnError { error } => write!(f, "{}", error),
            Self::ParentFailed { parent } => write!(f, "skipped: parent {} failed", parent),
            Self::BaseBranchUnavailable { base, error } => {
                write!(f, "skipped: base branch '{}' unavailable ({})", base, error)
            }
        }
    }
}

/// One operation's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub node: NodeId,
    pub kind: OperationKind,
    pub label: String,
    pub status: EntryStatus,
    /// Ticket key or branch ref
    pub external_ref: Option<String>,
    pub failure: Option<FailureReason>,
    pub substitution: Option<IssueTypeSubstitution>,
    pub warnings: Vec<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("No ledger entry for {kind} operation on {node}")]
    UnknownEntry { node: NodeId, kind: OperationKind },

    #[error("Ledger entry for {kind} operation on {node} already finished")]
    AlreadyFinished { node: NodeId, kind: OperationKind },
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub created: usize,
    pub failed: usize,
    pub pending: usize,
}

impl LedgerSummary {
    pub fn total(&self) -> usize {
        self.created + self.failed + self.pending
    }
}

/// Outcome of every planned operation in one run, in plan order
///
/// Entries are registered `Pending` when the plan is accepted and finished
/// at most once. Mutation is crate-private; callers receive the ledger by
/// value once the run is over.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeLedger {
    entries: Vec<LedgerEntry>,
    #[serde(skip)]
    index: HashMap<(NodeId, OperationKind), usize>,
    warnings: Vec<String>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, op: &ProvisionOperation, label: &str) {
        let key = (op.node, op.kind());
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(LedgerEntry {
            node: op.node,
            kind: op.kind(),
            label: label.to_string(),
            status: EntryStatus::Pending,
            external_ref: None,
            failure: None,
            substitution: None,
            warnings: Vec::new(),
            finished_at: None,
        });
    }

    fn pending_entry(&mut self, node: NodeId, kind: OperationKind) -> Result<&mut LedgerEntry, LedgerError> {
        let idx = *self.index.get(&(node, kind)).ok_or(LedgerError::UnknownEntry { node, kind })?;
        let entry = &mut self.entries[idx];
        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::AlreadyFinished { node, kind });
        }
        Ok(entry)
    }

    pub(crate) fn mark_created(
        &mut self,
        node: NodeId,
        kind: OperationKind,
        external_ref: impl Into<String>,
        substitution: Option<IssueTypeSubstitution>,
        warnings: Vec<String>,
    ) -> Result<(), LedgerError> {
        let entry = self.pending_entry(node, kind)?;
        entry.status = EntryStatus::Created;
        entry.external_ref = Some(external_ref.into());
        entry.substitution = substitution;
        entry.warnings.extend(warnings);
        entry.finished_at = Some(Utc::now());
        debug!(%node, %kind, external_ref = ?entry.external_ref, "OutcomeLedger::mark_created");
        Ok(())
    }

    pub(crate) fn mark_failed(
        &mut self,
        node: NodeId,
        kind: OperationKind,
        reason: FailureReason,
        warnings: Vec<String>,
    ) -> Result<(), LedgerError> {
        let entry = self.pending_entry(node, kind)?;
        debug!(%node, %kind, %reason, "OutcomeLedger::mark_failed");
        entry.status = EntryStatus::Failed;
        entry.failure = Some(reason);
        entry.warnings.extend(warnings);
        entry.finished_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn get(&self, node: NodeId, kind: OperationKind) -> Option<&LedgerEntry> {
        self.index.get(&(node, kind)).map(|idx| &self.entries[*idx])
    }

    pub fn status(&self, node: NodeId, kind: OperationKind) -> Option<EntryStatus> {
        self.get(node, kind).map(|e| e.status)
    }

    /// Entries in plan order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entries_of(&self, kind: OperationKind) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Run-level warnings (not tied to one operation)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for entry in &self.entries {
            match entry.status {
                EntryStatus::Created => summary.created += 1,
                EntryStatus::Failed => summary.failed += 1,
                EntryStatus::Pending => summary.pending += 1,
            }
        }
        summary
    }

    /// Every entry was attempted
    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(|e| e.status != EntryStatus::Pending)
    }
}
