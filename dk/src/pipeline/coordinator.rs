//! PipelineCoordinator - document in, tickets and branches out
//!
//! One run owns its tree and ledger. Ticket operations run strictly in plan
//! order so a child is only sent once its parent has a key; branch
//! operations run afterwards, cut from a base branch resolved once, with
//! bounded concurrency. A [`StopSignal`] is checked before every operation.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{ProgressBus, ProgressEmitter, StopSignal};
use super::ledger::{EntryStatus, FailureReason, LedgerError, OutcomeLedger};
use super::state::{RunState, StateTracker};
use crate::config::Config;
use crate::domain::{NodeId, TaskTree, TreeError};
use crate::extract::{ExtractError, HierarchyExtractor, NormalizedText, TextNormalizer};
use crate::hierarchy::{self, ParseError};
use crate::llm::LlmError;
use crate::planning::{self, OperationKind, ProvisionOperation};
use crate::provision::{BranchError, BranchProvisioner, TicketPolicy, TicketProvisioner};
use crate::scm::SourceHost;
use crate::tracker::IssueTracker;

/// Per-run knobs taken from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub ticket_policy: TicketPolicy,
    pub base_branch: String,
    /// Maximum branch creations in flight
    pub branch_concurrency: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ticket_policy: TicketPolicy::from(&config.tracker),
            base_branch: config.scm.base_branch.clone(),
            branch_concurrency: config.pipeline.branch_concurrency,
        }
    }

    pub fn with_base_branch(mut self, base_branch: impl Into<String>) -> Self {
        self.base_branch = base_branch.into();
        self
    }
}

/// Why a run stopped before attempting every operation
#[derive(Debug, Error)]
pub enum AbortReason {
    #[error("Model call failed: {0}")]
    ExtractionCall(#[from] LlmError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<ExtractError> for AbortReason {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Call(e) => Self::ExtractionCall(e),
            ExtractError::Prompt(msg) => Self::Unexpected(msg),
        }
    }
}

impl From<LedgerError> for AbortReason {
    fn from(e: LedgerError) -> Self {
        Self::Unexpected(e.to_string())
    }
}

impl From<TreeError> for AbortReason {
    fn from(e: TreeError) -> Self {
        Self::Unexpected(e.to_string())
    }
}

/// Everything known about a run that ended early
#[derive(Debug)]
pub struct AbortReport {
    pub run_id: String,
    pub reason: AbortReason,
    /// State the run was in when it aborted
    pub last_state: RunState,
    /// Model text, when the model answered
    pub raw_response: Option<String>,
    /// Tree, when parsing succeeded; tickets created so far carry their keys
    pub tree: Option<TaskTree>,
    /// Ledger as of the last completed operation
    pub ledger: OutcomeLedger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A run that attempted every planned operation
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub tree: TaskTree,
    pub ledger: OutcomeLedger,
    pub raw_response: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(RunReport),
    Aborted(AbortReport),
}

impl PipelineOutcome {
    pub fn ledger(&self) -> &OutcomeLedger {
        match self {
            Self::Completed(report) => &report.ledger,
            Self::Aborted(report) => &report.ledger,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Completed(report) => &report.run_id,
            Self::Aborted(report) => &report.run_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Parsed tree ready for review
#[derive(Debug)]
pub struct Extraction {
    pub run_id: String,
    pub document: NormalizedText,
    pub raw_response: String,
    pub tree: TaskTree,
}

/// Per-run mutable state
struct RunContext {
    run_id: String,
    emitter: ProgressEmitter,
    state: StateTracker,
    ledger: OutcomeLedger,
    started_at: DateTime<Utc>,
}

impl RunContext {
    fn new(bus: Option<&ProgressBus>) -> Self {
        let run_id = Uuid::now_v7().to_string();
        let emitter = match bus {
            Some(bus) => bus.emitter_for(run_id.clone()),
            None => ProgressEmitter::detached(run_id.clone()),
        };
        Self {
            run_id,
            emitter,
            state: StateTracker::default(),
            ledger: OutcomeLedger::new(),
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, next: RunState) -> Result<(), AbortReason> {
        let from = self.state.advance(next).map_err(|e| AbortReason::Unexpected(e.to_string()))?;
        info!(run_id = %self.run_id, "Run {} -> {}", from, next);
        self.emitter.state_changed(from, next);
        Ok(())
    }

    fn warn(&mut self, message: String) {
        warn!(run_id = %self.run_id, "{}", message);
        self.ledger.push_warning(message.clone());
        self.emitter.warning(message);
    }

    fn abort(mut self, reason: AbortReason, raw_response: Option<String>, tree: Option<TaskTree>) -> AbortReport {
        let last_state = self.state.current();
        warn!(run_id = %self.run_id, %last_state, "Run aborted: {}", reason);
        if self.state.advance(RunState::Aborted).is_ok() {
            self.emitter.state_changed(last_state, RunState::Aborted);
        }
        AbortReport {
            run_id: self.run_id,
            reason,
            last_state,
            raw_response,
            tree,
            ledger: self.ledger,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn complete(mut self, tree: TaskTree, raw_response: Option<String>) -> PipelineOutcome {
        if let Err(reason) = self.advance(RunState::Completed) {
            return PipelineOutcome::Aborted(self.abort(reason, raw_response, Some(tree)));
        }
        let summary = self.ledger.summary();
        info!(
            run_id = %self.run_id,
            created = summary.created,
            failed = summary.failed,
            "Run completed"
        );
        PipelineOutcome::Completed(RunReport {
            run_id: self.run_id,
            tree,
            ledger: self.ledger,
            raw_response,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Sequences normalization, extraction, parsing, planning and provisioning
pub struct PipelineCoordinator {
    extractor: HierarchyExtractor,
    normalizer: TextNormalizer,
    tracker: Option<Arc<dyn IssueTracker>>,
    host: Option<Arc<dyn SourceHost>>,
    settings: PipelineSettings,
    bus: Option<Arc<ProgressBus>>,
    stop: StopSignal,
}

impl PipelineCoordinator {
    pub fn new(extractor: HierarchyExtractor, settings: PipelineSettings) -> Self {
        Self {
            extractor,
            normalizer: TextNormalizer::default(),
            tracker: None,
            host: None,
            settings,
            bus: None,
            stop: StopSignal::new(),
        }
    }

    /// Required for provisioning
    pub fn with_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Branches are only created when a source host is set
    pub fn with_source_host(mut self, host: Arc<dyn SourceHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_progress(mut self, bus: Arc<ProgressBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn creates_branches(&self) -> bool {
        self.host.is_some()
    }

    /// Full pipeline: extract, parse, plan, provision
    pub async fn run(&self, document: &str) -> PipelineOutcome {
        let mut ctx = RunContext::new(self.bus.as_deref());
        debug!(run_id = %ctx.run_id, chars = document.len(), "PipelineCoordinator::run: called");

        let (document, raw_response, mut tree) = match self.extract_in(&mut ctx, document).await {
            Ok(extracted) => extracted,
            Err((reason, raw)) => return PipelineOutcome::Aborted(ctx.abort(reason, raw, None)),
        };
        debug!(truncated = document.truncated, nodes = tree.len(), "PipelineCoordinator::run: extracted");

        match self.provision_in(&mut ctx, &mut tree).await {
            Ok(()) => ctx.complete(tree, Some(raw_response)),
            Err(reason) => PipelineOutcome::Aborted(ctx.abort(reason, Some(raw_response), Some(tree))),
        }
    }

    /// Extract and parse only, for review before provisioning
    pub async fn extract_tree(&self, document: &str) -> Result<Extraction, AbortReport> {
        let mut ctx = RunContext::new(self.bus.as_deref());
        debug!(run_id = %ctx.run_id, "PipelineCoordinator::extract_tree: called");

        let (document, raw_response, tree) = match self.extract_in(&mut ctx, document).await {
            Ok(extracted) => extracted,
            Err((reason, raw)) => return Err(ctx.abort(reason, raw, None)),
        };
        if let Err(reason) = ctx.advance(RunState::Completed) {
            return Err(ctx.abort(reason, Some(raw_response), Some(tree)));
        }

        Ok(Extraction {
            run_id: ctx.run_id,
            document,
            raw_response,
            tree,
        })
    }

    /// Plan and provision an already-parsed tree
    pub async fn provision(&self, mut tree: TaskTree) -> PipelineOutcome {
        let mut ctx = RunContext::new(self.bus.as_deref());
        debug!(run_id = %ctx.run_id, nodes = tree.len(), "PipelineCoordinator::provision: called");

        match self.provision_in(&mut ctx, &mut tree).await {
            Ok(()) => ctx.complete(tree, None),
            Err(reason) => PipelineOutcome::Aborted(ctx.abort(reason, None, Some(tree))),
        }
    }

    async fn extract_in(
        &self,
        ctx: &mut RunContext,
        document: &str,
    ) -> Result<(NormalizedText, String, TaskTree), (AbortReason, Option<String>)> {
        ctx.advance(RunState::Extracting).map_err(|r| (r, None))?;
        self.check_stop().map_err(|r| (r, None))?;

        let normalized = self.normalizer.normalize(document);
        if normalized.truncated {
            ctx.warn(format!(
                "Document truncated from {} to {} characters before extraction",
                normalized.original_chars,
                normalized.text.chars().count()
            ));
        }

        let raw_response = self
            .extractor
            .extract(&normalized)
            .await
            .map_err(|e| (AbortReason::from(e), None))?;

        ctx.advance(RunState::Parsing)
            .map_err(|r| (r, Some(raw_response.clone())))?;
        match hierarchy::parse(&raw_response) {
            Ok(tree) => {
                info!(run_id = %ctx.run_id, nodes = tree.len(), roots = tree.roots().len(), "Hierarchy parsed");
                Ok((normalized, raw_response, tree))
            }
            Err(e) => Err((AbortReason::Parse(e), Some(raw_response))),
        }
    }

    async fn provision_in(&self, ctx: &mut RunContext, tree: &mut TaskTree) -> Result<(), AbortReason> {
        ctx.advance(RunState::Planning)?;
        let tracker = self
            .tracker
            .clone()
            .ok_or_else(|| AbortReason::Unexpected("No issue tracker configured".to_string()))?;

        let operations: Vec<ProvisionOperation> = planning::plan(tree)
            .into_iter()
            .filter(|op| self.creates_branches() || op.kind() == OperationKind::Ticket)
            .collect();
        for op in &operations {
            let label = tree.node(op.node).map(|n| n.label()).unwrap_or_default();
            ctx.ledger.register(op, label);
        }
        info!(run_id = %ctx.run_id, operations = operations.len(), "Plan accepted");

        ctx.advance(RunState::Provisioning)?;
        self.ticket_phase(ctx, tree, &operations, tracker).await?;
        if let Some(host) = self.host.clone() {
            self.branch_phase(ctx, tree, &operations, host).await?;
        }
        Ok(())
    }

    fn check_stop(&self) -> Result<(), AbortReason> {
        if self.stop.is_stopped() {
            info!("Stop requested, not starting further operations");
            return Err(AbortReason::Cancelled);
        }
        Ok(())
    }

    async fn ticket_phase(
        &self,
        ctx: &mut RunContext,
        tree: &mut TaskTree,
        operations: &[ProvisionOperation],
        tracker: Arc<dyn IssueTracker>,
    ) -> Result<(), AbortReason> {
        let ticket_ops: Vec<&ProvisionOperation> = operations
            .iter()
            .filter(|op| op.kind() == OperationKind::Ticket)
            .collect();
        if ticket_ops.is_empty() {
            return Ok(());
        }

        let mut provisioner = TicketProvisioner::new(tracker, self.settings.ticket_policy.clone());
        self.check_stop()?;
        if let Some(warning) = provisioner.load_issue_types().await {
            ctx.warn(warning);
        }

        for op in ticket_ops {
            if ctx.ledger.status(op.node, OperationKind::Ticket) != Some(EntryStatus::Pending) {
                continue;
            }
            self.check_stop()?;

            let label = tree.node(op.node).ok_or(TreeError::UnknownNode(op.node))?.label().to_string();
            let parent_key = match op.parent {
                None => None,
                Some(parent) => Some(
                    tree.node(parent)
                        .and_then(|n| n.external_ref())
                        .map(String::from)
                        .ok_or_else(|| {
                            AbortReason::Unexpected(format!("Ticket for {} attempted before its parent {}", op.node, parent))
                        })?,
                ),
            };

            ctx.emitter.operation_started(op.node, OperationKind::Ticket, &label);
            match provisioner.execute(tree, op, parent_key.as_deref()).await {
                Ok(created) => {
                    tree.set_external_ref(op.node, created.key.clone())?;
                    if let Some(sub) = &created.substitution {
                        ctx.emitter.warning(format!(
                            "'{}': issue type '{}' not available, created as '{}'",
                            label, sub.requested, sub.used
                        ));
                    }
                    ctx.ledger.mark_created(
                        op.node,
                        OperationKind::Ticket,
                        created.key.clone(),
                        created.substitution,
                        created.warnings,
                    )?;
                    ctx.emitter
                        .operation_finished(op.node, OperationKind::Ticket, EntryStatus::Created, Some(created.key), None);
                }
                Err(error) => {
                    warn!(node = %op.node, %label, "Ticket creation failed: {}", error);
                    let detail = error.to_string();
                    ctx.ledger
                        .mark_failed(op.node, OperationKind::Ticket, FailureReason::OwnError { error }, Vec::new())?;
                    ctx.emitter
                        .operation_finished(op.node, OperationKind::Ticket, EntryStatus::Failed, None, Some(detail));
                    Self::skip_descendants(ctx, tree, op.node)?;
                }
            }
        }
        Ok(())
    }

    /// Fail every pending descendant ticket of `failed` without calling the tracker
    fn skip_descendants(ctx: &mut RunContext, tree: &TaskTree, failed: NodeId) -> Result<(), AbortReason> {
        for id in tree.pre_order() {
            if !tree.is_ancestor(failed, id) || ctx.ledger.status(id, OperationKind::Ticket) != Some(EntryStatus::Pending) {
                continue;
            }
            let parent = tree.node(id).and_then(|n| n.parent()).unwrap_or(failed);
            let reason = FailureReason::ParentFailed { parent };
            let detail = reason.to_string();
            ctx.ledger.mark_failed(id, OperationKind::Ticket, reason, Vec::new())?;
            ctx.emitter
                .operation_finished(id, OperationKind::Ticket, EntryStatus::Failed, None, Some(detail));
        }
        Ok(())
    }

    async fn branch_phase(
        &self,
        ctx: &mut RunContext,
        tree: &TaskTree,
        operations: &[ProvisionOperation],
        host: Arc<dyn SourceHost>,
    ) -> Result<(), AbortReason> {
        let branch_ops: Vec<&ProvisionOperation> = operations
            .iter()
            .filter(|op| op.kind() == OperationKind::Branch)
            .collect();
        if branch_ops.is_empty() {
            return Ok(());
        }

        self.check_stop()?;
        let provisioner = BranchProvisioner::new(host, self.settings.base_branch.clone());
        if let Err(err) = provisioner.resolve_base().await {
            let (base, error) = match err {
                BranchError::BaseBranchNotFound { base, source } => (base, source),
                BranchError::Provision(e) => (self.settings.base_branch.clone(), e),
            };
            ctx.warn(format!("Base branch '{}' unavailable, no branches created: {}", base, error));
            for op in branch_ops {
                let reason = FailureReason::BaseBranchUnavailable {
                    base: base.clone(),
                    error: error.clone(),
                };
                let detail = reason.to_string();
                ctx.ledger.mark_failed(op.node, OperationKind::Branch, reason, Vec::new())?;
                ctx.emitter
                    .operation_finished(op.node, OperationKind::Branch, EntryStatus::Failed, None, Some(detail));
            }
            return Ok(());
        }

        let stop = &self.stop;
        let emitter = ctx.emitter.clone();
        let provisioner = &provisioner;
        let mut results = futures::stream::iter(branch_ops)
            .take_while(|_| futures::future::ready(!stop.is_stopped()))
            .map(|op| {
                let label = tree.node(op.node).map(|n| n.label()).unwrap_or_default();
                emitter.operation_started(op.node, OperationKind::Branch, label);
                async move { (op, provisioner.execute(op).await) }
            })
            .buffer_unordered(self.settings.branch_concurrency.max(1));

        while let Some((op, result)) = results.next().await {
            match result {
                Ok(created) => {
                    ctx.ledger
                        .mark_created(op.node, OperationKind::Branch, created.ref_name.clone(), None, Vec::new())?;
                    ctx.emitter.operation_finished(
                        op.node,
                        OperationKind::Branch,
                        EntryStatus::Created,
                        Some(created.ref_name),
                        None,
                    );
                }
                Err(err) => {
                    let reason = match err {
                        BranchError::Provision(error) => FailureReason::OwnError { error },
                        BranchError::BaseBranchNotFound { base, source } => {
                            FailureReason::BaseBranchUnavailable { base, error: source }
                        }
                    };
                    warn!(node = %op.node, "Branch creation failed: {}", reason);
                    let detail = reason.to_string();
                    ctx.ledger.mark_failed(op.node, OperationKind::Branch, reason, Vec::new())?;
                    ctx.emitter
                        .operation_finished(op.node, OperationKind::Branch, EntryStatus::Failed, None, Some(detail));
                }
            }
        }

        if self.stop.is_stopped() && !ctx.ledger.is_settled() {
            info!("Stop requested, remaining branches left pending");
            return Err(AbortReason::Cancelled);
        }
        Ok(())
    }
}
