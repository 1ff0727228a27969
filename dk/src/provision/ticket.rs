//! TicketProvisioner - ticket operations against an IssueTracker

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ProvisionError;
use crate::config::TrackerConfig;
use crate::domain::TaskTree;
use crate::planning::{Action, ProvisionOperation};
use crate::tracker::{IssueTracker, NewIssue};

/// Jira rejects summaries longer than this
const MAX_SUMMARY_CHARS: usize = 255;

/// Project, type and description rules for new tickets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPolicy {
    pub project_key: String,
    /// Requested type per depth; deeper levels reuse the last entry
    pub issue_types: Vec<String>,
    pub fallback_issue_type: String,
    pub root_description: String,
}

impl TicketPolicy {
    /// Issue type requested for a node at `depth` (0 = root)
    pub fn requested_type(&self, depth: usize) -> &str {
        self.issue_types
            .get(depth)
            .or_else(|| self.issue_types.last())
            .map(String::as_str)
            .unwrap_or(&self.fallback_issue_type)
    }

    fn description(&self, parent_key: Option<&str>) -> String {
        match parent_key {
            Some(parent) => format!("Sub-task of {}", parent),
            None => self.root_description.clone(),
        }
    }
}

impl From<&TrackerConfig> for TicketPolicy {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            project_key: config.project_key.clone(),
            issue_types: config.issue_types.clone(),
            fallback_issue_type: config.fallback_issue_type.clone(),
            root_description: config.root_description.clone(),
        }
    }
}

/// The requested issue type was not valid and the fallback was used instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueTypeSubstitution {
    pub requested: String,
    pub used: String,
}

/// A ticket the tracker accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketCreated {
    pub key: String,
    pub issue_type: String,
    pub substitution: Option<IssueTypeSubstitution>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
enum ValidTypes {
    Known(Vec<String>),
    /// Lookup failed; requested types are sent unverified
    Unavailable(String),
}

/// Creates tickets one at a time, holding the per-run issue type lookup
pub struct TicketProvisioner {
    tracker: Arc<dyn IssueTracker>,
    policy: TicketPolicy,
    valid_types: Option<ValidTypes>,
}

impl TicketProvisioner {
    pub fn new(tracker: Arc<dyn IssueTracker>, policy: TicketPolicy) -> Self {
        Self {
            tracker,
            policy,
            valid_types: None,
        }
    }

    pub fn policy(&self) -> &TicketPolicy {
        &self.policy
    }

    /// Fetch the valid issue type set, once per provisioner
    ///
    /// Returns a warning the first time the lookup fails. The lookup is not
    /// retried; later tickets use their requested type unverified.
    pub async fn load_issue_types(&mut self) -> Option<String> {
        if self.valid_types.is_some() {
            return None;
        }
        debug!("load_issue_types: fetching issue types");

        match self.tracker.issue_types().await {
            Ok(types) => {
                debug!(count = types.len(), "load_issue_types: loaded");
                self.valid_types = Some(ValidTypes::Known(types));
                None
            }
            Err(e) => {
                let warning = format!("Issue type lookup failed, using requested types unverified: {}", e);
                warn!("{}", warning);
                self.valid_types = Some(ValidTypes::Unavailable(e.to_string()));
                Some(warning)
            }
        }
    }

    /// Pick the type to send, recording any substitution or warning
    fn negotiate_type(&self, requested: &str) -> (String, Option<IssueTypeSubstitution>, Vec<String>) {
        match &self.valid_types {
            Some(ValidTypes::Known(valid)) if valid.iter().any(|t| t == requested) => {
                (requested.to_string(), None, Vec::new())
            }
            Some(ValidTypes::Known(_)) => {
                let used = self.policy.fallback_issue_type.clone();
                warn!("Issue type '{}' not found, falling back to '{}'", requested, used);
                let substitution = IssueTypeSubstitution {
                    requested: requested.to_string(),
                    used: used.clone(),
                };
                (used, Some(substitution), Vec::new())
            }
            Some(ValidTypes::Unavailable(reason)) => {
                let warning = format!("Issue type '{}' not verified: {}", requested, reason);
                (requested.to_string(), None, vec![warning])
            }
            None => (requested.to_string(), None, Vec::new()),
        }
    }

    /// Create the ticket for `op.node`, linked under `resolved_parent` when given
    pub async fn execute(
        &mut self,
        tree: &TaskTree,
        op: &ProvisionOperation,
        resolved_parent: Option<&str>,
    ) -> Result<TicketCreated, ProvisionError> {
        debug!(node = %op.node, parent = ?resolved_parent, "TicketProvisioner::execute: called");
        if op.action != Action::CreateTicket {
            return Err(ProvisionError::invalid_operation(format!(
                "{} operation sent to the ticket provisioner",
                op.kind()
            )));
        }
        let node = tree
            .node(op.node)
            .ok_or_else(|| ProvisionError::invalid_operation(format!("Unknown node {}", op.node)))?;
        if op.parent.is_some() && resolved_parent.is_none() {
            return Err(ProvisionError::invalid_operation(format!(
                "Parent ticket of {} has no key",
                op.node
            )));
        }

        let mut warnings = Vec::new();
        if let Some(warning) = self.load_issue_types().await {
            warnings.push(warning);
        }

        let requested = self.policy.requested_type(node.depth()).to_string();
        let (issue_type, substitution, type_warnings) = self.negotiate_type(&requested);
        warnings.extend(type_warnings);

        let issue = NewIssue {
            project_key: self.policy.project_key.clone(),
            summary: truncate_summary(node.label()),
            description: self.policy.description(resolved_parent),
            issue_type: issue_type.clone(),
            parent_key: resolved_parent.map(String::from),
        };

        let key = self.tracker.create_issue(&issue).await?;
        info!("Ticket {} created for '{}'", key, node.label());
        Ok(TicketCreated {
            key,
            issue_type,
            substitution,
            warnings,
        })
    }
}

fn truncate_summary(label: &str) -> String {
    if label.chars().count() <= MAX_SUMMARY_CHARS {
        return label.to_string();
    }
    label.chars().take(MAX_SUMMARY_CHARS).collect()
}
