//! BranchProvisioner - branch operations against a SourceHost

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{BranchError, ProvisionError};
use crate::planning::ProvisionOperation;
use crate::scm::SourceHost;

/// A branch the host accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchCreated {
    pub name: String,
    /// Full ref, `refs/heads/<name>`
    pub ref_name: String,
    pub sha: String,
}

/// Creates branches cut from one base branch
///
/// The base branch head is resolved on first use and cached, failure
/// included, for the lifetime of the provisioner. `execute` takes `&self`
/// so several branch operations can be in flight at once.
pub struct BranchProvisioner {
    host: Arc<dyn SourceHost>,
    base_branch: String,
    base_sha: OnceCell<Result<String, ProvisionError>>,
}

impl BranchProvisioner {
    pub fn new(host: Arc<dyn SourceHost>, base_branch: impl Into<String>) -> Self {
        Self {
            host,
            base_branch: base_branch.into(),
            base_sha: OnceCell::new(),
        }
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Head commit of the base branch
    pub async fn resolve_base(&self) -> Result<String, BranchError> {
        let resolved = self
            .base_sha
            .get_or_init(|| async {
                debug!(base = %self.base_branch, "resolve_base: looking up base branch");
                let result = self.host.branch_head(&self.base_branch).await;
                match &result {
                    Ok(sha) => info!("Base branch {} is at {}", self.base_branch, sha),
                    Err(e) => warn!("Base branch {} unavailable: {}", self.base_branch, e),
                }
                result
            })
            .await;

        resolved.clone().map_err(|source| BranchError::BaseBranchNotFound {
            base: self.base_branch.clone(),
            source,
        })
    }

    /// Create the branch named by a branch operation
    pub async fn execute(&self, op: &ProvisionOperation) -> Result<BranchCreated, BranchError> {
        let name = op.branch_name().ok_or_else(|| {
            ProvisionError::invalid_operation(format!("{} operation sent to the branch provisioner", op.kind()))
        })?;
        debug!(node = %op.node, %name, "BranchProvisioner::execute: called");

        let sha = self.resolve_base().await?;
        self.host.create_branch(name, &sha).await?;

        Ok(BranchCreated {
            name: name.to_string(),
            ref_name: format!("refs/heads/{}", name),
            sha,
        })
    }
}
