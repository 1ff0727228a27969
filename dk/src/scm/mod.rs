//! Source-control host port
//!
//! [`SourceHost`] resolves a branch to its head commit and creates new refs.
//! [`GitHubClient`] implements it against the GitHub REST API.

mod github;

use async_trait::async_trait;

use crate::provision::ProvisionError;

pub use github::GitHubClient;

/// GitHub-style source-control host
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Commit SHA the branch currently points at
    async fn branch_head(&self, branch: &str) -> Result<String, ProvisionError>;

    /// Create `refs/heads/<branch>` pointing at `sha`
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), ProvisionError>;
}
