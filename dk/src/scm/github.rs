//! GitHub REST client for branch creation

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::SourceHost;
use crate::config::ScmConfig;
use crate::provision::ProvisionError;

const API_VERSION: &str = "2022-11-28";

/// GitHub API client scoped to one `owner/repo`
pub struct GitHubClient {
    api_url: String,
    repository: String,
    token: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
            http,
        })
    }

    /// Build a client from configuration, reading the token from the environment
    pub fn from_config(config: &ScmConfig) -> eyre::Result<Self> {
        debug!(api_url = %config.api_url, repository = %config.repository, "GitHubClient::from_config: called");
        let token = config.token()?;
        let client = Self::new(
            &config.api_url,
            &config.repository,
            token,
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(client)
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repository, tail)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn branch_head(&self, branch: &str) -> Result<String, ProvisionError> {
        let url = self.repo_url(&format!("branches/{}", branch));
        debug!(%url, "GitHubClient::branch_head: called");

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(ProvisionError::network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status, "GitHubClient::branch_head: error response");
            return Err(ProvisionError::from_status(status, text));
        }

        let branch_info: BranchResponse = response
            .json()
            .await
            .map_err(|e| ProvisionError::invalid_response(Some(status), e.to_string()))?;
        debug!(sha = %branch_info.commit.sha, "GitHubClient::branch_head: resolved");
        Ok(branch_info.commit.sha)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), ProvisionError> {
        let url = self.repo_url("git/refs");
        debug!(%url, %branch, %sha, "GitHubClient::create_branch: called");

        let body = serde_json::json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": sha,
        });
        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(ProvisionError::network)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            debug!(status, body = %text, "GitHubClient::create_branch: rejected");
            return Err(ProvisionError::from_status(status, text));
        }

        info!("Created branch {} at {}", branch, sha);
        Ok(())
    }
}
