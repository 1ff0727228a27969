//! Jira Cloud REST client
//!
//! Issue types come from `GET /rest/api/3/issuetype`. Issues are created via
//! `POST /rest/api/3/issue` with an Atlassian Document Format description,
//! or `POST /rest/api/2/issue` when plain-text descriptions are configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{IssueTracker, NewIssue};
use crate::config::{DescriptionFormat, TrackerConfig};
use crate::provision::ProvisionError;

/// Jira REST API client (basic auth: account email + API token)
pub struct JiraClient {
    base_url: String,
    email: String,
    api_token: String,
    description_format: DescriptionFormat,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IssueTypeEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

impl JiraClient {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
        description_format: DescriptionFormat,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            api_token: api_token.into(),
            description_format,
            http,
        })
    }

    /// Build a client from configuration, reading credentials from the environment
    pub fn from_config(config: &TrackerConfig) -> eyre::Result<Self> {
        debug!(base_url = %config.base_url, project = %config.project_key, "JiraClient::from_config: called");
        let email = config.email()?;
        let api_token = config.api_token()?;
        let client = Self::new(
            &config.base_url,
            email,
            api_token,
            config.description_format,
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(client)
    }

    fn issue_url(&self) -> String {
        match self.description_format {
            DescriptionFormat::Adf => format!("{}/rest/api/3/issue", self.base_url),
            DescriptionFormat::Plain => format!("{}/rest/api/2/issue", self.base_url),
        }
    }

    /// Request body for issue creation
    fn build_issue_body(&self, issue: &NewIssue) -> serde_json::Value {
        let description = match self.description_format {
            DescriptionFormat::Adf => adf_paragraph(&issue.description),
            DescriptionFormat::Plain => serde_json::json!(issue.description),
        };

        let mut body = serde_json::json!({
            "fields": {
                "project": { "key": issue.project_key },
                "summary": issue.summary,
                "description": description,
                "issuetype": { "name": issue.issue_type },
            }
        });

        if let Some(parent) = &issue.parent_key {
            body["fields"]["parent"] = serde_json::json!({ "key": parent });
        }
        body
    }
}

/// Minimal ADF document holding one paragraph per line of text
fn adf_paragraph(text: &str) -> serde_json::Value {
    let paragraphs: Vec<serde_json::Value> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            serde_json::json!({
                "type": "paragraph",
                "content": [{ "type": "text", "text": line }]
            })
        })
        .collect();

    serde_json::json!({
        "type": "doc",
        "version": 1,
        "content": paragraphs,
    })
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn issue_types(&self) -> Result<Vec<String>, ProvisionError> {
        let url = format!("{}/rest/api/3/issuetype", self.base_url);
        debug!(%url, "JiraClient::issue_types: called");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ProvisionError::network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status, "JiraClient::issue_types: error response");
            return Err(ProvisionError::from_status(status, text));
        }

        let entries: Vec<IssueTypeEntry> = response
            .json()
            .await
            .map_err(|e| ProvisionError::invalid_response(Some(status), e.to_string()))?;
        let mut names: Vec<String> = Vec::with_capacity(entries.len());
        for entry in entries {
            // Jira lists the same type name once per project scheme
            if !names.contains(&entry.name) {
                names.push(entry.name);
            }
        }
        debug!(count = names.len(), "JiraClient::issue_types: loaded");
        Ok(names)
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<String, ProvisionError> {
        let url = self.issue_url();
        debug!(%url, summary = %issue.summary, issue_type = %issue.issue_type, parent = ?issue.parent_key, "JiraClient::create_issue: called");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .json(&self.build_issue_body(issue))
            .send()
            .await
            .map_err(ProvisionError::network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status, body = %text, "JiraClient::create_issue: rejected");
            return Err(ProvisionError::from_status(status, text));
        }

        let created: CreatedIssue = response
            .json()
            .await
            .map_err(|e| ProvisionError::invalid_response(Some(status), e.to_string()))?;
        info!("Created {} issue {}: {}", issue.issue_type, created.key, issue.summary);
        Ok(created.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(format: DescriptionFormat) -> JiraClient {
        JiraClient::new(
            "https://example.atlassian.net/",
            "me@example.com",
            "token",
            format,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn issue(parent: Option<&str>) -> NewIssue {
        NewIssue {
            project_key: "PROJ".to_string(),
            summary: "Write docs".to_string(),
            description: "Sub-task of PROJ-1".to_string(),
            issue_type: "Task".to_string(),
            parent_key: parent.map(String::from),
        }
    }

    #[test]
    fn test_build_issue_body_adf_with_parent() {
        let body = client(DescriptionFormat::Adf).build_issue_body(&issue(Some("PROJ-1")));

        assert_eq!(body["fields"]["project"]["key"], "PROJ");
        assert_eq!(body["fields"]["issuetype"]["name"], "Task");
        assert_eq!(body["fields"]["parent"]["key"], "PROJ-1");
        assert_eq!(body["fields"]["description"]["type"], "doc");
        assert_eq!(
            body["fields"]["description"]["content"][0]["content"][0]["text"],
            "Sub-task of PROJ-1"
        );
    }

    #[test]
    fn test_build_issue_body_plain_without_parent() {
        let body = client(DescriptionFormat::Plain).build_issue_body(&issue(None));

        assert_eq!(body["fields"]["description"], "Sub-task of PROJ-1");
        assert!(body["fields"].get("parent").is_none());
    }

    #[test]
    fn test_issue_url_depends_on_format() {
        assert_eq!(
            client(DescriptionFormat::Adf).issue_url(),
            "https://example.atlassian.net/rest/api/3/issue"
        );
        assert_eq!(
            client(DescriptionFormat::Plain).issue_url(),
            "https://example.atlassian.net/rest/api/2/issue"
        );
    }

    #[test]
    fn test_adf_splits_lines_into_paragraphs() {
        let doc = adf_paragraph("first\n\nsecond");
        assert_eq!(doc["content"].as_array().unwrap().len(), 2);
    }
}
