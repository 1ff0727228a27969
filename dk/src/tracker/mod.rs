//! Issue tracker port
//!
//! [`IssueTracker`] is the boundary to a Jira-style tracker: list the issue
//! types the project accepts, create an issue (optionally under a parent).
//! [`JiraClient`] is the HTTP implementation.

mod jira;

use async_trait::async_trait;
use serde::Serialize;

use crate::provision::ProvisionError;

pub use jira::JiraClient;

/// Fields for a new tracker issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub project_key: String,
    pub summary: String,
    /// Plain text; adapters render it into whatever format the tracker wants
    pub description: String,
    pub issue_type: String,
    pub parent_key: Option<String>,
}

/// Jira-style issue tracker
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Names of the issue types currently valid for creation
    async fn issue_types(&self) -> Result<Vec<String>, ProvisionError>;

    /// Create an issue and return its key (e.g. `PROJ-42`)
    async fn create_issue(&self, issue: &NewIssue) -> Result<String, ProvisionError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recording tracker for unit tests
    ///
    /// Keys are `MOCK-<n>` in creation order. Summaries listed in
    /// `failures` are rejected with the given error instead.
    pub struct MockTracker {
        types: Result<Vec<String>, ProvisionError>,
        failures: HashMap<String, ProvisionError>,
        created: Mutex<Vec<NewIssue>>,
        type_lookups: AtomicUsize,
        next_key: AtomicUsize,
    }

    impl MockTracker {
        pub fn new(types: &[&str]) -> Self {
            Self {
                types: Ok(types.iter().map(|t| t.to_string()).collect()),
                failures: HashMap::new(),
                created: Mutex::new(Vec::new()),
                type_lookups: AtomicUsize::new(0),
                next_key: AtomicUsize::new(1),
            }
        }

        pub fn with_type_lookup_error(mut self, error: ProvisionError) -> Self {
            self.types = Err(error);
            self
        }

        pub fn failing(mut self, summary: &str, error: ProvisionError) -> Self {
            self.failures.insert(summary.to_string(), error);
            self
        }

        /// Every create call, including rejected ones
        pub fn calls(&self) -> Vec<NewIssue> {
            self.created.lock().unwrap().clone()
        }

        pub fn summaries(&self) -> Vec<String> {
            self.calls().into_iter().map(|i| i.summary).collect()
        }

        pub fn type_lookups(&self) -> usize {
            self.type_lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IssueTracker for MockTracker {
        async fn issue_types(&self) -> Result<Vec<String>, ProvisionError> {
            self.type_lookups.fetch_add(1, Ordering::SeqCst);
            self.types.clone()
        }

        async fn create_issue(&self, issue: &NewIssue) -> Result<String, ProvisionError> {
            self.created.lock().unwrap().push(issue.clone());
            if let Some(error) = self.failures.get(&issue.summary) {
                return Err(error.clone());
            }
            let n = self.next_key.fetch_add(1, Ordering::SeqCst);
            Ok(format!("MOCK-{}", n))
        }
    }
}
