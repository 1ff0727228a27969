//! Provisioning error types

use serde::Serialize;
use thiserror::Error;

/// Broad classification of a rejected tracker or host call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionErrorKind {
    /// 401/403
    Auth,
    /// 400/422 and other client-side rejections
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Server,
    Network,
    InvalidResponse,
    /// An operation was dispatched to the wrong provisioner
    InvalidOperation,
}

impl std::fmt::Display for ProvisionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate-limited",
            Self::Server => "server",
            Self::Network => "network",
            Self::InvalidResponse => "invalid-response",
            Self::InvalidOperation => "invalid-operation",
        };
        write!(f, "{}", name)
    }
}

/// A single tracker/host operation failed
///
/// Isolated to the node it was raised for; never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{} error{}: {}", .kind, status_suffix(.http_status), .body)]
pub struct ProvisionError {
    pub kind: ProvisionErrorKind,
    pub http_status: Option<u16>,
    pub body: String,
}

impl ProvisionError {
    pub fn new(kind: ProvisionErrorKind, http_status: Option<u16>, body: impl Into<String>) -> Self {
        Self {
            kind,
            http_status,
            body: body.into(),
        }
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ProvisionErrorKind::Auth,
            404 => ProvisionErrorKind::NotFound,
            409 => ProvisionErrorKind::Conflict,
            429 => ProvisionErrorKind::RateLimited,
            500..=599 => ProvisionErrorKind::Server,
            _ => ProvisionErrorKind::Validation,
        };
        Self::new(kind, Some(status), body)
    }

    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::new(ProvisionErrorKind::Network, None, detail.to_string())
    }

    pub fn invalid_response(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::new(ProvisionErrorKind::InvalidResponse, status, detail)
    }

    pub fn invalid_operation(detail: impl Into<String>) -> Self {
        Self::new(ProvisionErrorKind::InvalidOperation, None, detail)
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None if e.is_decode() => Self::invalid_response(None, e.to_string()),
            None => Self::network(e),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Branch provisioning failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BranchError {
    /// The base branch could not be resolved; no branch can be created this run
    #[error("Base branch '{base}' not found: {source}")]
    BaseBranchNotFound {
        base: String,
        #[source]
        source: ProvisionError,
    },

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(ProvisionError::from_status(401, "").kind, ProvisionErrorKind::Auth);
        assert_eq!(ProvisionError::from_status(403, "").kind, ProvisionErrorKind::Auth);
        assert_eq!(ProvisionError::from_status(404, "").kind, ProvisionErrorKind::NotFound);
        assert_eq!(ProvisionError::from_status(409, "").kind, ProvisionErrorKind::Conflict);
        assert_eq!(ProvisionError::from_status(422, "").kind, ProvisionErrorKind::Validation);
        assert_eq!(ProvisionError::from_status(400, "").kind, ProvisionErrorKind::Validation);
        assert_eq!(ProvisionError::from_status(429, "").kind, ProvisionErrorKind::RateLimited);
        assert_eq!(ProvisionError::from_status(503, "").kind, ProvisionErrorKind::Server);
    }

    #[test]
    fn test_display_with_and_without_status() {
        let err = ProvisionError::from_status(403, "forbidden");
        assert_eq!(err.to_string(), "auth error (HTTP 403): forbidden");

        let err = ProvisionError::network("connection refused");
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn test_branch_error_display() {
        let err = BranchError::BaseBranchNotFound {
            base: "main".to_string(),
            source: ProvisionError::from_status(404, "Branch not found"),
        };
        assert!(err.to_string().contains("Base branch 'main' not found"));
    }
}
