//! Hierarchy parse errors

use thiserror::Error;

/// Why a model response could not be turned into a task tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No balanced, valid JSON object could be located in the text
    #[error("No JSON object found in model response: {reason}")]
    ExtractionFormat { reason: String },

    /// A JSON object was found but does not have the hierarchy shape
    #[error("Invalid task hierarchy at {}: {}", display_path(.path), .message)]
    Schema { path: Vec<String>, message: String },
}

impl ParseError {
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::ExtractionFormat { .. })
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<top level>".to_string()
    } else {
        path.iter().map(|p| format!("\"{}\"", p)).collect::<Vec<_>>().join(" > ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display_includes_path() {
        let err = ParseError::Schema {
            path: vec!["Backend".to_string(), "Schema".to_string()],
            message: "found a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid task hierarchy at \"Backend\" > \"Schema\": found a number"
        );
    }

    #[test]
    fn test_schema_error_display_top_level() {
        let err = ParseError::Schema {
            path: vec![],
            message: "bad".to_string(),
        };
        assert!(err.to_string().contains("<top level>"));
    }

    #[test]
    fn test_error_kind_helpers() {
        let err = ParseError::ExtractionFormat {
            reason: "no '{' in response".to_string(),
        };
        assert!(err.is_format_error());
        assert!(!err.is_schema_error());
    }
}
