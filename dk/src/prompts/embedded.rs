//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

/// System prompt for hierarchy extraction
pub const DECOMPOSE_SYSTEM: &str = include_str!("../../prompts/decompose-system.pmt");

/// User prompt wrapping the document text
pub const DECOMPOSE_USER: &str = include_str!("../../prompts/decompose-user.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "decompose-system" => Some(DECOMPOSE_SYSTEM),
        "decompose-user" => Some(DECOMPOSE_USER),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_decompose() {
        let user = get_embedded("decompose-user").unwrap();
        assert!(user.contains("{{document}}"));
        assert!(user.contains("ONLY valid JSON"));
        assert!(get_embedded("decompose-system").unwrap().contains("project planner"));
    }

    #[test]
    fn test_embedded_example_is_valid_hierarchy() {
        let start = DECOMPOSE_USER.find('{').unwrap();
        let end = DECOMPOSE_USER.find("\n}\n").unwrap() + 2;
        let tree = crate::hierarchy::parse(&DECOMPOSE_USER[start..end]).unwrap();
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.max_depth(), Some(2));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
