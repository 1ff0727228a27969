//! Name derivation from task labels

/// Branch name for a task label: lowercase, spaces replaced by hyphens
///
/// Deliberately nothing more. Two labels that differ only in case map to the
/// same branch, and no deduplication happens here.
pub fn branch_name(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "-")
}
