//! Domain types for docket
//!
//! The task tree extracted from a document and the helpers that name
//! things derived from it.

mod slug;
mod tree;

pub use slug::branch_name;
pub use tree::{NodeId, TaskNode, TaskTree, TreeError};
