//! ProvisioningPlanner - TaskTree to ordered creation operations

use serde::Serialize;
use tracing::debug;

use crate::domain::{NodeId, TaskTree, branch_name};

/// Which external system an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Ticket,
    Branch,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ticket => write!(f, "ticket"),
            Self::Branch => write!(f, "branch"),
        }
    }
}

/// What an operation creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    CreateTicket,
    CreateBranch { name: String },
}

/// One unit of external work against a node of the tree
///
/// `parent` is a placeholder: the parent's tracker key is unknown at plan
/// time and is resolved by the coordinator once the parent's ticket exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionOperation {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub action: Action,
}

impl ProvisionOperation {
    pub fn kind(&self) -> OperationKind {
        match self.action {
            Action::CreateTicket => OperationKind::Ticket,
            Action::CreateBranch { .. } => OperationKind::Branch,
        }
    }

    /// Branch name for branch operations
    pub fn branch_name(&self) -> Option<&str> {
        match &self.action {
            Action::CreateBranch { name } => Some(name),
            Action::CreateTicket => None,
        }
    }
}

/// Emit operations in pre-order: each node's ticket, then its branch, then its subtree
///
/// Executing the list front to back guarantees every ticket operation's
/// parent ticket has already been attempted.
pub fn plan(tree: &TaskTree) -> Vec<ProvisionOperation> {
    debug!(nodes = tree.len(), "plan: called");
    let mut operations = Vec::with_capacity(tree.len() * 2);

    for id in tree.pre_order() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        operations.push(ProvisionOperation {
            node: id,
            parent: node.parent(),
            action: Action::CreateTicket,
        });
        operations.push(ProvisionOperation {
            node: id,
            parent: node.parent(),
            action: Action::CreateBranch {
                name: branch_name(node.label()),
            },
        });
    }

    debug!(operations = operations.len(), "plan: done");
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::parse;

    #[test]
    fn test_plan_empty_tree() {
        assert!(plan(&TaskTree::new()).is_empty());
    }

    #[test]
    fn test_plan_ticket_then_branch_per_node() {
        let tree = parse(r#"{"Main Task 1": ["Sub A", "Sub B"]}"#).unwrap();
        let ops = plan(&tree);

        let summary: Vec<(String, OperationKind)> = ops
            .iter()
            .map(|op| (tree.node(op.node).unwrap().label().to_string(), op.kind()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Main Task 1".to_string(), OperationKind::Ticket),
                ("Main Task 1".to_string(), OperationKind::Branch),
                ("Sub A".to_string(), OperationKind::Ticket),
                ("Sub A".to_string(), OperationKind::Branch),
                ("Sub B".to_string(), OperationKind::Ticket),
                ("Sub B".to_string(), OperationKind::Branch),
            ]
        );
    }

    #[test]
    fn test_plan_parent_placeholders() {
        let tree = parse(r#"{"A": {"B": ["C"]}}"#).unwrap();
        let ops = plan(&tree);
        let a = tree.roots()[0];
        let b = tree.node(a).unwrap().children()[0];

        let c_ticket = ops
            .iter()
            .find(|op| tree.node(op.node).unwrap().label() == "C" && op.kind() == OperationKind::Ticket)
            .unwrap();
        assert_eq!(c_ticket.parent, Some(b));
        assert_eq!(ops[0].parent, None);
    }

    #[test]
    fn test_plan_branch_names_are_not_deduplicated() {
        let tree = parse(r#"{"Backend": ["Write Tests"], "Frontend": ["Write Tests"]}"#).unwrap();
        let ops = plan(&tree);
        let names: Vec<&str> = ops.iter().filter_map(|op| op.branch_name()).collect();
        assert_eq!(names, vec!["backend", "write-tests", "frontend", "write-tests"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        /// Random forest described as (parent index or None) per node, parents always earlier
        fn forest() -> impl Strategy<Value = Vec<Option<usize>>> {
            prop::collection::vec(any::<prop::sample::Index>(), 0..40).prop_map(|picks| {
                picks
                    .iter()
                    .enumerate()
                    .map(|(i, pick)| if i == 0 { None } else { Some(pick.index(i + 1)) })
                    .map(|p| p.and_then(|p| if p == 0 { None } else { Some(p - 1) }))
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_parent_ticket_precedes_descendant_tickets(shape in forest()) {
                let mut tree = TaskTree::new();
                let mut ids = Vec::new();
                for (i, parent) in shape.iter().enumerate() {
                    let label = format!("task {}", i);
                    let id = match parent {
                        Some(p) => tree.add_child(ids[*p], &label).unwrap(),
                        None => tree.add_root(&label).unwrap(),
                    };
                    ids.push(id);
                }

                let ops = plan(&tree);
                let ticket_pos: HashMap<NodeId, usize> = ops
                    .iter()
                    .enumerate()
                    .filter(|(_, op)| op.kind() == OperationKind::Ticket)
                    .map(|(i, op)| (op.node, i))
                    .collect();

                prop_assert_eq!(ticket_pos.len(), tree.len());
                prop_assert_eq!(ops.len(), tree.len() * 2);
                for a in &ids {
                    for d in &ids {
                        if tree.is_ancestor(*a, *d) {
                            prop_assert!(ticket_pos[a] < ticket_pos[d]);
                        }
                    }
                }
                for op in &ops {
                    prop_assert_eq!(op.parent, tree.node(op.node).unwrap().parent());
                }
            }
        }
    }
}
