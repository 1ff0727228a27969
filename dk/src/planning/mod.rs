//! Provisioning plans
//!
//! The planner linearizes a task tree into the exact sequence of external
//! calls the coordinator will make.

mod planner;

pub use planner::{Action, OperationKind, ProvisionOperation, plan};
