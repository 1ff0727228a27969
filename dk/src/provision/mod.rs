//! Provisioners: execute planned operations against the tracker and the source host
//!
//! Neither provisioner retries. A [`ProvisionError`] is scoped to the node it
//! was raised for; the coordinator decides what that means for the rest of
//! the run.

mod branch;
mod error;
mod ticket;

pub use branch::{BranchCreated, BranchProvisioner};
pub use error::{BranchError, ProvisionError, ProvisionErrorKind};
pub use ticket::{IssueTypeSubstitution, TicketCreated, TicketPolicy, TicketProvisioner};
