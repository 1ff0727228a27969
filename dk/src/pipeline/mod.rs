//! Run orchestration
//!
//! The coordinator drives one run through its states, records every
//! operation in the ledger and broadcasts progress to subscribers.

mod coordinator;
mod events;
mod ledger;
mod state;

pub use coordinator::{
    AbortReason, AbortReport, Extraction, PipelineCoordinator, PipelineOutcome, PipelineSettings, RunReport,
};
pub use events::{PipelineEvent, ProgressBus, ProgressEmitter, StopSignal, next_event};
pub use ledger::{EntryStatus, FailureReason, LedgerEntry, LedgerError, LedgerSummary, OutcomeLedger};
pub use state::{InvalidTransition, RunState, StateTracker};
