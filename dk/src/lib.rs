//! Docket - project documentation to linked tracker tickets and git branches
//!
//! A run normalizes a document, asks a language model for a nested task
//! hierarchy, parses the reply into a [`domain::TaskTree`], plans one ticket
//! and one branch per node, and provisions them against an issue tracker
//! and a source host while recording every outcome in a ledger.
//!
//! # Modules
//!
//! - [`extract`] - document normalization and the single model call
//! - [`hierarchy`] - tolerant parsing of the model reply
//! - [`planning`] - tree to ordered operations
//! - [`provision`] - ticket and branch provisioners
//! - [`pipeline`] - run state machine, ledger and progress events
//! - [`tracker`], [`scm`], [`llm`] - external collaborators
//! - [`config`], [`cli`], [`report`] - configuration and console surface

pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod hierarchy;
pub mod llm;
pub mod pipeline;
pub mod planning;
pub mod prompts;
pub mod provision;
pub mod report;
pub mod scm;
pub mod tracker;

pub use config::Config;
pub use domain::{NodeId, TaskNode, TaskTree};
pub use pipeline::{PipelineCoordinator, PipelineOutcome};
