//! Model response parsing
//!
//! Turns the free text returned by the language model into a validated
//! [`TaskTree`](crate::domain::TaskTree).

mod error;
mod parser;

pub use error::ParseError;
pub use parser::{locate_json_object, parse};
