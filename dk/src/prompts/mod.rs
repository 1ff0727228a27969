//! Prompt Template System
//!
//! Template loading chain:
//! 1. `{override-dir}/{name}.pmt` (configured override)
//! 2. `.docket/prompts/{name}.pmt` (project override)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{DecomposeContext, PromptLoader};
