//! Prompt templates
//!
//! Loads and renders the `.pmt` (prompt template) files that drive each
//! workflow stage.
//!
//! Template loading chain:
//! 1. `.tripwright/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (project default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
