//! Plan-and-execute research workflow
//!
//! The session moves through a small state machine:
//!
//! ```text
//! planner -> executor -> worker <-> tool_dispatch
//!               ^  |        |
//!               |  +-> planner (replan, capped per step)
//!               |           v
//!               +------ advance_step -> synthesizer -> done
//! ```
//!
//! Stage handlers live in [`stages`], routing decisions in [`router`], and
//! the [`WorkflowEngine`] ties them together with checkpointing.

mod engine;
mod error;
pub mod router;
mod stage;
pub mod stages;

pub use crate::config::WorkflowConfig;
pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use router::{route_after_executor, route_after_step, route_after_tool, should_use_tools};
pub use stage::WorkflowStage;
pub use stages::ExecutorDecision;
