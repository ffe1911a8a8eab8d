//! Domain types for Tripwright
//!
//! The research plan, the trip request, and the session record threaded
//! through every workflow stage.

mod plan;
mod request;
mod session;

pub use plan::{AgentKind, Plan, PlanStep};
pub use request::{NOT_SPECIFIED, TripRequest};
pub use session::{NO_PREVIOUS_RESULTS, Session, SessionStatus};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
