//! Routers - pure decisions over the session that pick the next stage
//!
//! None of these mutate the session. A missing plan or a cursor past the
//! end of the plan is an error, not a panic.

use tracing::{debug, warn};

use crate::domain::{AgentKind, PlanStep, Session};

use super::{WorkflowError, WorkflowStage};

/// Plan step under the cursor, or why there is none
fn current_step(session: &Session) -> Result<&PlanStep, WorkflowError> {
    let plan = session
        .plan
        .as_ref()
        .ok_or_else(|| WorkflowError::MissingPlan(session.id.clone()))?;
    plan.step(session.current_step).ok_or(WorkflowError::StepOutOfRange {
        step: session.current_step,
        len: plan.len(),
    })
}

/// Worker assigned to the step under the cursor
fn current_agent(session: &Session) -> Result<AgentKind, WorkflowError> {
    current_step(session).map(|s| s.agent)
}

/// After the executor: replan while the step's attempts allow it, else the assigned worker
///
/// Attempts are counted before routing, so with a cap of 2 the first and
/// second requests replan and the third falls through to the worker.
pub fn route_after_executor(session: &Session, max_replan_attempts: u32) -> Result<WorkflowStage, WorkflowError> {
    let step = session.current_step;
    debug!(session_id = %session.id, step, replan_flag = session.replan_flag, "route_after_executor: called");

    if session.replan_flag {
        let attempts = session.replan_attempts_for(step);
        if attempts <= max_replan_attempts {
            debug!(attempts, "route_after_executor: replan granted");
            return Ok(WorkflowStage::Planner);
        }
        warn!(
            session_id = %session.id,
            step,
            attempts,
            max_replan_attempts,
            "Replan cap exceeded, continuing with current plan"
        );
    }

    Ok(WorkflowStage::Worker(current_agent(session)?))
}

/// After a worker: dispatch its tool calls, or move on
pub fn should_use_tools(session: &Session) -> Result<WorkflowStage, WorkflowError> {
    debug!(session_id = %session.id, "should_use_tools: called");
    let wants_tools = session.last_message().is_some_and(|m| m.has_tool_calls());
    if wants_tools {
        Ok(WorkflowStage::ToolDispatch(current_agent(session)?))
    } else {
        Ok(WorkflowStage::AdvanceStep)
    }
}

/// After tool dispatch: back to the worker assigned to the current step
pub fn route_after_tool(session: &Session) -> Result<WorkflowStage, WorkflowError> {
    debug!(session_id = %session.id, step = session.current_step, "route_after_tool: called");
    Ok(WorkflowStage::Worker(current_agent(session)?))
}

/// After advancing: next step's executor, or the synthesizer once every step ran
pub fn route_after_step(session: &Session) -> Result<WorkflowStage, WorkflowError> {
    let plan = session
        .plan
        .as_ref()
        .ok_or_else(|| WorkflowError::MissingPlan(session.id.clone()))?;
    debug!(session_id = %session.id, step = session.current_step, len = plan.len(), "route_after_step: called");

    if session.current_step >= plan.len() {
        Ok(WorkflowStage::Synthesizer)
    } else {
        Ok(WorkflowStage::Executor)
    }
}
