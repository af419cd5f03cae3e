//! Registers the bus consumers that drive SOP-Abstraction and
//! Space-Construction off of `flush`'s published events (spec.md §4.K, §9).
//!
//! The original source has two controllers under the same filename with
//! conflicting intent: a `space_task_complete` consumer that calls an
//! undefined `process_space_pending_task`, and a separately-defined
//! `process_space_task`/`process_sop_complete` pair that is never wired to
//! anything. Rather than guess which call graph was intended, both halves
//! are kept as distinct handlers on the same routing key: a pending-task
//! no-op matching the dead end literally, and a second queue bound to the
//! same `(exchange, routing_key)` running the real trigger.

use ctxmem_agents::{run_sop_abstraction, run_space_construction, SopPromptCustomization};
use ctxmem_bus::{Bus, ConsumerConfig, MessageHandle};
use ctxmem_store::queries::{session, task};
use ctxmem_types::{exchanges, routing_keys, NewTaskComplete, SopComplete, TaskStatus};
use tracing::{info, warn};

use crate::state::AppState;

pub fn register(bus: &Bus, state: AppState) {
    bus.register(
        ConsumerConfig::new(exchanges::SPACE_TASK, routing_keys::SPACE_TASK_COMPLETE, "space_task_complete"),
        {
            let state = state.clone();
            move |body: NewTaskComplete, message: MessageHandle| {
                let state = state.clone();
                async move { process_space_pending_task(state, body, message).await }
            }
        },
    );

    bus.register(
        ConsumerConfig::new(exchanges::SPACE_TASK, routing_keys::SPACE_TASK_COMPLETE, "space_task_sop_trigger"),
        {
            let state = state.clone();
            move |body: NewTaskComplete, message: MessageHandle| {
                let state = state.clone();
                async move { process_space_success_task(state, body, message).await }
            }
        },
    );

    bus.register(
        ConsumerConfig::new(exchanges::SPACE_SOP, routing_keys::SOP_COMPLETE, "sop_complete"),
        {
            let state = state.clone();
            move |body: SopComplete, message: MessageHandle| {
                let state = state.clone();
                async move { process_sop_complete(state, body, message).await }
            }
        },
    );
}

/// Matches the original's genuine dead end: resolves the ids and stops.
async fn process_space_pending_task(
    state: AppState,
    body: NewTaskComplete,
    _message: MessageHandle,
) -> ctxmem_types::Result<()> {
    let conn = state.db.lock().await;
    let _ = task::fetch_by_id(conn.conn(), body.task_id)?;
    info!(task_id = %body.task_id, "space_task_complete observed, no-op controller");
    Ok(())
}

/// The real trigger: runs SOP-Abstraction on a just-succeeded task. An easy
/// task (no `SopData` submitted) is marked digested immediately since there
/// is nothing left to place; a real submission waits for
/// [`process_sop_complete`] to mark it once actually placed.
async fn process_space_success_task(
    state: AppState,
    body: NewTaskComplete,
    _message: MessageHandle,
) -> ctxmem_types::Result<()> {
    let task = {
        let conn = state.db.lock().await;
        task::fetch_by_id(conn.conn(), body.task_id)?
    };
    if task.status != TaskStatus::Success {
        return Ok(());
    }

    let space_id = {
        let conn = state.db.lock().await;
        session::fetch_space_id(conn.conn(), body.session_id)?
    };
    let Some(space_id) = space_id else {
        warn!(session_id = %body.session_id, "task succeeded but session has no linked space, skipping digest");
        return Ok(());
    };

    let customization = SopPromptCustomization {
        custom_scoring_rules: state.project_config.sop_agent_custom_scoring_rules.clone(),
    };

    let sop = run_sop_abstraction(
        state.llm.as_ref(),
        state.db.clone(),
        body.session_id,
        body.task_id,
        state.config.sop_agent_max_iterations,
        state.config.space_construct_agent_previous_tasks_limit,
        &customization,
    )
    .await?;

    match sop {
        None => {
            let conn = state.db.lock().await;
            task::set_space_digested(conn.conn(), body.task_id, true)?;
        }
        Some(sop_data) => {
            let event = SopComplete { project_id: body.project_id, space_id, task_id: body.task_id, sop_data };
            state.bus.publish(exchanges::SPACE_SOP, routing_keys::SOP_COMPLETE, &event)?;
        }
    }
    Ok(())
}

/// Runs Space-Construction for one submitted SOP and marks the task
/// digested only if the agent actually placed it — delivering the same
/// `sop.complete` event twice must not insert a second block (§8 scenario 6).
async fn process_sop_complete(
    state: AppState,
    body: SopComplete,
    _message: MessageHandle,
) -> ctxmem_types::Result<()> {
    {
        let conn = state.db.lock().await;
        let current = task::fetch_by_id(conn.conn(), body.task_id)?;
        if current.space_digested {
            return Ok(());
        }
    }

    let placed = run_space_construction(
        state.llm.as_ref(),
        state.db.clone(),
        body.space_id,
        vec![body.task_id],
        vec![body.sop_data],
        state.config.space_construct_agent_max_iterations,
    )
    .await?;

    let conn = state.db.lock().await;
    for task_id in placed {
        task::set_space_digested(conn.conn(), task_id, true)?;
    }
    Ok(())
}

