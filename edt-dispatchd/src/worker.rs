//! The per-emergency worker state machine: admit -> reserve intent ->
//! assign resources -> simulate -> release.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use edt_common::clock::SharedClock;
use edt_common::errors::DispatchError;
use edt_common::eventlog::{EventKind, EventLog};
use edt_common::limits::{BACKOFF_MS, INTENT_REFRESH_INTERVAL};
use edt_common::types::{EmergencyInstance, EmergencyStatus, Intent, TwinId, TwinStatus};
use edt_common::util::{manhattan_distance, travel_time_secs};

use crate::assignment::{try_assign, AssignError};
use crate::barrier::SimulationBarrier;
use crate::intent::{IntentError, IntentTable};
use crate::twins::TwinPool;

/// Shared, `'static`-lifetime context every worker needs. Cloning is cheap
/// (everything behind an `Arc`).
#[derive(Clone)]
pub struct WorkerContext {
    pub pool: Arc<TwinPool>,
    pub intents: Arc<IntentTable>,
    pub log: Arc<EventLog>,
    pub clock: SharedClock,
}

/// Drives one emergency instance from `WAITING` to a terminal state.
pub async fn run_worker(ctx: WorkerContext, emergency: Arc<EmergencyInstance>) {
    let mut first_time = true;
    let mut retry_counter: u32 = 0;

    loop {
        let now = ctx.clock.now();

        if !check_reachability(&ctx.pool, &emergency, now).await {
            mark_timeout(
                &ctx.log,
                &emergency,
                "timed out: insufficient twins reachable before the deadline",
            )
            .await;
            return;
        }

        if now > emergency.deadline() {
            ctx.intents.unregister(emergency.id).await;
            mark_timeout(&ctx.log, &emergency, "timed out: deadline elapsed while waiting").await;
            return;
        }

        if first_time || retry_counter >= INTENT_REFRESH_INTERVAL {
            let intent = create_intent_from_emergency(&ctx.pool, &emergency, now);
            let result = if first_time {
                ctx.intents.register(intent).await
            } else {
                ctx.intents.update(intent).await
            };
            if let Err(err) = result {
                ctx.intents.unregister(emergency.id).await;
                let verb = if first_time { "register" } else { "update" };
                let dispatch_err =
                    DispatchError::ResourceExhaustion(format!("failed to {verb} intent: {err:?}"));
                ctx.log
                    .log_emergency(emergency.id.0, EventKind::Intent, &dispatch_err.to_string())
                    .await;
                return;
            }
            first_time = false;
            retry_counter = 0;
        }

        if !ctx.intents.may_proceed(emergency.id).await {
            debug!(
                "{}",
                DispatchError::Contention(format!("emergency {} blocked by arbitration", emergency.id))
            );
            tokio::time::sleep(Duration::from_millis(BACKOFF_MS)).await;
            retry_counter += 1;
            continue;
        }

        match try_assign(&ctx.pool, &emergency, now, &ctx.log).await {
            Ok(()) => {
                ctx.intents.unregister(emergency.id).await;
                simulate(&ctx, &emergency).await;
                return;
            }
            Err(reason @ (AssignError::InsufficientCandidates | AssignError::LockContention)) => {
                debug!(
                    "{}",
                    DispatchError::Contention(format!("emergency {} assignment attempt: {reason:?}", emergency.id))
                );
                tokio::time::sleep(Duration::from_millis(BACKOFF_MS)).await;
                retry_counter += 1;
                continue;
            }
        }
    }
}

/// For each requirement, counts twins of that type reachable before the
/// emergency's deadline (status is irrelevant here — only distance and
/// deadline matter).
async fn check_reachability(pool: &TwinPool, emergency: &EmergencyInstance, now: i64) -> bool {
    let deadline = emergency.deadline();
    for req in &emergency.etype.requirements {
        if req.required_count == 0 {
            continue;
        }
        let mut reachable = 0u32;
        for twin in pool.twins() {
            if twin.type_idx != req.type_idx {
                continue;
            }
            let (x, y) = twin.position();
            let dist = manhattan_distance(x, y, emergency.x, emergency.y);
            let speed = pool.type_by_index(twin.type_idx).speed;
            if now.saturating_add(travel_time_secs(dist, speed)) <= deadline {
                reachable += 1;
                if reachable >= req.required_count {
                    break;
                }
            }
        }
        if reachable < req.required_count {
            return false;
        }
    }
    true
}

/// Builds the intent to register: the candidate set is every twin of a
/// requested type reachable before the deadline, irrespective of current
/// status (status is re-checked at the assignment engine's lock-acquisition
/// step).
fn create_intent_from_emergency(pool: &TwinPool, emergency: &EmergencyInstance, now: i64) -> Intent {
    let deadline = emergency.deadline();
    let mut candidate_twin_ids: Vec<TwinId> = Vec::new();
    for twin in pool.twins() {
        let wanted = emergency
            .etype
            .requirements
            .iter()
            .any(|r| r.type_idx == twin.type_idx);
        if !wanted {
            continue;
        }
        let (x, y) = twin.position();
        let dist = manhattan_distance(x, y, emergency.x, emergency.y);
        let speed = pool.type_by_index(twin.type_idx).speed;
        if now.saturating_add(travel_time_secs(dist, speed)) <= deadline {
            candidate_twin_ids.push(twin.id);
        }
    }
    Intent {
        emergency_id: emergency.id,
        priority: emergency.etype.priority,
        submitted_time: emergency.submitted_time,
        candidate_twin_ids,
    }
}

async fn mark_timeout(log: &EventLog, emergency: &EmergencyInstance, message: &str) {
    let mut state = emergency.state.lock().await;
    state.status = EmergencyStatus::Timeout;
    let err = DispatchError::Timeout(emergency.id.0, message.to_string());
    log.log_emergency(emergency.id.0, EventKind::EmergencyStatus, &err.to_string()).await;
}

/// Runs the simulation barrier to completion, then leaves the emergency
/// `COMPLETED` and every reserved twin back at `IDLE`.
async fn simulate(ctx: &WorkerContext, emergency: &Arc<EmergencyInstance>) {
    let reserved = {
        let state = emergency.state.lock().await;
        state.reserved_twins.clone()
    };
    let n = reserved.len();

    let barrier = Arc::new(SimulationBarrier::new(n));
    let mut handles = Vec::with_capacity(n + 1);

    for r in reserved {
        let pool = ctx.pool.clone();
        let log = ctx.log.clone();
        let barrier = barrier.clone();
        let emergency = emergency.clone();
        handles.push(tokio::spawn(async move {
            run_twin_task(pool, log, barrier, emergency, r).await;
        }));
    }

    {
        let log = ctx.log.clone();
        let barrier = barrier.clone();
        let emergency = emergency.clone();
        handles.push(tokio::spawn(async move {
            run_emergency_task(log, barrier, emergency).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_twin_task(
    pool: Arc<TwinPool>,
    log: Arc<EventLog>,
    barrier: Arc<SimulationBarrier>,
    emergency: Arc<EmergencyInstance>,
    reserved: edt_common::types::ReservedTwin,
) {
    let twin = pool.twin(reserved.id);
    let label = format!("{} {}", reserved.type_name, reserved.id);

    let out_dist = manhattan_distance(reserved.origin_x, reserved.origin_y, emergency.x, emergency.y);
    let out_travel = travel_time_secs(out_dist, reserved.speed);
    tokio::time::sleep(Duration::from_secs(out_travel.max(0) as u64)).await;

    twin.set_position(emergency.x, emergency.y);
    twin.set_status(TwinStatus::OnScene);
    log.log(
        &label,
        EventKind::RescuerStatus,
        &format!("status changed to ON_SCENE for emergency {}", emergency.id),
    )
    .await;

    barrier.mark_arrived().await;
    barrier.wait_all_arrived().await;

    tokio::time::sleep(Duration::from_secs(reserved.time_to_manage_secs.max(0) as u64)).await;

    twin.set_status(TwinStatus::ReturningToBase);
    log.log(
        &label,
        EventKind::RescuerStatus,
        &format!("status changed to RETURNING_TO_BASE for emergency {}", emergency.id),
    )
    .await;

    barrier.mark_returned().await;

    let back_dist = manhattan_distance(emergency.x, emergency.y, reserved.base_x, reserved.base_y);
    let back_travel = travel_time_secs(back_dist, reserved.speed);
    tokio::time::sleep(Duration::from_secs(back_travel.max(0) as u64)).await;

    twin.set_position(reserved.base_x, reserved.base_y);
    twin.set_status(TwinStatus::Idle);
    log.log(
        &label,
        EventKind::RescuerStatus,
        &format!("status changed to IDLE after completing emergency {}", emergency.id),
    )
    .await;
}

async fn run_emergency_task(
    log: Arc<EventLog>,
    barrier: Arc<SimulationBarrier>,
    emergency: Arc<EmergencyInstance>,
) {
    barrier.wait_all_arrived().await;
    {
        let mut state = emergency.state.lock().await;
        state.status = EmergencyStatus::InProgress;
    }
    log.log_emergency(emergency.id.0, EventKind::EmergencyStatus, "status changed to IN_PROGRESS")
        .await;

    barrier.wait_all_returned().await;
    {
        let mut state = emergency.state.lock().await;
        state.status = EmergencyStatus::Completed;
        state.rescuer_count = 0;
        state.reserved_twins.clear();
    }
    log.log_emergency(emergency.id.0, EventKind::EmergencyStatus, "status changed to COMPLETED")
        .await;
}
