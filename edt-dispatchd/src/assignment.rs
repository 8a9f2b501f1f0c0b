//! The assignment engine: candidate selection by reachability-before-deadline,
//! deadlock-free multi-lock acquisition, and deep-copy commit.

use edt_common::eventlog::{EventKind, EventLog};
use edt_common::types::{DigitalTwin, EmergencyInstance, EmergencyStatus, ReservedTwin, TwinId, TwinStatus};
use edt_common::util::{manhattan_distance, travel_time_secs};

use crate::twins::TwinPool;

/// Why an assignment attempt failed. Both variants are recoverable — the
/// caller (the worker loop) backs off and retries; no twin or emergency
/// state is altered on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    /// Fewer than `required_count` reachable `IDLE` twins for some requirement.
    InsufficientCandidates,
    /// Lost the try-lock race, or a candidate was no longer `IDLE` once locked.
    LockContention,
}

struct Candidate<'a> {
    twin: &'a DigitalTwin,
    travel_time: i64,
}

/// Attempts to reserve `rescuer_count` twins for `emergency` and, on
/// success, commits the reservation and flips each twin to
/// `EN_ROUTE_TO_SCENE`. On failure, no twin or emergency state changes and no
/// lock is left held.
pub async fn try_assign(
    pool: &TwinPool,
    emergency: &EmergencyInstance,
    now: i64,
    log: &EventLog,
) -> Result<(), AssignError> {
    let deadline = emergency.deadline();

    // Step 1: candidate selection per requirement, sorted by travel time
    // ascending (ties broken by the twin's position in the dense id scan,
    // since the sort below is stable).
    let mut reservation: Vec<TwinId> = Vec::new();
    for req in &emergency.etype.requirements {
        if req.required_count == 0 {
            continue;
        }
        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for twin in pool.twins() {
            if twin.type_idx != req.type_idx {
                continue;
            }
            if twin.status() != TwinStatus::Idle {
                continue;
            }
            let (tx, ty) = twin.position();
            let dist = manhattan_distance(tx, ty, emergency.x, emergency.y);
            let speed = pool.twin_type(twin).speed;
            let travel_time = travel_time_secs(dist, speed);
            if now.saturating_add(travel_time) > deadline {
                continue;
            }
            candidates.push(Candidate { twin, travel_time });
        }
        candidates.sort_by_key(|c| c.travel_time);

        if candidates.len() < req.required_count as usize {
            return Err(AssignError::InsufficientCandidates);
        }
        reservation.extend(
            candidates
                .into_iter()
                .take(req.required_count as usize)
                .map(|c| c.twin.id),
        );
    }

    // Step 2: lock ordering — sort by id ascending, a global total order
    // that prevents deadlock among contending workers.
    reservation.sort_by_key(|id| id.0);

    // Step 3: two-phase acquisition.
    let mut guards = Vec::with_capacity(reservation.len());
    for &id in &reservation {
        let Some(guard) = pool.try_lock(id) else {
            // release everything already held, in reverse, then fail.
            drop(guards);
            return Err(AssignError::LockContention);
        };
        if guard.status() != TwinStatus::Idle {
            drop(guard);
            drop(guards);
            return Err(AssignError::LockContention);
        }
        guards.push(guard);
    }

    // Step 4: commit, while still holding every lock.
    {
        let mut state = emergency.state.lock().await;
        state.status = EmergencyStatus::Assigned;
        state.rescuer_count = guards.len();
        state.reserved_twins = guards
            .iter()
            .map(|g| {
                let rtype = pool.twin_type(g.twin);
                let (x, y) = g.twin.position();
                let manage_secs = emergency
                    .etype
                    .requirements
                    .iter()
                    .find(|r| r.type_idx == g.twin.type_idx)
                    .map(|r| r.time_to_manage_secs)
                    .unwrap_or(0);
                ReservedTwin {
                    id: g.twin.id,
                    type_name: rtype.name.clone(),
                    origin_x: x,
                    origin_y: y,
                    base_x: rtype.base_x,
                    base_y: rtype.base_y,
                    speed: rtype.speed,
                    time_to_manage_secs: manage_secs,
                }
            })
            .collect();
    }
    log.log_emergency(
        emergency.id.0,
        EventKind::EmergencyStatus,
        "status changed to ASSIGNED",
    )
    .await;

    // Step 5: flip each twin to EN_ROUTE_TO_SCENE, grouping by type for the
    // summary log line, then release the locks.
    let mut groups: Vec<(std::sync::Arc<str>, Vec<u32>)> = Vec::new();
    for guard in &guards {
        guard.twin.set_status(TwinStatus::EnRouteToScene);
        let type_name = pool.twin_type(guard.twin).name.clone();
        log.log(
            &format!("{} {}", type_name, guard.twin.id),
            EventKind::RescuerStatus,
            &format!(
                "assigned to emergency {}, status EN_ROUTE_TO_SCENE",
                emergency.id
            ),
        )
        .await;
        match groups.iter_mut().find(|(name, _)| *name == type_name) {
            Some((_, ids)) => ids.push(guard.twin.id.0),
            None => groups.push((type_name, vec![guard.twin.id.0])),
        }
    }
    drop(guards);

    // Step 6: `{TypeA id,id}{TypeB id,...}` summary line.
    let mut summary = String::new();
    for (name, ids) in &groups {
        summary.push('{');
        summary.push_str(name);
        summary.push(' ');
        let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        summary.push_str(&parts.join(","));
        summary.push('}');
    }
    log.log_emergency(emergency.id.0, EventKind::Assignment, &summary).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edt_common::clock::ManualClock;
    use edt_common::config::RescuerCatalog;
    use edt_common::types::{EmergencyId, EmergencyRequirement, EmergencyType, RescuerType};
    use std::sync::Arc;

    fn catalog() -> RescuerCatalog {
        RescuerCatalog {
            types: vec![Arc::new(RescuerType {
                name: Arc::from("Medic"),
                speed: 10,
                base_x: 0,
                base_y: 0,
            })],
            twin_seeds: vec![(0, 0, 0)],
        }
    }

    fn emergency(id: u64, required: u32) -> EmergencyInstance {
        EmergencyInstance::new(
            EmergencyId(id),
            EmergencyType {
                name: Arc::from("Rash"),
                priority: 1,
                requirements: vec![EmergencyRequirement {
                    type_idx: 0,
                    type_name: Arc::from("Medic"),
                    required_count: required,
                    time_to_manage_secs: 3,
                }],
            },
            30,
            40,
            0,
        )
    }

    async fn log() -> EventLog {
        let dir = tempfile::tempdir().unwrap();
        EventLog::open(dir.path().join("e.log"), Arc::new(ManualClock::new(0))).unwrap()
    }

    #[tokio::test]
    async fn commits_reachable_assignment_and_marks_en_route() {
        let pool = crate::twins::TwinPool::from_catalog(&catalog());
        let em = emergency(1, 1);
        let log = log().await;
        try_assign(&pool, &em, 0, &log).await.unwrap();

        let state = em.state.lock().await;
        assert_eq!(state.status, EmergencyStatus::Assigned);
        assert_eq!(state.reserved_twins.len(), 1);
        assert_eq!(pool.twins()[0].status(), TwinStatus::EnRouteToScene);
    }

    #[tokio::test]
    async fn fails_when_not_enough_idle_twins() {
        let pool = crate::twins::TwinPool::from_catalog(&catalog());
        let em = emergency(1, 2);
        let log = log().await;
        assert_eq!(
            try_assign(&pool, &em, 0, &log).await,
            Err(AssignError::InsufficientCandidates)
        );
    }

    #[tokio::test]
    async fn fails_when_deadline_unreachable() {
        let pool = crate::twins::TwinPool::from_catalog(&catalog());
        let em = emergency(1, 1);
        let log = log().await;
        // deadline = 0 + 30s, travel time is ceil(70/10) = 7s, now = 100 blows past it.
        assert_eq!(
            try_assign(&pool, &em, 100, &log).await,
            Err(AssignError::InsufficientCandidates)
        );
    }

    #[tokio::test]
    async fn fails_without_mutating_state_when_twin_already_locked() {
        let pool = crate::twins::TwinPool::from_catalog(&catalog());
        let em = emergency(1, 1);
        let log = log().await;
        let held = pool.try_lock(TwinId(1)).unwrap();
        assert_eq!(
            try_assign(&pool, &em, 0, &log).await,
            Err(AssignError::LockContention)
        );
        drop(held);
        let state = em.state.lock().await;
        assert_eq!(state.status, EmergencyStatus::Waiting);
    }

    #[tokio::test]
    async fn zero_required_count_never_blocks() {
        let pool = crate::twins::TwinPool::from_catalog(&catalog());
        let em = emergency(1, 0);
        let log = log().await;
        try_assign(&pool, &em, 0, &log).await.unwrap();
        let state = em.state.lock().await;
        assert_eq!(state.reserved_twins.len(), 0);
    }
}
