//! The ingress dispatcher: polls the message bus, validates and admits
//! emergency requests, and spawns one worker task per admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;

use edt_common::clock::SharedClock;
use edt_common::config::GridConfig;
use edt_common::errors::DispatchError;
use edt_common::eventlog::{EventKind, EventLog};
use edt_common::limits::BACKOFF_MS;
use edt_common::protocol::parse_frame;
use edt_common::types::{EmergencyId, EmergencyInstance, EmergencyType};

use crate::bus::DatagramBus;
use crate::worker::{run_worker, WorkerContext};

/// Runs the ingress loop until `terminate` is set, polling `bus` for inbound
/// frames and spawning a worker task per admitted emergency. Every spawned
/// worker's `JoinHandle` is tracked in `workers`; once `terminate` is set the
/// loop stops pulling new requests and awaits every outstanding handle so
/// in-flight workers finish naturally rather than being dropped with the
/// runtime (spec.md §4.1, §5).
pub async fn run_ingress(
    bus: Arc<DatagramBus>,
    grid: Arc<GridConfig>,
    catalog: Arc<Vec<EmergencyType>>,
    ctx: WorkerContext,
    terminate: Arc<AtomicBool>,
) {
    let next_id = Arc::new(AtomicU64::new(1));
    let mut workers: JoinSet<()> = JoinSet::new();

    while !terminate.load(Ordering::Relaxed) {
        match bus.try_recv().await {
            Ok(Some(bytes)) => {
                let frame = String::from_utf8_lossy(&bytes).into_owned();
                handle_frame(&frame, &grid, &catalog, &ctx, &next_id, &mut workers).await;
            }
            Ok(None) => {
                reap_finished(&mut workers, &ctx.log).await;
                tokio::time::sleep(Duration::from_millis(BACKOFF_MS)).await;
            }
            Err(err) => {
                ctx.log
                    .log("main", EventKind::ThreadError, &format!("bus read failed: {err}"))
                    .await;
                tokio::time::sleep(Duration::from_millis(BACKOFF_MS)).await;
            }
        }
    }

    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            ctx.log
                .log(
                    "main",
                    EventKind::ThreadError,
                    &format!("worker task terminated abnormally: {err}"),
                )
                .await;
        }
    }
}

/// Drains any worker tasks that have already finished, logging abnormal
/// (panicked) terminations, without blocking on ones still in flight.
async fn reap_finished(workers: &mut JoinSet<()>, log: &EventLog) {
    while let Some(result) = workers.try_join_next() {
        if let Err(err) = result {
            log.log(
                "main",
                EventKind::ThreadError,
                &format!("worker task terminated abnormally: {err}"),
            )
            .await;
        }
    }
}

async fn handle_frame(
    frame: &str,
    grid: &GridConfig,
    catalog: &[EmergencyType],
    ctx: &WorkerContext,
    next_id: &AtomicU64,
    workers: &mut JoinSet<()>,
) {
    let Some(raw) = parse_frame(frame) else {
        let err = DispatchError::BadInput(format!("malformed frame: {frame:?}"));
        ctx.log.log("main", EventKind::MessageQueue, &format!("dropped {err}")).await;
        return;
    };

    let Some(etype) = catalog.iter().find(|t| &*t.name == raw.type_name.as_str()) else {
        let err = DispatchError::BadInput(format!("unknown emergency type '{}'", raw.type_name));
        ctx.log.log("main", EventKind::MessageQueue, &format!("dropped {err}")).await;
        return;
    };

    if !grid.contains(raw.x, raw.y) {
        let err = DispatchError::BadInput(format!("out-of-bounds request at ({}, {})", raw.x, raw.y));
        ctx.log.log("main", EventKind::MessageQueue, &format!("dropped {err}")).await;
        return;
    }

    let now = ctx.clock.now();
    if raw.timestamp > now {
        let err = DispatchError::BadInput(format!("request with future timestamp {}", raw.timestamp));
        ctx.log.log("main", EventKind::MessageQueue, &format!("dropped {err}")).await;
        return;
    }

    let id = EmergencyId(next_id.fetch_add(1, Ordering::Relaxed));
    let emergency = Arc::new(EmergencyInstance::new(id, etype.clone(), raw.x, raw.y, raw.timestamp));

    ctx.log
        .log_emergency(
            id.0,
            EventKind::EmergencyStatus,
            &format!("admitted '{}' at ({}, {})", etype.name, raw.x, raw.y),
        )
        .await;

    let worker_ctx = ctx.clone();
    workers.spawn(async move {
        run_worker(worker_ctx, emergency).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use edt_common::clock::ManualClock;
    use edt_common::config::RescuerCatalog;
    use edt_common::types::{EmergencyRequirement, RescuerType};

    fn grid() -> GridConfig {
        GridConfig {
            queue_name: "test".to_string(),
            width: 100,
            height: 100,
        }
    }

    fn catalog() -> Vec<EmergencyType> {
        vec![EmergencyType {
            name: Arc::from("Rash"),
            priority: 1,
            requirements: vec![EmergencyRequirement {
                type_idx: 0,
                type_name: Arc::from("Medic"),
                required_count: 1,
                time_to_manage_secs: 3,
            }],
        }]
    }

    fn rescuers() -> RescuerCatalog {
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

    async fn ctx() -> (WorkerContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(0));
        let log = Arc::new(EventLog::open(dir.path().join("e.log"), clock.clone()).unwrap());
        let ctx = WorkerContext {
            pool: Arc::new(crate::twins::TwinPool::from_catalog(&rescuers())),
            intents: Arc::new(crate::intent::IntentTable::new()),
            log,
            clock,
        };
        (ctx, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn admits_well_formed_request_and_spawns_a_worker() {
        let (ctx, _dir) = ctx().await;
        let next_id = AtomicU64::new(1);
        let mut workers = JoinSet::new();
        handle_frame("Rash 30 40 0", &grid(), &catalog(), &ctx, &next_id, &mut workers).await;
        assert_eq!(next_id.load(Ordering::Relaxed), 2);
        assert_eq!(workers.len(), 1);
    }

    #[tokio::test]
    async fn drops_unknown_emergency_type_without_spawning() {
        let (ctx, _dir) = ctx().await;
        let next_id = AtomicU64::new(1);
        let mut workers = JoinSet::new();
        handle_frame("Tornado 30 40 0", &grid(), &catalog(), &ctx, &next_id, &mut workers).await;
        assert_eq!(next_id.load(Ordering::Relaxed), 1);
        assert!(workers.is_empty());
    }

    #[tokio::test]
    async fn drops_out_of_bounds_request() {
        let (ctx, _dir) = ctx().await;
        let next_id = AtomicU64::new(1);
        let mut workers = JoinSet::new();
        handle_frame("Rash 9999 40 0", &grid(), &catalog(), &ctx, &next_id, &mut workers).await;
        assert_eq!(next_id.load(Ordering::Relaxed), 1);
        assert!(workers.is_empty());
    }

    #[tokio::test]
    async fn drops_malformed_frame() {
        let (ctx, _dir) = ctx().await;
        let next_id = AtomicU64::new(1);
        let mut workers = JoinSet::new();
        handle_frame("not a valid frame", &grid(), &catalog(), &ctx, &next_id, &mut workers).await;
        assert_eq!(next_id.load(Ordering::Relaxed), 1);
        assert!(workers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_worker_actually_runs_the_emergency_to_completion() {
        let (ctx, dir) = ctx().await;
        let next_id = AtomicU64::new(1);
        let mut workers = JoinSet::new();
        handle_frame("Rash 30 40 0", &grid(), &catalog(), &ctx, &next_id, &mut workers).await;

        // let the spawned worker task (and its simulation barrier tasks)
        // run to completion under the paused virtual clock.
        while workers.join_next().await.is_some() {}

        let contents = std::fs::read_to_string(dir.path().join("e.log")).unwrap();
        assert!(contents.contains("COMPLETED"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_drains_in_flight_workers_instead_of_cancelling_them() {
        let (ctx, dir) = ctx().await;
        let log_path = dir.path().join("e.log");
        let bus_path = dir.path().join("bus.sock");
        let bus = Arc::new(crate::bus::DatagramBus::bind(&bus_path).unwrap());
        let grid = Arc::new(grid());
        let catalog = Arc::new(catalog());
        let terminate = Arc::new(AtomicBool::new(false));

        let ingress = tokio::spawn(run_ingress(bus, grid, catalog, ctx.clone(), terminate.clone()));

        let client = tokio::net::UnixDatagram::unbound().unwrap();
        client.send_to(b"Rash 30 40 0", &bus_path).await.unwrap();

        // wait for the ingress loop to actually admit the request (and spawn
        // its worker) before telling it to stop pulling new ones.
        loop {
            let contents = std::fs::read_to_string(&log_path).unwrap_or_default();
            if contents.contains("admitted") {
                break;
            }
            tokio::task::yield_now().await;
        }
        terminate.store(true, Ordering::Relaxed);

        // `run_ingress` must not return until the in-flight worker (and its
        // simulation barrier tasks) have actually run to completion.
        ingress.await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("COMPLETED"));
    }
}
