//! Domain types for the emergency dispatch twin simulator: twins, rescuer
//! and emergency type catalogs, emergency instances, and arbitration
//! intents. Twin position and status live behind atomics, and the mutable
//! half of an emergency instance behind a `tokio::sync::Mutex`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use tokio::sync::Mutex;

/// Dense, 1-based digital twin identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TwinId(pub u32);

impl TwinId {
    /// Converts to the 0-based index into the pool's backing `Vec`.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl std::fmt::Display for TwinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic emergency instance identifier, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmergencyId(pub u64);

impl std::fmt::Display for EmergencyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rescuer type from the catalog: immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RescuerType {
    pub name: Arc<str>,
    /// Travel speed, in grid cells per second.
    pub speed: u32,
    pub base_x: i32,
    pub base_y: i32,
}

/// Live status of a digital twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TwinStatus {
    Idle = 0,
    EnRouteToScene = 1,
    OnScene = 2,
    ReturningToBase = 3,
}

impl TwinStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TwinStatus::Idle,
            1 => TwinStatus::EnRouteToScene,
            2 => TwinStatus::OnScene,
            _ => TwinStatus::ReturningToBase,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TwinStatus::Idle => "IDLE",
            TwinStatus::EnRouteToScene => "EN_ROUTE_TO_SCENE",
            TwinStatus::OnScene => "ON_SCENE",
            TwinStatus::ReturningToBase => "RETURNING_TO_BASE",
        }
    }
}

impl std::fmt::Display for TwinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mobile rescuer digital twin.
///
/// Position and status are atomics so candidate scanning in the assignment
/// engine and intent creation can take an unsynchronised read without
/// contending on the exclusion lock; the lock (held separately, one per
/// twin, in the twin pool) remains the only path that may authoritatively
/// transition a twin out of `IDLE`.
#[derive(Debug)]
pub struct DigitalTwin {
    pub id: TwinId,
    pub type_idx: usize,
    x: AtomicI32,
    y: AtomicI32,
    status: AtomicU8,
}

impl DigitalTwin {
    pub fn new(id: TwinId, type_idx: usize, x: i32, y: i32) -> Self {
        Self {
            id,
            type_idx,
            x: AtomicI32::new(x),
            y: AtomicI32::new(y),
            status: AtomicU8::new(TwinStatus::Idle as u8),
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x.load(Ordering::Acquire), self.y.load(Ordering::Acquire))
    }

    pub fn set_position(&self, x: i32, y: i32) {
        self.x.store(x, Ordering::Release);
        self.y.store(y, Ordering::Release);
    }

    pub fn status(&self) -> TwinStatus {
        TwinStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: TwinStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// One `(type, count, manage-time)` line of an emergency type's requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyRequirement {
    pub type_idx: usize,
    pub type_name: Arc<str>,
    pub required_count: u32,
    pub time_to_manage_secs: i64,
}

/// An emergency type from the catalog: immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyType {
    pub name: Arc<str>,
    pub priority: u8,
    pub requirements: Vec<EmergencyRequirement>,
}

impl EmergencyType {
    /// Deadline offset for this type's priority, in seconds.
    pub fn deadline_offset_secs(&self) -> i64 {
        crate::limits::deadline_offset_secs(self.priority)
    }
}

/// Lifecycle state of an emergency instance: monotone along
/// `WAITING -> ASSIGNED -> IN_PROGRESS -> COMPLETED`, or `-> TIMEOUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyStatus {
    Waiting,
    Assigned,
    InProgress,
    Paused,
    Completed,
    Canceled,
    Timeout,
}

impl EmergencyStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            EmergencyStatus::Waiting => "WAITING",
            EmergencyStatus::Assigned => "ASSIGNED",
            EmergencyStatus::InProgress => "IN_PROGRESS",
            EmergencyStatus::Paused => "PAUSED",
            EmergencyStatus::Completed => "COMPLETED",
            EmergencyStatus::Canceled => "CANCELED",
            EmergencyStatus::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deep-copy snapshot of a twin taken at commit time, decoupling the
/// emergency's reservation from subsequent pool mutation.
#[derive(Debug, Clone)]
pub struct ReservedTwin {
    pub id: TwinId,
    pub type_name: Arc<str>,
    pub origin_x: i32,
    pub origin_y: i32,
    pub base_x: i32,
    pub base_y: i32,
    pub speed: u32,
    pub time_to_manage_secs: i64,
}

/// The mutable half of an [`EmergencyInstance`]: touched by the owning
/// worker, the spawned twin tasks, and the spawned emergency-barrier task.
#[derive(Debug)]
pub struct EmergencyState {
    pub status: EmergencyStatus,
    pub rescuer_count: usize,
    pub reserved_twins: Vec<ReservedTwin>,
}

/// A validated, admitted emergency request.
#[derive(Debug)]
pub struct EmergencyInstance {
    pub id: EmergencyId,
    pub etype: EmergencyType,
    pub x: i32,
    pub y: i32,
    pub submitted_time: i64,
    pub state: Mutex<EmergencyState>,
}

impl EmergencyInstance {
    pub fn new(id: EmergencyId, etype: EmergencyType, x: i32, y: i32, submitted_time: i64) -> Self {
        Self {
            id,
            etype,
            x,
            y,
            submitted_time,
            state: Mutex::new(EmergencyState {
                status: EmergencyStatus::Waiting,
                rescuer_count: 0,
                reserved_twins: Vec::new(),
            }),
        }
    }

    /// Absolute deadline (unix seconds) for this instance.
    pub fn deadline(&self) -> i64 {
        self.submitted_time + self.etype.deadline_offset_secs()
    }
}

/// A worker's declared claim to a candidate set of twins, used for
/// arbitration before commit.
#[derive(Debug, Clone)]
pub struct Intent {
    pub emergency_id: EmergencyId,
    pub priority: u8,
    pub submitted_time: i64,
    pub candidate_twin_ids: Vec<TwinId>,
}

impl Intent {
    /// Two intents conflict if their candidate sets share at least one twin id.
    pub fn conflicts_with(&self, other: &Intent) -> bool {
        self.candidate_twin_ids
            .iter()
            .any(|id| other.candidate_twin_ids.contains(id))
    }
}
