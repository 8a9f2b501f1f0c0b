//! Build-time bounds shared by every crate in the workspace. The simulator
//! never grows these structures at runtime, it only validates against them
//! at load time.

/// Maximum number of digital twins the pool can hold (dense ids `1..=MAX_TWINS`).
pub const MAX_TWINS: usize = 2048;

/// Maximum number of distinct rescuer types in the catalog.
pub const MAX_RESCUER_TYPES: usize = 512;

/// Maximum number of simultaneously registered intents.
pub const MAX_INTENT_ENTRIES: usize = 128;

/// Precedence window, in seconds, within a priority class.
pub const WINDOW_PERIOD_SEC: i64 = 5;

/// Deadline offset for priority-1 emergencies, in seconds.
pub const TIMEOUT_PRIORITY_1_SEC: i64 = 30;

/// Deadline offset for priority-2 emergencies, in seconds.
pub const TIMEOUT_PRIORITY_2_SEC: i64 = 10;

/// Deadline offset for priority-0 emergencies: a day, chosen to avoid
/// overflow in deadline arithmetic while still funneling every priority
/// through the same `now > deadline` comparison.
pub const TIMEOUT_PRIORITY_0_SEC: i64 = 86_400;

/// Number of back-off iterations between intent refreshes (`~1s` at 5ms each).
pub const INTENT_REFRESH_INTERVAL: u32 = 200;

/// Worker / ingress contention back-off, in milliseconds.
pub const BACKOFF_MS: u64 = 5;

/// Maximum size in bytes of one wire frame read off the message bus.
pub const MAX_FRAME_BYTES: usize = 512;

/// Minimum number of outstanding frames the bus must be able to buffer.
pub const MIN_BUS_SLOTS: usize = 10;

/// Returns the deadline offset, in seconds, for a given emergency priority.
pub const fn deadline_offset_secs(priority: u8) -> i64 {
    match priority {
        1 => TIMEOUT_PRIORITY_1_SEC,
        2 => TIMEOUT_PRIORITY_2_SEC,
        _ => TIMEOUT_PRIORITY_0_SEC,
    }
}
