//! The append-only structured event trail: one line per event,
//! `"[<ts>] [<id_or_module>] [<event_kind>] <message>"`.
//!
//! A single mutex serializes writes, and the file descriptor is `fsync`'d
//! every 10 writes rather than on every call, trading a small durability
//! window for throughput under load. This sink is deliberately separate
//! from the `tracing` layer wired in `edt-dispatchd::main` — its line
//! format is an external wire contract, not free-form operational logging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tokio::sync::Mutex;

use crate::clock::{Clock, SharedClock};
use crate::errors::DispatchError;

/// The event kinds an [`EventLog`] line may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MessageQueue,
    EmergencyStatus,
    RescuerStatus,
    Assignment,
    Intent,
    FileParsing,
    ThreadError,
}

impl EventKind {
    const fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageQueue => "MESSAGE_QUEUE",
            EventKind::EmergencyStatus => "EMERGENCY_STATUS",
            EventKind::RescuerStatus => "RESCUER_STATUS",
            EventKind::Assignment => "ASSIGNMENT",
            EventKind::Intent => "INTENT",
            EventKind::FileParsing => "FILE_PARSING",
            EventKind::ThreadError => "THREAD_ERROR",
        }
    }
}

struct Inner {
    file: File,
    writes_since_flush: u32,
}

/// The append-only event sink.
pub struct EventLog {
    inner: Mutex<Inner>,
    clock: SharedClock,
}

/// Flush cadence: `fsync` every 10 writes.
const FLUSH_EVERY: u32 = 10;

impl EventLog {
    /// Opens (creating if absent) the log file at `path` in append mode.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self, DispatchError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| {
                DispatchError::infrastructural(
                    format!("opening event log {}", path.as_ref().display()),
                    e,
                )
            })?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                writes_since_flush: 0,
            }),
            clock,
        })
    }

    /// Appends one event line: `"[<ts>] [<id>] [<kind>] <message>"`.
    pub async fn log(&self, id: &str, kind: EventKind, message: &str) {
        let line = format!(
            "[{}] [{}] [{}] {}\n",
            self.clock.now(),
            id,
            kind.as_str(),
            message
        );
        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to write to event log");
            return;
        }
        inner.writes_since_flush += 1;
        if inner.writes_since_flush >= FLUSH_EVERY {
            let _ = inner.file.sync_all();
            inner.writes_since_flush = 0;
        }
    }

    /// Convenience wrapper for events scoped to one emergency id.
    pub async fn log_emergency(&self, emergency_id: u64, kind: EventKind, message: &str) {
        self.log(&format!("Emergency {emergency_id}"), kind, message)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let clock: SharedClock = Arc::new(ManualClock::new(42));
        let log = EventLog::open(&path, clock).unwrap();

        log.log("main", EventKind::FileParsing, "loaded catalog").await;
        log.log_emergency(1, EventKind::EmergencyStatus, "ASSIGNED").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[42] [main] [FILE_PARSING] loaded catalog");
        assert_eq!(lines[1], "[42] [Emergency 1] [EMERGENCY_STATUS] ASSIGNED");
    }
}
