//! The simulation barrier: a per-emergency rendezvous synchronising the
//! reserved twins and the emergency itself through arrival and completion.
//!
//! Each wait re-checks its predicate in a loop against a freshly-fetched
//! `Notify` future, so a spurious wake-up (or one delivered to a waiter that
//! re-registers after the last arrival already fired) can never be mistaken
//! for the real rendezvous.

use tokio::sync::{Mutex, Notify};

/// Per-emergency rendezvous object shared by the reserved twins' tasks and
/// the emergency's own barrier task.
pub struct SimulationBarrier {
    rescuer_count: usize,
    arrived: Mutex<usize>,
    returned: Mutex<usize>,
    all_arrived: Notify,
    all_returned: Notify,
}

impl SimulationBarrier {
    pub fn new(rescuer_count: usize) -> Self {
        Self {
            rescuer_count,
            arrived: Mutex::new(0),
            returned: Mutex::new(0),
            all_arrived: Notify::new(),
            all_returned: Notify::new(),
        }
    }

    /// Called by a twin task once it has reached the scene. Broadcasts when
    /// it is the last arrival.
    pub async fn mark_arrived(&self) {
        let mut n = self.arrived.lock().await;
        *n += 1;
        if *n >= self.rescuer_count {
            self.all_arrived.notify_waiters();
        }
    }

    /// Waits until every reserved twin has arrived. Loops on the predicate
    /// rather than trusting a single wake-up, so it is safe for both the
    /// last-arriving twin (whose own `mark_arrived` already satisfied the
    /// predicate) and the emergency task.
    pub async fn wait_all_arrived(&self) {
        loop {
            let notified = self.all_arrived.notified();
            if *self.arrived.lock().await >= self.rescuer_count {
                return;
            }
            notified.await;
        }
    }

    /// Called by a twin task once it starts its return trip. Signals when it
    /// is the last to finish its on-scene work.
    pub async fn mark_returned(&self) {
        let mut n = self.returned.lock().await;
        *n += 1;
        if *n >= self.rescuer_count {
            self.all_returned.notify_waiters();
        }
    }

    /// Waits until every reserved twin has started its return trip.
    pub async fn wait_all_returned(&self) {
        loop {
            let notified = self.all_returned.notified();
            if *self.returned.lock().await >= self.rescuer_count {
                return;
            }
            notified.await;
        }
    }
}
