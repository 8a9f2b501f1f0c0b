//! The intent arbitration table: a process-wide mapping from emergency id
//! to its currently declared intent, protected by a single mutex — coarse
//! locking is adequate at the table's bounded size (hundreds of entries).

use edt_common::limits::{MAX_INTENT_ENTRIES, WINDOW_PERIOD_SEC};
use edt_common::types::{EmergencyId, Intent};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentError {
    TableFull,
    AlreadyRegistered,
    NotFound,
}

/// The process-wide arbiter over the declared intents of in-flight workers.
pub struct IntentTable {
    items: Mutex<Vec<Intent>>,
}

impl Default for IntentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentTable {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::with_capacity(MAX_INTENT_ENTRIES)),
        }
    }

    /// Registers a brand-new intent. Fails if the table is full or an intent
    /// for this emergency id is already present — at most one intent per
    /// emergency id may be registered at a time.
    pub async fn register(&self, intent: Intent) -> Result<(), IntentError> {
        let mut items = self.items.lock().await;
        if items.iter().any(|i| i.emergency_id == intent.emergency_id) {
            return Err(IntentError::AlreadyRegistered);
        }
        if items.len() >= MAX_INTENT_ENTRIES {
            return Err(IntentError::TableFull);
        }
        items.push(intent);
        Ok(())
    }

    /// Replaces the entry for `intent.emergency_id`. Fails if not present.
    pub async fn update(&self, intent: Intent) -> Result<(), IntentError> {
        let mut items = self.items.lock().await;
        match items.iter_mut().find(|i| i.emergency_id == intent.emergency_id) {
            Some(slot) => {
                *slot = intent;
                Ok(())
            }
            None => Err(IntentError::NotFound),
        }
    }

    /// Removes the entry for `id`; a no-op if absent.
    pub async fn unregister(&self, id: EmergencyId) {
        let mut items = self.items.lock().await;
        items.retain(|i| i.emergency_id != id);
    }

    /// Decides whether the intent for `id` may proceed to the assignment
    /// attempt, by the conflict/priority/FIFO-window precedence rule: it
    /// wins if no conflicting intent strictly outranks it (higher priority,
    /// or equal priority submitted at least the window period earlier).
    pub async fn may_proceed(&self, id: EmergencyId) -> bool {
        let items = self.items.lock().await;
        let Some(candidate) = items.iter().find(|i| i.emergency_id == id) else {
            return false;
        };

        for other in items.iter() {
            if other.emergency_id == candidate.emergency_id {
                continue;
            }
            if !candidate.conflicts_with(other) {
                continue;
            }
            if other.priority > candidate.priority {
                return false;
            }
            if other.priority == candidate.priority
                && other.submitted_time < candidate.submitted_time
                && candidate.submitted_time - other.submitted_time < WINDOW_PERIOD_SEC
            {
                return false;
            }
        }
        true
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edt_common::types::TwinId;

    fn intent(id: u64, priority: u8, t: i64, twins: &[u32]) -> Intent {
        Intent {
            emergency_id: EmergencyId(id),
            priority,
            submitted_time: t,
            candidate_twin_ids: twins.iter().map(|&x| TwinId(x)).collect(),
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicate_id() {
        let table = IntentTable::new();
        table.register(intent(1, 1, 0, &[1])).await.unwrap();
        assert_eq!(
            table.register(intent(1, 1, 0, &[2])).await,
            Err(IntentError::AlreadyRegistered)
        );
    }

    #[tokio::test]
    async fn update_requires_existing_entry() {
        let table = IntentTable::new();
        assert_eq!(
            table.update(intent(1, 1, 0, &[1])).await,
            Err(IntentError::NotFound)
        );
        table.register(intent(1, 1, 0, &[1])).await.unwrap();
        table.update(intent(1, 1, 0, &[1, 2])).await.unwrap();
    }

    #[tokio::test]
    async fn higher_priority_blocks_conflicting_lower_priority() {
        let table = IntentTable::new();
        table.register(intent(1, 2, 100, &[5])).await.unwrap();
        table.register(intent(2, 1, 100, &[5])).await.unwrap();
        assert!(table.may_proceed(EmergencyId(1)).await);
        assert!(!table.may_proceed(EmergencyId(2)).await);
    }

    #[tokio::test]
    async fn older_same_priority_blocks_within_window() {
        let table = IntentTable::new();
        table.register(intent(1, 1, 100, &[5])).await.unwrap();
        table.register(intent(2, 1, 102, &[5])).await.unwrap();
        assert!(!table.may_proceed(EmergencyId(2)).await);

        table.unregister(EmergencyId(1)).await;
        table.register(intent(1, 1, 95, &[5])).await.unwrap();
        // 102 - 95 = 7s, past the 5s window: both may proceed.
        assert!(table.may_proceed(EmergencyId(2)).await);
    }

    #[tokio::test]
    async fn identical_timestamps_give_neither_precedence() {
        let table = IntentTable::new();
        table.register(intent(1, 1, 100, &[5])).await.unwrap();
        table.register(intent(2, 1, 100, &[5])).await.unwrap();
        assert!(table.may_proceed(EmergencyId(1)).await);
        assert!(table.may_proceed(EmergencyId(2)).await);
    }

    #[tokio::test]
    async fn non_conflicting_intents_never_block_each_other() {
        let table = IntentTable::new();
        table.register(intent(1, 2, 100, &[1])).await.unwrap();
        table.register(intent(2, 0, 50, &[2])).await.unwrap();
        assert!(table.may_proceed(EmergencyId(1)).await);
        assert!(table.may_proceed(EmergencyId(2)).await);
    }

    #[tokio::test]
    async fn unregister_is_a_no_op_when_absent() {
        let table = IntentTable::new();
        table.unregister(EmergencyId(42)).await;
        assert_eq!(table.len().await, 0);
    }
}
