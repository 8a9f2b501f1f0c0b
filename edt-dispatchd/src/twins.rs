//! The shared mutable twin pool: a dense, 1-based arena of digital twins
//! plus a parallel array of per-twin exclusion locks.

use std::sync::Arc;

use edt_common::config::RescuerCatalog;
use edt_common::types::{DigitalTwin, RescuerType, TwinId, TwinStatus};
use tokio::sync::{Mutex, MutexGuard};

/// Holds a try-locked twin's exclusion guard plus a handle to the twin itself.
pub struct TwinLockGuard<'a> {
    pub twin: &'a DigitalTwin,
    _guard: MutexGuard<'a, ()>,
}

/// The fixed catalog of rescuer digital twins.
pub struct TwinPool {
    types: Vec<Arc<RescuerType>>,
    twins: Vec<DigitalTwin>,
    locks: Vec<Mutex<()>>,
}

impl TwinPool {
    /// Materializes a pool from a loaded [`RescuerCatalog`], assigning dense
    /// 1-based ids in catalog order, exactly as `parse_rescuers.c` does.
    pub fn from_catalog(catalog: &RescuerCatalog) -> Self {
        let twins: Vec<DigitalTwin> = catalog
            .twin_seeds
            .iter()
            .enumerate()
            .map(|(i, &(type_idx, x, y))| DigitalTwin::new(TwinId((i + 1) as u32), type_idx, x, y))
            .collect();
        let locks = twins.iter().map(|_| Mutex::new(())).collect();
        Self {
            types: catalog.types.clone(),
            twins,
            locks,
        }
    }

    pub fn len(&self) -> usize {
        self.twins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.twins.is_empty()
    }

    pub fn twin_type(&self, twin: &DigitalTwin) -> &RescuerType {
        &self.types[twin.type_idx]
    }

    pub fn type_by_index(&self, idx: usize) -> &RescuerType {
        &self.types[idx]
    }

    /// All twins, in dense id order. Position/status reads are unsynchronised
    /// atomics — callers that need authoritative state must go through
    /// [`TwinPool::try_lock`] and re-check status after acquiring it.
    pub fn twins(&self) -> &[DigitalTwin] {
        &self.twins
    }

    pub fn twin(&self, id: TwinId) -> &DigitalTwin {
        &self.twins[id.index()]
    }

    /// Attempts to acquire the exclusion lock for `id` without blocking,
    /// matching `mtx_trylock` in `assign_rescuers_to_emergency`.
    pub fn try_lock(&self, id: TwinId) -> Option<TwinLockGuard<'_>> {
        let guard = self.locks[id.index()].try_lock().ok()?;
        Some(TwinLockGuard {
            twin: &self.twins[id.index()],
            _guard: guard,
        })
    }
}

impl TwinLockGuard<'_> {
    pub fn status(&self) -> TwinStatus {
        self.twin.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> RescuerCatalog {
        RescuerCatalog {
            types: vec![Arc::new(RescuerType {
                name: Arc::from("Medic"),
                speed: 10,
                base_x: 0,
                base_y: 0,
            })],
            twin_seeds: vec![(0, 0, 0), (0, 0, 0)],
        }
    }

    #[test]
    fn materializes_dense_ids() {
        let pool = TwinPool::from_catalog(&sample_catalog());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.twins()[0].id, TwinId(1));
        assert_eq!(pool.twins()[1].id, TwinId(2));
    }

    #[tokio::test]
    async fn try_lock_excludes_concurrent_holders() {
        let pool = TwinPool::from_catalog(&sample_catalog());
        let guard = pool.try_lock(TwinId(1)).unwrap();
        assert!(pool.try_lock(TwinId(1)).is_none());
        drop(guard);
        assert!(pool.try_lock(TwinId(1)).is_some());
    }
}
