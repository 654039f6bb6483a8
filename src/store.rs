use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    logging::Logger,
    types::{Skeleton, SkeletonSnapshot},
};

#[derive(Debug, Default)]
struct StoreState {
    snapshot: SkeletonSnapshot,
    /// Number of snapshots written since the last reset; 0 = never written.
    generation: u64,
    tracking_enabled: bool,
}

/// Latest tracking result, shared between the capture thread and readers.
///
/// The lock is held only while a snapshot is moved in or cloned out, never
/// across a device call.
#[derive(Debug)]
pub struct SkeletonStore {
    state: RwLock<StoreState>,
    log: Logger,
}

impl SkeletonStore {
    pub fn new(log: Logger) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            log,
        }
    }

    // A writer cannot leave a half-written snapshot behind: the replacement
    // is a single move. Poisoning is therefore safe to ignore.
    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the store and records whether tracking is active for the new
    /// session.
    pub fn reset(&self, tracking_enabled: bool) {
        let mut state = self.write_state();
        *state = StoreState {
            tracking_enabled,
            ..StoreState::default()
        };
    }

    pub fn write(&self, snapshot: SkeletonSnapshot) {
        let mut state = self.write_state();
        state.snapshot = snapshot;
        state.generation += 1;
    }

    pub fn read(&self) -> SkeletonSnapshot {
        self.read_state().snapshot.clone()
    }

    pub fn tracked_count(&self) -> usize {
        self.read_state().snapshot.tracked_count()
    }

    /// Increments on every write; lets pollers skip unchanged snapshots.
    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    pub fn is_tracking_enabled(&self) -> bool {
        self.read_state().tracking_enabled
    }

    /// Returns the skeleton at `index`, or the null skeleton when tracking is
    /// disabled, nothing has been written yet, or the index is out of range.
    pub fn read_one(&self, index: usize) -> Skeleton {
        let state = self.read_state();

        if !state.tracking_enabled {
            self.log.warn(format_args!(
                "an empty skeleton was returned as skeleton tracking is disabled"
            ));
            return Skeleton::empty();
        }

        if state.generation == 0 {
            self.log.warn(format_args!(
                "an empty skeleton was returned as no body frame has been tracked yet"
            ));
            return Skeleton::empty();
        }

        match state.snapshot.skeletons().get(index) {
            Some(skeleton) => skeleton.clone(),
            None => {
                self.log.warn(format_args!(
                    "an empty skeleton was returned as the requested index {index} is out of range"
                ));
                Skeleton::empty()
            }
        }
    }
}

impl Default for SkeletonStore {
    fn default() -> Self {
        SkeletonStore::new(Logger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JOINT_COUNT, JointTransform};
    use std::{sync::Arc, thread};

    fn skeletons(count: usize) -> Vec<Skeleton> {
        (0..count)
            .map(|id| Skeleton {
                id: id as u32,
                joints: vec![JointTransform::default(); JOINT_COUNT],
            })
            .collect()
    }

    #[test]
    fn read_one_conditions() {
        let store = SkeletonStore::default();
        assert!(store.read_one(0).is_empty(), "tracking disabled");

        store.reset(true);
        assert!(store.read_one(0).is_empty(), "never written");

        store.write(SkeletonSnapshot::new(skeletons(2)));
        assert_eq!(store.read_one(1).id, 1);
        assert_eq!(store.read_one(1).joints.len(), JOINT_COUNT);
        assert!(store.read_one(2).is_empty(), "out of range");
    }

    #[test]
    fn reset_forgets_previous_snapshot() {
        let store = SkeletonStore::default();
        store.reset(true);
        store.write(SkeletonSnapshot::new(skeletons(3)));
        assert_eq!(store.generation(), 1);
        assert_eq!(store.tracked_count(), 3);

        store.reset(false);
        assert_eq!(store.generation(), 0);
        assert_eq!(store.tracked_count(), 0);
        assert!(store.read().skeletons().is_empty());
        assert!(!store.is_tracking_enabled());
    }

    #[test]
    fn concurrent_readers_never_see_torn_snapshots() {
        let store = Arc::new(SkeletonStore::default());
        store.reset(true);

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for round in 0..500 {
                    store.write(SkeletonSnapshot::new(skeletons(round % 7)));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.read();
                        assert_eq!(snapshot.skeletons().len(), snapshot.tracked_count());
                        for (id, skeleton) in snapshot.skeletons().iter().enumerate() {
                            assert_eq!(skeleton.id, id as u32);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.generation(), 500);
    }
}
