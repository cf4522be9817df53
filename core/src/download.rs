//! Registry of table object files currently being downloaded.
//!
//! `try_begin` checks and inserts under one lock, so two callers can never
//! both start a download for the same uuid. The returned guard removes the
//! entry when dropped, whether the download succeeded or not.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.in_flight.lock().contains(&uuid)
    }

    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    /// Mark `uuid` as in flight. `None` if a download is already running.
    pub fn try_begin(&self, uuid: Uuid) -> Option<DownloadGuard> {
        if !self.in_flight.lock().insert(uuid) {
            return None;
        }
        Some(DownloadGuard {
            tracker: self.clone(),
            uuid,
        })
    }
}

/// Keeps one uuid registered as in flight until dropped.
#[derive(Debug)]
pub struct DownloadGuard {
    tracker: DownloadTracker,
    uuid: Uuid,
}

impl DownloadGuard {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.lock().remove(&self.uuid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_for_same_uuid_is_refused() {
        let tracker = DownloadTracker::new();
        let uuid = Uuid::new_v4();
        let guard = tracker.try_begin(uuid).unwrap();
        assert!(tracker.contains(uuid));
        assert!(tracker.try_begin(uuid).is_none());
        assert!(tracker.try_begin(Uuid::new_v4()).is_some());

        drop(guard);
        assert!(!tracker.contains(uuid));
        assert!(tracker.is_empty());
    }

    #[test]
    fn clones_share_the_registry() {
        let tracker = DownloadTracker::new();
        let shared = tracker.clone();
        let uuid = Uuid::new_v4();
        let _guard = tracker.try_begin(uuid).unwrap();
        assert!(shared.contains(uuid));
        assert_eq!(shared.len(), 1);
    }
}
