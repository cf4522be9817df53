//! The sync push seam between table objects and the sync engine.
//!
//! # Design
//! The engine itself lives outside this crate. Table objects only need to
//! ask for a push, either waiting for it or handing it to the host's
//! scheduler. `PushMode` makes that choice explicit instead of branching on
//! a global environment flag.

use crate::error::SyncError;

/// Pushes locally pending objects (`New`, `Updated`, `Deleted`, `Removed`)
/// to the server.
///
/// Implementations must tolerate repeated and concurrent calls.
pub trait SyncPush: Send + Sync {
    /// Run a push to completion.
    fn push(&self) -> Result<(), SyncError>;

    /// Request a push without waiting for it. Must return immediately.
    fn schedule_push(&self);
}

/// How a push-requesting save hands work to the `SyncPush`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Run the push before returning. Deterministic; used by tests.
    Await,
    /// Fire and forget through `SyncPush::schedule_push`.
    Schedule,
    /// Never request a push.
    Suppress,
}

impl PushMode {
    pub(crate) fn dispatch(self, sync: &dyn SyncPush) -> Result<(), SyncError> {
        match self {
            PushMode::Await => sync.push(),
            PushMode::Schedule => {
                sync.schedule_push();
                Ok(())
            }
            PushMode::Suppress => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counting {
        pushed: AtomicUsize,
        scheduled: AtomicUsize,
    }

    impl SyncPush for Counting {
        fn push(&self) -> Result<(), SyncError> {
            self.pushed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn schedule_push(&self) {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn each_mode_reaches_the_right_hook() {
        let sync = Counting::default();
        PushMode::Await.dispatch(&sync).unwrap();
        PushMode::Schedule.dispatch(&sync).unwrap();
        PushMode::Suppress.dispatch(&sync).unwrap();
        assert_eq!(sync.pushed.load(Ordering::SeqCst), 1);
        assert_eq!(sync.scheduled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn await_surfaces_push_failure() {
        struct Failing;
        impl SyncPush for Failing {
            fn push(&self) -> Result<(), SyncError> {
                Err(SyncError::Push("offline".to_string()))
            }
            fn schedule_push(&self) {}
        }
        assert!(PushMode::Await.dispatch(&Failing).is_err());
        assert!(PushMode::Schedule.dispatch(&Failing).is_ok());
    }
}
