/// Single-owner snapshot store for one active view.
///
/// The snapshot lives inside a `watch` channel: every write publishes a new
/// `Arc` and bumps a monotonic version, so observers always see a complete
/// snapshot (old or new, never a mix). Readers share the `Arc` and never get
/// mutable access to nested collections.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::PatchError;

/// A snapshot type the store can hold and patch.
pub trait Snapshot: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Patch: fmt::Debug + Send + Sync;

    /// Transform `self` in place. On error `self` may be partially modified;
    /// the store only ever calls this on a private clone.
    fn apply(&mut self, patch: &Self::Patch) -> Result<(), PatchError>;

    /// Post-patch consistency check, logged at debug level when it fails.
    fn check(&self) -> Result<(), PatchError> {
        Ok(())
    }
}

/// A published snapshot. Version 0 means no authoritative fetch has landed.
#[derive(Debug)]
pub struct VersionedSnapshot<T> {
    pub version: u64,
    pub data: Arc<T>,
}

impl<T> Clone for VersionedSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> VersionedSnapshot<T> {
    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }
}

pub struct SnapshotStore<T: Snapshot> {
    tx: watch::Sender<VersionedSnapshot<T>>,
    next_version: AtomicU64,
}

impl<T: Snapshot> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Snapshot> SnapshotStore<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(VersionedSnapshot {
            version: 0,
            data: Arc::new(T::default()),
        });
        Self {
            tx,
            next_version: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current(&self) -> VersionedSnapshot<T> {
        self.tx.borrow().clone()
    }

    /// Receive every published snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<VersionedSnapshot<T>> {
        self.tx.subscribe()
    }

    /// Substitute the whole snapshot (authoritative fetch). Returns the new
    /// version.
    pub fn replace(&self, value: T) -> u64 {
        let version = self.bump();
        self.tx.send_replace(VersionedSnapshot {
            version,
            data: Arc::new(value),
        });
        version
    }

    /// Republish a previously captured snapshot (rollback).
    pub fn restore(&self, captured: &VersionedSnapshot<T>) -> u64 {
        let version = self.bump();
        self.tx.send_replace(VersionedSnapshot {
            version,
            data: Arc::clone(&captured.data),
        });
        version
    }

    /// Apply one patch as a functional update. The published snapshot is
    /// untouched when the patch is rejected.
    pub fn apply(&self, patch: &T::Patch) -> Result<VersionedSnapshot<T>, PatchError> {
        let mut outcome = Err(PatchError::NotLoaded);
        self.tx.send_if_modified(|current| {
            if !current.is_loaded() {
                return false;
            }
            let mut next = T::clone(&current.data);
            match next.apply(patch) {
                Ok(()) => {
                    if let Err(e) = next.check() {
                        log::debug!(
                            target: "corkboard.store",
                            "Snapshot inconsistent after {:?}: {}",
                            patch,
                            e
                        );
                    }
                    *current = VersionedSnapshot {
                        version: self.bump(),
                        data: Arc::new(next),
                    };
                    outcome = Ok(current.clone());
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }
}
