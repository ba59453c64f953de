/// Scoped refetch with an in-flight guard.
///
/// A trigger that arrives while a fetch for the same view is running is
/// satisfied by that fetch, so bursts of invalidations collapse into one
/// request. Reconciliation after a committed mutation cannot reuse a fetch
/// that was already on the wire and queues one more pass instead. Results
/// that land after the view unmounted are dropped.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{ApiResult, BoardApi, Scope};
use crate::error::{PatchError, SyncError};
use crate::store::{Snapshot, SnapshotStore};
use crate::types::{Board, BoardList};

/// Shared "view still mounted" flag. Cloned into every async callback.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A snapshot that can be fetched whole from the remote store.
#[async_trait]
pub trait Fetch: Snapshot {
    async fn fetch(api: &dyn BoardApi, scope: &Scope) -> ApiResult<Self>;
}

#[async_trait]
impl Fetch for Board {
    async fn fetch(api: &dyn BoardApi, scope: &Scope) -> ApiResult<Self> {
        let Scope::Board(board_id) = scope else {
            return Err(PatchError::UnknownBoard(scope.to_string()).into());
        };
        let mut board = api.get_board(board_id).await?;
        board.normalize();
        Ok(board)
    }
}

#[async_trait]
impl Fetch for BoardList {
    async fn fetch(api: &dyn BoardApi, _scope: &Scope) -> ApiResult<Self> {
        let mut boards = api.get_boards().await?;
        for board in &mut boards {
            board.normalize();
        }
        Ok(BoardList(boards))
    }
}

/// Outcome of one `refresh` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refreshed {
    /// A fresh snapshot was published.
    Replaced(u64),
    /// Another fetch was already running.
    Coalesced,
    /// The view unmounted before the result arrived.
    Discarded,
}

#[derive(Debug, Default)]
struct FetchState {
    running: bool,
    /// A caller needs a fetch that starts after its request.
    rerun: bool,
    /// Generation of the last fetch started.
    started: u64,
}

type Completion = (u64, Result<Refreshed, SyncError>);

struct Inner<T: Fetch> {
    api: Arc<dyn BoardApi>,
    store: Arc<SnapshotStore<T>>,
    scope: Scope,
    liveness: Liveness,
    state: Mutex<FetchState>,
    completed: watch::Sender<Completion>,
}

impl<T: Fetch> Inner<T> {
    fn state(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Refresher<T: Fetch> {
    inner: Arc<Inner<T>>,
}

impl<T: Fetch> Clone for Refresher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Gives up the running slot. A rerun still queued will not happen, so it
/// is completed as `Discarded` to wake its waiters.
fn release(inner: &Inner<impl Fetch>, state: &mut FetchState) {
    state.running = false;
    if std::mem::take(&mut state.rerun) {
        state.started += 1;
        inner
            .completed
            .send_replace((state.started, Ok(Refreshed::Discarded)));
    }
}

/// Releases the running slot if the fetch future is dropped mid-flight.
struct Running<'a, T: Fetch> {
    inner: &'a Inner<T>,
    released: bool,
}

impl<T: Fetch> Drop for Running<'_, T> {
    fn drop(&mut self) {
        if !self.released {
            release(self.inner, &mut self.inner.state());
        }
    }
}

impl<T: Fetch> Refresher<T> {
    pub fn new(
        api: Arc<dyn BoardApi>,
        store: Arc<SnapshotStore<T>>,
        scope: Scope,
        liveness: Liveness,
    ) -> Self {
        let (completed, _) = watch::channel((0, Ok(Refreshed::Discarded)));
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                scope,
                liveness,
                state: Mutex::new(FetchState::default()),
                completed,
            }),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state().running
    }

    /// Fetch the whole scope and replace the snapshot (last arrival wins).
    /// Coalesces into a fetch that is already running.
    pub async fn refresh(&self) -> Result<Refreshed, SyncError> {
        {
            let mut state = self.inner.state();
            if state.running {
                log::debug!(
                    target: "corkboard.sync.refresh",
                    "Refetch of {} already in flight, coalescing",
                    self.inner.scope
                );
                return Ok(Refreshed::Coalesced);
            }
            state.running = true;
        }
        self.run().await
    }

    /// Refetch whose request must reach the server after the caller's
    /// mutation committed. A running fetch may predate the commit, so it is
    /// asked to go once more and the caller waits for that pass.
    pub async fn refresh_after_commit(&self) -> Result<Refreshed, SyncError> {
        let target = {
            let mut state = self.inner.state();
            if state.running {
                state.rerun = true;
                Some(state.started + 1)
            } else {
                state.running = true;
                None
            }
        };
        let Some(target) = target else {
            return self.run().await;
        };
        log::debug!(
            target: "corkboard.sync.refresh",
            "Refetch of {} in flight, queueing a pass after it",
            self.inner.scope
        );
        let mut completed = self.inner.completed.subscribe();
        let done = completed
            .wait_for(|(generation, _)| *generation >= target)
            .await
            .map(|done| done.1.clone());
        done.unwrap_or(Ok(Refreshed::Discarded))
    }

    /// Holds the running slot; loops while reruns are requested.
    async fn run(&self) -> Result<Refreshed, SyncError> {
        let inner = self.inner.as_ref();
        let mut running = Running {
            inner,
            released: false,
        };
        loop {
            let generation = {
                let mut state = inner.state();
                state.rerun = false;
                state.started += 1;
                state.started
            };
            let outcome = self.fetch_once().await;
            inner.completed.send_replace((generation, outcome.clone()));

            let mut state = inner.state();
            if !state.rerun || !inner.liveness.is_alive() {
                release(inner, &mut state);
                running.released = true;
                return outcome;
            }
        }
    }

    async fn fetch_once(&self) -> Result<Refreshed, SyncError> {
        let inner = &self.inner;
        let fetched = T::fetch(inner.api.as_ref(), &inner.scope).await;
        if !inner.liveness.is_alive() {
            log::debug!(
                target: "corkboard.sync.refresh",
                "Dropping refetch result for unmounted {}",
                inner.scope
            );
            return Ok(Refreshed::Discarded);
        }
        match fetched {
            Ok(value) => {
                let version = inner.store.replace(value);
                log::debug!(
                    target: "corkboard.sync.refresh",
                    "Replaced {} snapshot (version {})",
                    inner.scope,
                    version
                );
                Ok(Refreshed::Replaced(version))
            }
            Err(e) => {
                log::warn!(
                    target: "corkboard.sync.refresh",
                    "Refetch of {} failed: {}",
                    inner.scope,
                    e
                );
                Err(e)
            }
        }
    }

    /// Fire-and-forget refetch. Returns `None` when one is already running.
    pub fn trigger(&self) -> Option<JoinHandle<()>> {
        if self.is_in_flight() {
            log::debug!(
                target: "corkboard.sync.refresh",
                "Trigger for {} satisfied by running refetch",
                self.inner.scope
            );
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            // Failures are already logged; the next trigger retries.
            let _ = this.refresh().await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use crate::types::fixtures::*;

    fn setup(api: Arc<MockApi>) -> (Refresher<Board>, Arc<SnapshotStore<Board>>, Liveness) {
        let store = Arc::new(SnapshotStore::new());
        let liveness = Liveness::new();
        let refresher = Refresher::new(
            api,
            store.clone(),
            Scope::Board("b".into()),
            liveness.clone(),
        );
        (refresher, store, liveness)
    }

    #[tokio::test]
    async fn test_refresh_normalizes_and_publishes() {
        let mut server = board("b", vec![column("y", 1, &[]), column("x", 0, &["k2", "k1"])]);
        server.columns[1].cards[0].order = 1;
        server.columns[1].cards[1].order = 0;
        let api = MockApi::new(vec![server]);
        let (refresher, store, _) = setup(api);

        let outcome = refresher.refresh().await.unwrap();
        let snapshot = store.current();
        assert_eq!(outcome, Refreshed::Replaced(snapshot.version));
        assert_eq!(snapshot.data.columns[0].id, "x");
        assert_eq!(card_ids(&snapshot.data, "x"), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_overlapping_triggers_coalesce_into_one_fetch() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let gate = api.hold_fetches();
        let (refresher, store, _) = setup(api.clone());

        let first = refresher.trigger().expect("first trigger starts a fetch");
        tokio::task::yield_now().await;
        assert!(refresher.is_in_flight());
        assert!(refresher.trigger().is_none());
        assert_eq!(refresher.refresh().await.unwrap(), Refreshed::Coalesced);

        gate.add_permits(1);
        first.await.unwrap();
        assert_eq!(api.count("get_board"), 1);
        assert!(store.current().is_loaded());
        assert!(!refresher.is_in_flight());
    }

    #[tokio::test]
    async fn test_commit_refresh_waits_for_fetch_started_after_it() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let gate = api.hold_fetches();
        let (refresher, store, _) = setup(api.clone());

        // This fetch has already read the server when the edit commits.
        let stale = refresher.trigger().expect("trigger starts a fetch");
        tokio::task::yield_now().await;
        api.edit_server("b", |b| b.title = "Committed".into());
        gate.add_permits(2);

        let outcome = refresher.refresh_after_commit().await.unwrap();
        stale.await.unwrap();
        let snapshot = store.current();
        assert_eq!(outcome, Refreshed::Replaced(snapshot.version));
        assert_eq!(snapshot.data.title, "Committed");
        assert_eq!(api.count("get_board"), 2);
        assert!(!refresher.is_in_flight());
    }

    #[tokio::test]
    async fn test_commit_refresh_without_running_fetch_fetches_once() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let (refresher, store, _) = setup(api.clone());

        let outcome = refresher.refresh_after_commit().await.unwrap();
        assert_eq!(outcome, Refreshed::Replaced(store.current().version));
        assert_eq!(api.count("get_board"), 1);
    }

    #[tokio::test]
    async fn test_queued_pass_is_discarded_after_unmount() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let gate = api.hold_fetches();
        let (refresher, store, liveness) = setup(api.clone());

        let _running = refresher.trigger().expect("trigger starts a fetch");
        tokio::task::yield_now().await;
        let waiter = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.refresh_after_commit().await }
        });
        tokio::task::yield_now().await;
        liveness.kill();
        gate.add_permits(1);

        assert_eq!(waiter.await.unwrap().unwrap(), Refreshed::Discarded);
        assert_eq!(api.count("get_board"), 1);
        assert!(!store.current().is_loaded());
        assert!(!refresher.is_in_flight());
    }

    #[tokio::test]
    async fn test_late_result_is_discarded_after_unmount() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let gate = api.hold_fetches();
        let (refresher, store, liveness) = setup(api);

        let pending = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.refresh().await }
        });
        tokio::task::yield_now().await;
        liveness.kill();
        gate.add_permits(1);

        assert_eq!(pending.await.unwrap().unwrap(), Refreshed::Discarded);
        assert!(!store.current().is_loaded());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot_and_clears_guard() {
        let api = MockApi::new(vec![board("b", vec![])]);
        let (refresher, store, _) = setup(api.clone());
        refresher.refresh().await.unwrap();
        let before = store.current();

        api.fail_next("get_board", SyncError::NetworkUnavailable("offline".into()));
        assert!(refresher.refresh().await.is_err());
        assert_eq!(store.current().version, before.version);
        assert!(!refresher.is_in_flight());
    }

    #[tokio::test]
    async fn test_dashboard_fetch_lists_boards() {
        let api = MockApi::new(vec![board("1", vec![]), board("2", vec![])]);
        let store = Arc::new(SnapshotStore::<BoardList>::new());
        let refresher = Refresher::new(api, store.clone(), Scope::Dashboard, Liveness::new());
        refresher.refresh().await.unwrap();
        assert_eq!(store.current().data.len(), 2);
    }
}
