/// Optimistic mutation protocol.
///
/// Every mutation runs in three phases: patch the local snapshot right away,
/// await the remote call, then commit or reconcile according to the
/// operation's declared policy. Nothing is queued; concurrent mutations each
/// carry only their own patch.
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::api::ApiResult;
use crate::error::SyncError;
use crate::notice::Notices;
use crate::refresh::{Fetch, Liveness, Refresher};
use crate::store::{SnapshotStore, VersionedSnapshot};

const TARGET: &str = "corkboard.sync.mutation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnSuccess {
    /// The optimistic patch is the final state.
    TrustOptimistic,
    /// Server-side effects (sorting, coercion, renumbering) need a refetch.
    Refetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Restore the snapshot captured before the patch.
    Rollback,
    /// Partial server success is possible; ask the server.
    Refetch,
    /// Nothing was patched locally.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub on_success: OnSuccess,
    pub on_failure: OnFailure,
}

const fn policy(on_success: OnSuccess, on_failure: OnFailure) -> Policy {
    Policy {
        on_success,
        on_failure,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateBoard,
    CreateColumn,
    CreateCard,
    CreateLabel,
    RenameBoard,
    RecolorBoardTitle,
    RecolorBoardBackground,
    ToggleFavorite,
    DeleteBoard,
    DeleteBoards,
    UpdateColumn,
    DeleteColumn,
    MoveColumn,
    ReorderColumns,
    UpdateCard,
    ArchiveCard,
    UnarchiveCard,
    DeleteCard,
    MoveCard,
    ReorderCards,
    UpdateLabel,
    DeleteLabel,
}

impl MutationKind {
    pub const fn policy(self) -> Policy {
        use MutationKind::*;
        match self {
            CreateBoard | CreateColumn | CreateCard | CreateLabel => {
                policy(OnSuccess::Refetch, OnFailure::Report)
            }
            // The dashboard sorts by title and the server may coerce it.
            RenameBoard => policy(OnSuccess::Refetch, OnFailure::Refetch),
            RecolorBoardTitle | RecolorBoardBackground | ToggleFavorite => {
                policy(OnSuccess::TrustOptimistic, OnFailure::Rollback)
            }
            DeleteBoard | DeleteBoards => policy(OnSuccess::TrustOptimistic, OnFailure::Refetch),
            UpdateColumn | DeleteColumn => policy(OnSuccess::TrustOptimistic, OnFailure::Rollback),
            MoveColumn | MoveCard => policy(OnSuccess::TrustOptimistic, OnFailure::Refetch),
            ReorderColumns | ReorderCards => policy(OnSuccess::Refetch, OnFailure::Refetch),
            UpdateCard => policy(OnSuccess::Refetch, OnFailure::Rollback),
            ArchiveCard | UnarchiveCard | DeleteCard => {
                policy(OnSuccess::TrustOptimistic, OnFailure::Rollback)
            }
            UpdateLabel => policy(OnSuccess::TrustOptimistic, OnFailure::Rollback),
            DeleteLabel => policy(OnSuccess::Refetch, OnFailure::Refetch),
        }
    }
}

pub struct MutationCoordinator<T: Fetch> {
    store: Arc<SnapshotStore<T>>,
    refresher: Refresher<T>,
    notices: Notices,
    liveness: Liveness,
}

impl<T: Fetch> MutationCoordinator<T> {
    pub fn new(
        store: Arc<SnapshotStore<T>>,
        refresher: Refresher<T>,
        notices: Notices,
        liveness: Liveness,
    ) -> Self {
        Self {
            store,
            refresher,
            notices,
            liveness,
        }
    }

    /// Run one mutation. `call` is not polled until the optimistic patch has
    /// been published; a patch that cannot apply aborts without a remote
    /// call.
    pub async fn run<R, F>(
        &self,
        kind: MutationKind,
        patch: Option<T::Patch>,
        call: F,
    ) -> Result<R, SyncError>
    where
        F: Future<Output = ApiResult<R>>,
    {
        let captured = self.store.current();
        let applied = match &patch {
            Some(patch) => match self.store.apply(patch) {
                Ok(published) => Some(published.version),
                Err(e) => {
                    log::warn!(target: TARGET, "{:?}: local patch rejected: {}", kind, e);
                    return Err(e.into());
                }
            },
            None => None,
        };

        let policy = kind.policy();
        match call.await {
            Ok(value) => {
                if policy.on_success == OnSuccess::Refetch {
                    self.refetch(kind).await;
                }
                Ok(value)
            }
            Err(e) => {
                self.notices.report(TARGET, &format!("{:?} failed", kind), &e);
                match policy.on_failure {
                    OnFailure::Rollback => {
                        if let Some(applied) = applied {
                            self.rollback(kind, &captured, applied).await;
                        }
                    }
                    OnFailure::Report => {}
                    OnFailure::Refetch => self.refetch(kind).await,
                }
                Err(e)
            }
        }
    }

    /// Dispatch several calls concurrently under one local patch. Any failure
    /// reconciles through a single refetch; the first error is returned.
    pub async fn run_batch<F>(
        &self,
        kind: MutationKind,
        patch: Option<T::Patch>,
        calls: Vec<F>,
    ) -> Result<(), SyncError>
    where
        F: Future<Output = ApiResult<()>>,
    {
        if let Some(patch) = &patch {
            if let Err(e) = self.store.apply(patch) {
                log::warn!(target: TARGET, "{:?}: local patch rejected: {}", kind, e);
                return Err(e.into());
            }
        }

        let total = calls.len();
        let errors: Vec<SyncError> = join_all(calls)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        let Some(first) = errors.first().cloned() else {
            if kind.policy().on_success == OnSuccess::Refetch {
                self.refetch(kind).await;
            }
            return Ok(());
        };
        log::warn!(
            target: TARGET,
            "{:?}: {} of {} calls failed",
            kind,
            errors.len(),
            total
        );
        for e in &errors {
            self.notices.report(TARGET, &format!("{:?} failed", kind), e);
        }
        self.refetch(kind).await;
        Err(first)
    }

    /// Restore `captured` if our patch is still the newest one. Otherwise
    /// other patches were published on top of it and restoring would undo
    /// them, so the server state is fetched instead.
    async fn rollback(&self, kind: MutationKind, captured: &VersionedSnapshot<T>, applied: u64) {
        if !self.liveness.is_alive() {
            return;
        }
        let current = self.store.current().version;
        if current != applied {
            log::info!(
                target: TARGET,
                "{:?}: snapshot moved on to version {}, refetching instead of rolling back",
                kind,
                current
            );
            self.refetch(kind).await;
            return;
        }
        let version = self.store.restore(captured);
        log::info!(
            target: TARGET,
            "{:?}: rolled back to captured snapshot (version {})",
            kind,
            version
        );
    }

    async fn refetch(&self, kind: MutationKind) {
        if !self.liveness.is_alive() {
            return;
        }
        if let Err(e) = self.refresher.refresh_after_commit().await {
            log::warn!(target: TARGET, "{:?}: reconciling refetch failed: {}", kind, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BoardApi, Scope};
    use crate::notice::Notice;
    use crate::patch::{BoardFields, BoardListPatch, BoardPatch, ColumnFields};
    use crate::testing::MockApi;
    use crate::types::fixtures::*;
    use crate::types::{Board, BoardList};

    struct Fixture<T: Fetch> {
        api: Arc<MockApi>,
        store: Arc<SnapshotStore<T>>,
        coordinator: MutationCoordinator<T>,
        notices: Notices,
    }

    fn fixture<T: Fetch>(api: Arc<MockApi>, scope: Scope) -> Fixture<T> {
        let store = Arc::new(SnapshotStore::new());
        let liveness = Liveness::new();
        let notices = Notices::new();
        let refresher = Refresher::new(api.clone(), store.clone(), scope, liveness.clone());
        let coordinator =
            MutationCoordinator::new(store.clone(), refresher, notices.clone(), liveness);
        Fixture {
            api,
            store,
            coordinator,
            notices,
        }
    }

    async fn board_fixture() -> Fixture<Board> {
        let api = MockApi::new(vec![board("b", vec![column("x", 0, &["k1", "k2"]), column("y", 1, &[])])]);
        let f = fixture::<Board>(api, Scope::Board("b".into()));
        f.coordinator.refresher.refresh().await.unwrap();
        f
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(
            MutationKind::RenameBoard.policy(),
            policy(OnSuccess::Refetch, OnFailure::Refetch)
        );
        assert_eq!(
            MutationKind::ToggleFavorite.policy(),
            policy(OnSuccess::TrustOptimistic, OnFailure::Rollback)
        );
        assert_eq!(MutationKind::MoveCard.policy().on_failure, OnFailure::Refetch);
        assert_eq!(MutationKind::UpdateCard.policy().on_success, OnSuccess::Refetch);
        assert_eq!(MutationKind::CreateCard.policy().on_failure, OnFailure::Report);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_exactly() {
        let f = board_fixture().await;
        let before = f.store.current();
        f.api.fail_next(
            "update_column",
            SyncError::ValidationRejected {
                status: 400,
                message: "too long".into(),
            },
        );

        let update = crate::api::ColumnUpdate {
            title: "Renamed".into(),
            title_color: None,
            header_color: None,
        };
        let result = f
            .coordinator
            .run(
                MutationKind::UpdateColumn,
                Some(BoardPatch::UpdateColumn {
                    column_id: "x".into(),
                    fields: ColumnFields {
                        title: Some("Renamed".into()),
                        ..Default::default()
                    },
                }),
                f.api.update_column("b", "x", &update),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(*f.store.current().data, *before.data);
        assert_eq!(f.api.count("get_board"), 1);
    }

    #[tokio::test]
    async fn test_failed_patch_does_not_undo_a_later_one() {
        let f = board_fixture().await;
        let failing = async {
            tokio::task::yield_now().await;
            Err::<(), _>(SyncError::ValidationRejected {
                status: 400,
                message: "nope".into(),
            })
        };
        let favorite = f.coordinator.run(
            MutationKind::ToggleFavorite,
            Some(BoardPatch::UpdateBoard(BoardFields {
                is_favorite: Some(true),
                ..Default::default()
            })),
            failing,
        );
        let recolor = f.coordinator.run(
            MutationKind::RecolorBoardTitle,
            Some(BoardPatch::UpdateBoard(BoardFields {
                title_color: Some("red".into()),
                ..Default::default()
            })),
            f.api.update_board_title_color("b", "red"),
        );

        let (favorite, recolor) = tokio::join!(favorite, recolor);
        assert!(favorite.is_err());
        recolor.unwrap();

        let board = f.store.current().data;
        assert_eq!(board.title_color.as_deref(), Some("red"));
        assert!(!board.is_favorite);
        assert_eq!(f.api.count("get_board"), 2);
    }

    #[tokio::test]
    async fn test_patch_is_visible_before_remote_call_runs() {
        let f = board_fixture().await;
        let store = f.store.clone();
        let call = async move {
            assert!(store.current().data.card("k1").is_none());
            Ok::<(), SyncError>(())
        };
        f.coordinator
            .run(
                MutationKind::DeleteCard,
                Some(BoardPatch::RemoveCard {
                    card_id: "k1".into(),
                }),
                call,
            )
            .await
            .unwrap();
        assert_eq!(card_ids(&f.store.current().data, "x"), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_unknown_target_aborts_without_remote_call() {
        let f = board_fixture().await;
        let result = f
            .coordinator
            .run(
                MutationKind::DeleteCard,
                Some(BoardPatch::RemoveCard {
                    card_id: "ghost".into(),
                }),
                f.api.delete_card("b", "ghost"),
            )
            .await;
        assert!(matches!(result, Err(SyncError::Patch(_))));
        assert_eq!(f.api.count("delete_card"), 0);
    }

    #[tokio::test]
    async fn test_move_failure_refetches_and_rate_limit_notifies() {
        let f = board_fixture().await;
        let mut notices = f.notices.subscribe();
        f.api.fail_next("move_card", SyncError::RateLimited);

        let result = f
            .coordinator
            .run(
                MutationKind::MoveCard,
                Some(BoardPatch::MoveCard {
                    card_id: "k1".into(),
                    target_column_id: "y".into(),
                    index: 0,
                }),
                f.api.move_card("b", "k1", "y", 0),
            )
            .await;

        assert_eq!(result.unwrap_err(), SyncError::RateLimited);
        assert_eq!(notices.try_recv().unwrap(), Notice::RateLimited);
        assert_eq!(f.api.count("get_board"), 2);
        assert_eq!(card_ids(&f.store.current().data, "x"), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_rename_refetches_server_title() {
        let f = board_fixture().await;
        f.coordinator
            .run(
                MutationKind::RenameBoard,
                Some(BoardPatch::UpdateBoard(BoardFields {
                    title: Some("Local".into()),
                    ..Default::default()
                })),
                async {
                    f.api.update_board_title("b", "Local").await?;
                    // Server-side coercion.
                    f.api.edit_server("b", |b| b.title = "LOCAL".into());
                    Ok::<(), SyncError>(())
                },
            )
            .await
            .unwrap();
        assert_eq!(f.store.current().data.title, "LOCAL");
    }

    #[tokio::test]
    async fn test_batch_delete_with_one_failure_refetches() {
        let api = MockApi::new(vec![board("1", vec![]), board("2", vec![]), board("3", vec![])]);
        let f = fixture::<BoardList>(api, Scope::Dashboard);
        f.coordinator.refresher.refresh().await.unwrap();
        f.api.fail_next("delete_board", SyncError::ServiceUnavailable);

        let ids = vec!["1".to_string(), "3".to_string()];
        let calls = ids.iter().map(|id| f.api.delete_board(id)).collect();
        let result = f
            .coordinator
            .run_batch(
                MutationKind::DeleteBoards,
                Some(BoardListPatch::RemoveBoards {
                    board_ids: ids.clone(),
                }),
                calls,
            )
            .await;

        assert_eq!(result.unwrap_err(), SyncError::ServiceUnavailable);
        assert_eq!(f.api.count("delete_board"), 2);
        assert_eq!(f.api.count("get_boards"), 2);
        // Board "1" failed server-side and comes back with the refetch.
        let ids: Vec<String> = f.store.current().data.0.iter().map(|b| b.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_batch_delete_success_trusts_patch() {
        let api = MockApi::new(vec![board("1", vec![]), board("2", vec![])]);
        let f = fixture::<BoardList>(api, Scope::Dashboard);
        f.coordinator.refresher.refresh().await.unwrap();

        let calls = vec![f.api.delete_board("1"), f.api.delete_board("2")];
        f.coordinator
            .run_batch(
                MutationKind::DeleteBoards,
                Some(BoardListPatch::RemoveBoards {
                    board_ids: vec!["1".into(), "2".into()],
                }),
                calls,
            )
            .await
            .unwrap();
        assert!(f.store.current().data.is_empty());
        assert_eq!(f.api.count("get_boards"), 1);
    }
}
