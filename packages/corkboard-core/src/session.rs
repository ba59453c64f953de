/// Per-view wiring: one store, one refresher, one coordinator and one push
/// subscription for the dashboard or for a single board.
///
/// A session is created unmounted. `mount` performs the initial fetch and
/// opens the push channel; `unmount` (or dropping the session) flips the
/// liveness flag and stops the channel task. In-flight requests keep running,
/// their results are dropped. A session mounts once.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::api::{BoardApi, CardDraft, ColumnUpdate, LabelDraft, NewBoard, NewColumn, Scope};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::drag::{ActiveDrag, DragController, DragPayload, DropTarget, MoveIntent};
use crate::error::{PatchError, SyncError};
use crate::filter::{self, BoardFilter, SortDirection};
use crate::mutation::{MutationCoordinator, MutationKind};
use crate::notice::{Notice, Notices};
use crate::order::BulkReorder;
use crate::patch::{BoardFields, BoardListPatch, BoardPatch, CardFields, ColumnFields, LabelFields};
use crate::realtime::{ListenerHandle, PushTransport, RealtimeListener};
use crate::refresh::{Fetch, Liveness, Refreshed, Refresher};
use crate::store::{SnapshotStore, VersionedSnapshot};
use crate::types::{Board, BoardList, Label};

const TARGET: &str = "corkboard.session";

/// Blank titles fall back to `default`; others are trimmed.
fn coerce_title(title: &str, default: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

struct View<T: Fetch> {
    api: Arc<dyn BoardApi>,
    store: Arc<SnapshotStore<T>>,
    refresher: Refresher<T>,
    coordinator: MutationCoordinator<T>,
    notices: Notices,
    liveness: Liveness,
    reconnect: ReconnectPolicy,
    listener: Option<ListenerHandle>,
}

impl<T: Fetch> View<T> {
    fn new(api: Arc<dyn BoardApi>, scope: Scope, config: &ClientConfig) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let liveness = Liveness::new();
        let notices = Notices::new();
        let refresher = Refresher::new(api.clone(), store.clone(), scope, liveness.clone());
        let coordinator = MutationCoordinator::new(
            store.clone(),
            refresher.clone(),
            notices.clone(),
            liveness.clone(),
        );
        Self {
            api,
            store,
            refresher,
            coordinator,
            notices,
            liveness,
            reconnect: config.reconnect_policy(),
            listener: None,
        }
    }

    async fn mount(&mut self, transport: Option<Arc<dyn PushTransport>>) -> Result<(), SyncError> {
        let scope = self.refresher.scope().clone();
        if !self.liveness.is_alive() {
            return Err(SyncError::Unmounted);
        }
        if let Err(e) = self.refresher.refresh().await {
            self.notices.report(TARGET, &format!("Initial fetch of {}", scope), &e);
            return Err(e);
        }
        if let Some(transport) = transport {
            let listener = RealtimeListener::new(
                transport,
                self.refresher.clone(),
                self.reconnect.clone(),
                self.notices.clone(),
                self.liveness.clone(),
            );
            if let Some(previous) = self.listener.replace(listener.spawn()) {
                previous.stop();
            }
        }
        log::info!(target: TARGET, "Mounted {}", scope);
        Ok(())
    }

    fn unmount(&mut self) {
        if self.teardown() {
            log::info!(target: TARGET, "Unmounted {}", self.refresher.scope());
        }
    }

    /// Kill the view and stop its listener. False if it was already dead.
    fn teardown(&mut self) -> bool {
        let was_alive = self.liveness.is_alive();
        self.liveness.kill();
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        was_alive
    }

    fn is_mounted(&self) -> bool {
        self.liveness.is_alive() && self.store.current().is_loaded()
    }
}

impl<T: Fetch> Drop for View<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Board view: columns, cards, labels and the drag gesture.
pub struct BoardSession {
    board_id: String,
    config: ClientConfig,
    view: View<Board>,
    drag: DragController,
}

impl BoardSession {
    pub fn new(api: Arc<dyn BoardApi>, board_id: &str, config: &ClientConfig) -> Self {
        Self {
            board_id: board_id.to_string(),
            config: config.clone(),
            view: View::new(api, Scope::Board(board_id.to_string()), config),
            drag: DragController::new(&config.completion_marker),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub async fn mount(&mut self, transport: Option<Arc<dyn PushTransport>>) -> Result<(), SyncError> {
        self.view.mount(transport).await
    }

    pub fn unmount(&mut self) {
        self.drag.cancel();
        self.view.unmount();
    }

    pub fn is_mounted(&self) -> bool {
        self.view.is_mounted()
    }

    pub fn snapshot(&self) -> VersionedSnapshot<Board> {
        self.view.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<VersionedSnapshot<Board>> {
        self.view.store.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.view.notices.subscribe()
    }

    pub async fn refresh(&self) -> Result<Refreshed, SyncError> {
        self.view.refresher.refresh().await
    }

    /// Cards passing `filter`, every column kept.
    pub fn visible(&self, filter: &BoardFilter) -> Board {
        filter::project(&self.snapshot().data, filter)
    }

    // Board fields

    pub async fn rename(&self, title: &str) -> Result<(), SyncError> {
        let title = coerce_title(title, &self.config.default_board_title);
        let patch = BoardPatch::UpdateBoard(BoardFields {
            title: Some(title.clone()),
            ..Default::default()
        });
        let call = self.view.api.update_board_title(&self.board_id, &title);
        self.view.coordinator.run(MutationKind::RenameBoard, Some(patch), call).await
    }

    pub async fn set_title_color(&self, color: &str) -> Result<(), SyncError> {
        let patch = BoardPatch::UpdateBoard(BoardFields {
            title_color: Some(color.to_string()),
            ..Default::default()
        });
        let call = self.view.api.update_board_title_color(&self.board_id, color);
        self.view
            .coordinator
            .run(MutationKind::RecolorBoardTitle, Some(patch), call)
            .await
    }

    pub async fn set_background_color(&self, color: &str) -> Result<(), SyncError> {
        let patch = BoardPatch::UpdateBoard(BoardFields {
            background_color: Some(color.to_string()),
            ..Default::default()
        });
        let call = self.view.api.update_board_background_color(&self.board_id, color);
        self.view
            .coordinator
            .run(MutationKind::RecolorBoardBackground, Some(patch), call)
            .await
    }

    /// Returns the new favorite state.
    pub async fn toggle_favorite(&self) -> Result<bool, SyncError> {
        let favorite = !self.snapshot().data.is_favorite;
        let patch = BoardPatch::UpdateBoard(BoardFields {
            is_favorite: Some(favorite),
            ..Default::default()
        });
        let call = self.view.api.toggle_favorite(&self.board_id);
        self.view
            .coordinator
            .run(MutationKind::ToggleFavorite, Some(patch), call)
            .await?;
        Ok(favorite)
    }

    // Columns

    pub async fn create_column(&self, title: &str, header_color: Option<String>) -> Result<(), SyncError> {
        let column = NewColumn {
            title: coerce_title(title, &self.config.default_column_title),
            header_color,
        };
        let call = self.view.api.create_column(&self.board_id, &column);
        self.view.coordinator.run(MutationKind::CreateColumn, None, call).await
    }

    pub async fn update_column(&self, column_id: &str, update: ColumnUpdate) -> Result<(), SyncError> {
        let update = ColumnUpdate {
            title: coerce_title(&update.title, &self.config.default_column_title),
            ..update
        };
        let patch = BoardPatch::UpdateColumn {
            column_id: column_id.to_string(),
            fields: ColumnFields {
                title: Some(update.title.clone()),
                title_color: update.title_color.clone(),
                header_color: update.header_color.clone(),
            },
        };
        let call = self.view.api.update_column(&self.board_id, column_id, &update);
        self.view
            .coordinator
            .run(MutationKind::UpdateColumn, Some(patch), call)
            .await
    }

    pub async fn delete_column(&self, column_id: &str) -> Result<(), SyncError> {
        let patch = BoardPatch::RemoveColumn {
            column_id: column_id.to_string(),
        };
        let call = self.view.api.delete_column(&self.board_id, column_id);
        self.view
            .coordinator
            .run(MutationKind::DeleteColumn, Some(patch), call)
            .await
    }

    pub async fn move_column(&self, column_id: &str, to: usize) -> Result<(), SyncError> {
        let patch = BoardPatch::MoveColumn {
            column_id: column_id.to_string(),
            to,
        };
        let new_order = u32::try_from(to).unwrap_or(u32::MAX);
        let call = self.view.api.move_column(&self.board_id, column_id, new_order);
        self.view
            .coordinator
            .run(MutationKind::MoveColumn, Some(patch), call)
            .await
    }

    /// Manual reorder from 1-based positions. Out-of-range positions are
    /// clamped and unknown ids dropped.
    pub async fn reorder_columns(&self, requested: &HashMap<String, i64>) -> Result<(), SyncError> {
        let reorder = BulkReorder::columns(&self.snapshot().data, requested);
        if reorder.is_empty() {
            return Ok(());
        }
        let patch = BoardPatch::ReorderColumns(reorder.positions.clone());
        let call = self.view.api.bulk_move_columns(&self.board_id, &reorder.positions);
        self.view
            .coordinator
            .run(MutationKind::ReorderColumns, Some(patch), call)
            .await
    }

    // Cards

    pub async fn create_card(&self, column_id: &str, draft: CardDraft) -> Result<(), SyncError> {
        let draft = CardDraft {
            title: coerce_title(&draft.title, &self.config.default_card_title),
            ..draft
        };
        let call = self.view.api.create_card(&self.board_id, column_id, &draft);
        self.view.coordinator.run(MutationKind::CreateCard, None, call).await
    }

    pub async fn update_card(&self, card_id: &str, draft: CardDraft) -> Result<(), SyncError> {
        let draft = CardDraft {
            title: coerce_title(&draft.title, &self.config.default_card_title),
            ..draft
        };
        let patch = BoardPatch::UpdateCard {
            card_id: card_id.to_string(),
            fields: CardFields {
                title: Some(draft.title.clone()),
                description: Some(draft.description.clone()),
                label_ids: Some(draft.label_ids.clone()),
                is_archived: None,
            },
        };
        let call = self.view.api.update_card(&self.board_id, card_id, &draft);
        self.view
            .coordinator
            .run(MutationKind::UpdateCard, Some(patch), call)
            .await
    }

    fn archive_patch(card_id: &str, archived: bool) -> BoardPatch {
        BoardPatch::UpdateCard {
            card_id: card_id.to_string(),
            fields: CardFields {
                is_archived: Some(archived),
                ..Default::default()
            },
        }
    }

    pub async fn archive_card(&self, card_id: &str) -> Result<(), SyncError> {
        let call = self.view.api.archive_card(&self.board_id, card_id);
        self.view
            .coordinator
            .run(
                MutationKind::ArchiveCard,
                Some(Self::archive_patch(card_id, true)),
                call,
            )
            .await
    }

    pub async fn unarchive_card(&self, card_id: &str) -> Result<(), SyncError> {
        let call = self.view.api.unarchive_card(&self.board_id, card_id);
        self.view
            .coordinator
            .run(
                MutationKind::UnarchiveCard,
                Some(Self::archive_patch(card_id, false)),
                call,
            )
            .await
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<(), SyncError> {
        let patch = BoardPatch::RemoveCard {
            card_id: card_id.to_string(),
        };
        let call = self.view.api.delete_card(&self.board_id, card_id);
        self.view
            .coordinator
            .run(MutationKind::DeleteCard, Some(patch), call)
            .await
    }

    /// `index` is a slot in the target column's full card list, archived
    /// cards included.
    pub async fn move_card(
        &self,
        card_id: &str,
        target_column_id: &str,
        index: usize,
    ) -> Result<(), SyncError> {
        let patch = BoardPatch::MoveCard {
            card_id: card_id.to_string(),
            target_column_id: target_column_id.to_string(),
            index,
        };
        let new_order = u32::try_from(index).unwrap_or(u32::MAX);
        let call = self
            .view
            .api
            .move_card(&self.board_id, card_id, target_column_id, new_order);
        self.view
            .coordinator
            .run(MutationKind::MoveCard, Some(patch), call)
            .await
    }

    pub async fn reorder_cards(&self, requested: &HashMap<String, i64>) -> Result<(), SyncError> {
        let reorder = BulkReorder::cards(&self.snapshot().data, requested);
        if reorder.is_empty() {
            return Ok(());
        }
        let patch = BoardPatch::ReorderCards(reorder.positions.clone());
        let call = self.view.api.bulk_move_cards(&self.board_id, &reorder.positions);
        self.view
            .coordinator
            .run(MutationKind::ReorderCards, Some(patch), call)
            .await
    }

    // Labels

    pub async fn create_label(&self, draft: LabelDraft) -> Result<Label, SyncError> {
        let call = self.view.api.create_label(&self.board_id, &draft);
        self.view.coordinator.run(MutationKind::CreateLabel, None, call).await
    }

    pub async fn update_label(&self, label_id: &str, draft: LabelDraft) -> Result<(), SyncError> {
        let patch = BoardPatch::UpdateLabel {
            label_id: label_id.to_string(),
            fields: LabelFields {
                name: Some(draft.name.clone()),
                color: Some(draft.color.clone()),
                text_color: Some(draft.text_color.clone()),
            },
        };
        let call = self.view.api.update_label(&self.board_id, label_id, &draft);
        self.view
            .coordinator
            .run(MutationKind::UpdateLabel, Some(patch), call)
            .await
    }

    pub async fn delete_label(&self, label_id: &str) -> Result<(), SyncError> {
        let patch = BoardPatch::RemoveLabel {
            label_id: label_id.to_string(),
        };
        let call = self.view.api.delete_label(&self.board_id, label_id);
        self.view
            .coordinator
            .run(MutationKind::DeleteLabel, Some(patch), call)
            .await
    }

    // Drag gesture

    pub fn start_drag(&mut self, payload: DragPayload) -> bool {
        let board = self.snapshot();
        self.drag.start(payload, &board.data)
    }

    pub fn hover_drag(&mut self, target: Option<&DropTarget>) {
        let board = self.snapshot();
        self.drag.hover(target, &board.data);
    }

    pub fn active_drag(&self) -> Option<&ActiveDrag> {
        self.drag.active()
    }

    /// End the gesture and commit the resulting move, if any. The intent is
    /// returned even when the remote call fails (the board has been
    /// refetched by then).
    pub async fn end_drag(
        &mut self,
        target: Option<&DropTarget>,
    ) -> (Option<MoveIntent>, Result<(), SyncError>) {
        let board = self.snapshot();
        let Some(intent) = self.drag.end(target, &board.data) else {
            return (None, Ok(()));
        };
        let result = match &intent {
            MoveIntent::Column { column_id, to, .. } => self.move_column(column_id, *to).await,
            MoveIntent::Card {
                card_id,
                target_column_id,
                index,
                ..
            } => self.move_card(card_id, target_column_id, *index).await,
        };
        (Some(intent), result)
    }
}

/// Dashboard view: the list of boards.
pub struct DashboardSession {
    config: ClientConfig,
    view: View<BoardList>,
}

impl DashboardSession {
    pub fn new(api: Arc<dyn BoardApi>, config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            view: View::new(api, Scope::Dashboard, config),
        }
    }

    pub async fn mount(&mut self, transport: Option<Arc<dyn PushTransport>>) -> Result<(), SyncError> {
        self.view.mount(transport).await
    }

    pub fn unmount(&mut self) {
        self.view.unmount();
    }

    pub fn is_mounted(&self) -> bool {
        self.view.is_mounted()
    }

    pub fn snapshot(&self) -> VersionedSnapshot<BoardList> {
        self.view.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<VersionedSnapshot<BoardList>> {
        self.view.store.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.view.notices.subscribe()
    }

    pub async fn refresh(&self) -> Result<Refreshed, SyncError> {
        self.view.refresher.refresh().await
    }

    /// Boards in display order: favorites first, then by title.
    pub fn sorted(&self, direction: SortDirection) -> Vec<Board> {
        let snapshot = self.snapshot();
        filter::dashboard_view(&snapshot.data.0, direction)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Returns the id assigned by the store.
    pub async fn create_board(
        &self,
        title: &str,
        background_image: Option<String>,
    ) -> Result<String, SyncError> {
        let board = NewBoard {
            title: coerce_title(title, &self.config.default_board_title),
            background_image,
        };
        let call = self.view.api.create_board(&board);
        self.view.coordinator.run(MutationKind::CreateBoard, None, call).await
    }

    pub async fn rename_board(&self, board_id: &str, title: &str) -> Result<(), SyncError> {
        let title = coerce_title(title, &self.config.default_board_title);
        let patch = BoardListPatch::UpdateBoard {
            board_id: board_id.to_string(),
            fields: BoardFields {
                title: Some(title.clone()),
                ..Default::default()
            },
        };
        let call = self.view.api.update_board_title(board_id, &title);
        self.view
            .coordinator
            .run(MutationKind::RenameBoard, Some(patch), call)
            .await
    }

    /// Returns the new favorite state.
    pub async fn toggle_favorite(&self, board_id: &str) -> Result<bool, SyncError> {
        let favorite = match self.snapshot().data.get(board_id) {
            Some(board) => !board.is_favorite,
            None => return Err(PatchError::UnknownBoard(board_id.to_string()).into()),
        };
        let patch = BoardListPatch::UpdateBoard {
            board_id: board_id.to_string(),
            fields: BoardFields {
                is_favorite: Some(favorite),
                ..Default::default()
            },
        };
        let call = self.view.api.toggle_favorite(board_id);
        self.view
            .coordinator
            .run(MutationKind::ToggleFavorite, Some(patch), call)
            .await?;
        Ok(favorite)
    }

    pub async fn delete_board(&self, board_id: &str) -> Result<(), SyncError> {
        let patch = BoardListPatch::RemoveBoards {
            board_ids: vec![board_id.to_string()],
        };
        let call = self.view.api.delete_board(board_id);
        self.view
            .coordinator
            .run(MutationKind::DeleteBoard, Some(patch), call)
            .await
    }

    /// Delete several boards concurrently; any failure refetches the list.
    pub async fn delete_boards(&self, board_ids: &[String]) -> Result<(), SyncError> {
        if board_ids.is_empty() {
            return Ok(());
        }
        let patch = BoardListPatch::RemoveBoards {
            board_ids: board_ids.to_vec(),
        };
        let calls = board_ids
            .iter()
            .map(|id| self.view.api.delete_board(id))
            .collect();
        self.view
            .coordinator
            .run_batch(MutationKind::DeleteBoards, Some(patch), calls)
            .await
    }
}
