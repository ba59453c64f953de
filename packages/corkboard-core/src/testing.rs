//! In-memory collaborators for engine tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiResult, BoardApi, CardDraft, ColumnUpdate, LabelDraft, NewBoard, NewColumn, Scope};
use crate::error::SyncError;
use crate::patch::{BoardPatch, CardFields, ColumnFields, LabelFields};
use crate::hub::PushEvent;
use crate::realtime::{PushConnection, PushTransport};
use crate::store::Snapshot;
use crate::types::{Board, Card, Column, Label};

/// Scripted remote store. Mutations change the server copy unless a failure
/// is queued for that operation; every call is recorded as `"op args"`.
#[derive(Default)]
pub struct MockApi {
    boards: Mutex<Vec<Board>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<SyncError>>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    next_id: AtomicU64,
}

impl MockApi {
    pub fn new(boards: Vec<Board>) -> Arc<Self> {
        Arc::new(Self {
            boards: Mutex::new(boards),
            ..Default::default()
        })
    }

    pub fn fail_next(&self, op: &'static str, err: SyncError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Make fetch responses wait for a permit on the returned semaphore. The
    /// response reflects server state at request time.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get_board"))
            .collect()
    }

    pub fn server_board(&self, board_id: &str) -> Option<Board> {
        self.boards.lock().unwrap().iter().find(|b| b.id == board_id).cloned()
    }

    pub fn edit_server(&self, board_id: &str, edit: impl FnOnce(&mut Board)) {
        if let Some(board) = self.boards.lock().unwrap().iter_mut().find(|b| b.id == board_id) {
            edit(board);
        }
    }

    fn record(&self, op: &'static str, args: String) -> ApiResult<()> {
        let line = if args.is_empty() {
            op.to_string()
        } else {
            format!("{} {}", op, args)
        };
        self.calls.lock().unwrap().push(line);
        match self.failures.lock().unwrap().get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        let gate = self.fetch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn patch_server(&self, board_id: &str, patch: BoardPatch) {
        self.edit_server(board_id, |board| {
            let _ = board.apply(&patch);
        });
    }

    fn new_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl BoardApi for MockApi {
    async fn get_boards(&self) -> ApiResult<Vec<Board>> {
        self.record("get_boards", String::new())?;
        let boards = self.boards.lock().unwrap().clone();
        self.pass_gate().await;
        Ok(boards)
    }

    async fn get_board(&self, board_id: &str) -> ApiResult<Board> {
        self.record("get_board", board_id.to_string())?;
        // The server answers now; the gate only delays delivery.
        let board = self.server_board(board_id);
        self.pass_gate().await;
        board.ok_or_else(|| SyncError::ValidationRejected {
            status: 404,
            message: "Board not found".into(),
        })
    }

    async fn create_board(&self, board: &NewBoard) -> ApiResult<String> {
        self.record("create_board", board.title.clone())?;
        let id = self.new_id();
        self.boards.lock().unwrap().push(Board {
            id: id.clone(),
            title: board.title.clone(),
            background_image: board.background_image.clone(),
            ..Board::default()
        });
        Ok(id)
    }

    async fn update_board_title(&self, board_id: &str, title: &str) -> ApiResult<()> {
        self.record("update_board_title", format!("{} {}", board_id, title))?;
        self.edit_server(board_id, |b| b.title = title.to_string());
        Ok(())
    }

    async fn update_board_title_color(&self, board_id: &str, color: &str) -> ApiResult<()> {
        self.record("update_board_title_color", format!("{} {}", board_id, color))?;
        self.edit_server(board_id, |b| b.title_color = Some(color.to_string()));
        Ok(())
    }

    async fn update_board_background_color(&self, board_id: &str, color: &str) -> ApiResult<()> {
        self.record("update_board_background_color", format!("{} {}", board_id, color))?;
        self.edit_server(board_id, |b| b.background_color = Some(color.to_string()));
        Ok(())
    }

    async fn toggle_favorite(&self, board_id: &str) -> ApiResult<()> {
        self.record("toggle_favorite", board_id.to_string())?;
        self.edit_server(board_id, |b| b.is_favorite = !b.is_favorite);
        Ok(())
    }

    async fn delete_board(&self, board_id: &str) -> ApiResult<()> {
        self.record("delete_board", board_id.to_string())?;
        self.boards.lock().unwrap().retain(|b| b.id != board_id);
        Ok(())
    }

    async fn create_column(&self, board_id: &str, column: &NewColumn) -> ApiResult<()> {
        self.record("create_column", format!("{} {}", board_id, column.title))?;
        let id = self.new_id();
        self.edit_server(board_id, |b| {
            b.columns.push(Column {
                id,
                title: column.title.clone(),
                header_color: column.header_color.clone(),
                order: b.columns.len() as i32,
                ..Column::default()
            })
        });
        Ok(())
    }

    async fn update_column(
        &self,
        board_id: &str,
        column_id: &str,
        update: &ColumnUpdate,
    ) -> ApiResult<()> {
        self.record("update_column", format!("{} {}", column_id, update.title))?;
        self.patch_server(
            board_id,
            BoardPatch::UpdateColumn {
                column_id: column_id.to_string(),
                fields: ColumnFields {
                    title: Some(update.title.clone()),
                    title_color: update.title_color.clone(),
                    header_color: update.header_color.clone(),
                },
            },
        );
        Ok(())
    }

    async fn delete_column(&self, board_id: &str, column_id: &str) -> ApiResult<()> {
        self.record("delete_column", column_id.to_string())?;
        self.patch_server(
            board_id,
            BoardPatch::RemoveColumn {
                column_id: column_id.to_string(),
            },
        );
        Ok(())
    }

    async fn move_column(&self, board_id: &str, column_id: &str, new_order: u32) -> ApiResult<()> {
        self.record("move_column", format!("{} {}", column_id, new_order))?;
        self.patch_server(
            board_id,
            BoardPatch::MoveColumn {
                column_id: column_id.to_string(),
                to: new_order as usize,
            },
        );
        Ok(())
    }

    async fn bulk_move_columns(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()> {
        self.record("bulk_move_columns", format!("{:?}", positions))?;
        self.patch_server(board_id, BoardPatch::ReorderColumns(positions.clone()));
        Ok(())
    }

    async fn create_card(&self, board_id: &str, column_id: &str, card: &CardDraft) -> ApiResult<()> {
        self.record("create_card", format!("{} {}", column_id, card.title))?;
        let card = Card {
            id: self.new_id(),
            title: card.title.clone(),
            description: card.description.clone(),
            column_id: column_id.to_string(),
            label_ids: card.label_ids.clone(),
            ..Card::default()
        };
        self.patch_server(
            board_id,
            BoardPatch::InsertCard {
                card,
                index: usize::MAX,
            },
        );
        Ok(())
    }

    async fn update_card(&self, board_id: &str, card_id: &str, card: &CardDraft) -> ApiResult<()> {
        self.record("update_card", format!("{} {}", card_id, card.title))?;
        self.patch_server(
            board_id,
            BoardPatch::UpdateCard {
                card_id: card_id.to_string(),
                fields: CardFields {
                    title: Some(card.title.clone()),
                    description: Some(card.description.clone()),
                    label_ids: Some(card.label_ids.clone()),
                    is_archived: None,
                },
            },
        );
        Ok(())
    }

    async fn archive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        self.record("archive_card", card_id.to_string())?;
        self.patch_server(board_id, archived(card_id, true));
        Ok(())
    }

    async fn unarchive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        self.record("unarchive_card", card_id.to_string())?;
        self.patch_server(board_id, archived(card_id, false));
        Ok(())
    }

    async fn delete_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        self.record("delete_card", card_id.to_string())?;
        self.patch_server(
            board_id,
            BoardPatch::RemoveCard {
                card_id: card_id.to_string(),
            },
        );
        Ok(())
    }

    async fn move_card(
        &self,
        board_id: &str,
        card_id: &str,
        target_column_id: &str,
        new_order: u32,
    ) -> ApiResult<()> {
        self.record(
            "move_card",
            format!("{} {} {}", card_id, target_column_id, new_order),
        )?;
        self.patch_server(
            board_id,
            BoardPatch::MoveCard {
                card_id: card_id.to_string(),
                target_column_id: target_column_id.to_string(),
                index: new_order as usize,
            },
        );
        Ok(())
    }

    async fn bulk_move_cards(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()> {
        self.record("bulk_move_cards", format!("{:?}", positions))?;
        self.patch_server(board_id, BoardPatch::ReorderCards(positions.clone()));
        Ok(())
    }

    async fn create_label(&self, board_id: &str, label: &LabelDraft) -> ApiResult<Label> {
        self.record("create_label", label.name.clone())?;
        let created = Label {
            id: self.new_id(),
            name: label.name.clone(),
            color: label.color.clone(),
            text_color: label.text_color.clone(),
            board_id: board_id.to_string(),
        };
        self.patch_server(board_id, BoardPatch::InsertLabel(created.clone()));
        Ok(created)
    }

    async fn update_label(&self, board_id: &str, label_id: &str, label: &LabelDraft) -> ApiResult<()> {
        self.record("update_label", format!("{} {}", label_id, label.name))?;
        self.patch_server(
            board_id,
            BoardPatch::UpdateLabel {
                label_id: label_id.to_string(),
                fields: LabelFields {
                    name: Some(label.name.clone()),
                    color: Some(label.color.clone()),
                    text_color: Some(label.text_color.clone()),
                },
            },
        );
        Ok(())
    }

    async fn delete_label(&self, board_id: &str, label_id: &str) -> ApiResult<()> {
        self.record("delete_label", label_id.to_string())?;
        self.patch_server(
            board_id,
            BoardPatch::RemoveLabel {
                label_id: label_id.to_string(),
            },
        );
        Ok(())
    }
}

fn archived(card_id: &str, flag: bool) -> BoardPatch {
    BoardPatch::UpdateCard {
        card_id: card_id.to_string(),
        fields: CardFields {
            is_archived: Some(flag),
            ..Default::default()
        },
    }
}

/// One scripted connection attempt.
pub enum Script {
    Refuse(SyncError),
    /// Deliver the items in order, then close cleanly.
    Deliver(Vec<Result<PushEvent, SyncError>>),
    /// Deliver the items, then stay open.
    Hold(Vec<Result<PushEvent, SyncError>>),
}

/// Push transport that plays back one `Script` per connect attempt and
/// refuses once the scripts run out.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Instants of every connect attempt.
    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.times.lock().unwrap().clone()
    }
}

struct ScriptedConnection {
    items: VecDeque<Result<PushEvent, SyncError>>,
    hold: bool,
}

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn next_event(&mut self) -> Result<Option<PushEvent>, SyncError> {
        match self.items.pop_front() {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(err)) => Err(err),
            None if self.hold => std::future::pending().await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(&self, _scope: &Scope) -> Result<Box<dyn PushConnection>, SyncError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.times.lock().unwrap().push(tokio::time::Instant::now());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Refuse(err)) => Err(err),
            Some(Script::Deliver(items)) => Ok(Box::new(ScriptedConnection {
                items: items.into(),
                hold: false,
            })),
            Some(Script::Hold(items)) => Ok(Box::new(ScriptedConnection {
                items: items.into(),
                hold: true,
            })),
            None => Err(SyncError::ChannelDisconnected("connection refused".into())),
        }
    }
}
