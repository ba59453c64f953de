/// Remote store contract consumed by the sessions.
///
/// Every mutating call is idempotent-by-intent: the engine never retries one
/// verbatim, a refetch resolves any ambiguity.
use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::types::{Board, Label};

pub type ApiResult<T> = Result<T, SyncError>;

/// What a view is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Dashboard,
    Board(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Dashboard => write!(f, "dashboard"),
            Scope::Board(id) => write!(f, "board {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewColumn {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnUpdate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDraft {
    pub title: String,
    pub description: String,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDraft {
    pub name: String,
    pub color: String,
    pub text_color: String,
}

#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn get_boards(&self) -> ApiResult<Vec<Board>>;
    async fn get_board(&self, board_id: &str) -> ApiResult<Board>;

    /// Returns the id assigned by the store.
    async fn create_board(&self, board: &NewBoard) -> ApiResult<String>;
    async fn update_board_title(&self, board_id: &str, title: &str) -> ApiResult<()>;
    async fn update_board_title_color(&self, board_id: &str, color: &str) -> ApiResult<()>;
    async fn update_board_background_color(&self, board_id: &str, color: &str) -> ApiResult<()>;
    async fn toggle_favorite(&self, board_id: &str) -> ApiResult<()>;
    async fn delete_board(&self, board_id: &str) -> ApiResult<()>;

    async fn create_column(&self, board_id: &str, column: &NewColumn) -> ApiResult<()>;
    async fn update_column(
        &self,
        board_id: &str,
        column_id: &str,
        update: &ColumnUpdate,
    ) -> ApiResult<()>;
    async fn delete_column(&self, board_id: &str, column_id: &str) -> ApiResult<()>;
    async fn move_column(&self, board_id: &str, column_id: &str, new_order: u32) -> ApiResult<()>;
    /// 1-based positions keyed by column id.
    async fn bulk_move_columns(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()>;

    async fn create_card(&self, board_id: &str, column_id: &str, card: &CardDraft)
        -> ApiResult<()>;
    async fn update_card(&self, board_id: &str, card_id: &str, card: &CardDraft) -> ApiResult<()>;
    async fn archive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()>;
    async fn unarchive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()>;
    async fn delete_card(&self, board_id: &str, card_id: &str) -> ApiResult<()>;
    /// `new_order` is a rank among the target column's active cards.
    async fn move_card(
        &self,
        board_id: &str,
        card_id: &str,
        target_column_id: &str,
        new_order: u32,
    ) -> ApiResult<()>;
    async fn bulk_move_cards(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()>;

    async fn create_label(&self, board_id: &str, label: &LabelDraft) -> ApiResult<Label>;
    async fn update_label(&self, board_id: &str, label_id: &str, label: &LabelDraft)
        -> ApiResult<()>;
    async fn delete_label(&self, board_id: &str, label_id: &str) -> ApiResult<()>;
}
