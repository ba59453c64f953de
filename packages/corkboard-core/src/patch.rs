/// Patch vocabulary for board and dashboard snapshots.
///
/// Every patch carries only the fields it changes, so two edits of the same
/// entity that complete out of order never clobber each other's fields.
use std::collections::BTreeMap;

use crate::error::PatchError;
use crate::order;
use crate::store::Snapshot;
use crate::types::{Board, BoardList, Card, Column, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    InsertChild,
    RemoveChild,
    UpdateFields,
    MoveChild,
    ReorderSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardFields {
    pub title: Option<String>,
    pub title_color: Option<String>,
    pub background_image: Option<String>,
    pub background_color: Option<String>,
    pub is_favorite: Option<bool>,
}

impl BoardFields {
    fn apply_to(&self, board: &mut Board) {
        if let Some(title) = &self.title {
            board.title = title.clone();
        }
        if let Some(color) = &self.title_color {
            board.title_color = Some(color.clone());
        }
        if let Some(image) = &self.background_image {
            board.background_image = Some(image.clone());
        }
        if let Some(color) = &self.background_color {
            board.background_color = Some(color.clone());
        }
        if let Some(favorite) = self.is_favorite {
            board.is_favorite = favorite;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFields {
    pub title: Option<String>,
    pub title_color: Option<String>,
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_archived: Option<bool>,
    pub label_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFields {
    pub name: Option<String>,
    pub color: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardPatch {
    UpdateBoard(BoardFields),

    InsertColumn { column: Column, index: usize },
    RemoveColumn { column_id: String },
    UpdateColumn { column_id: String, fields: ColumnFields },
    /// Splice the column to `to` and renumber all columns.
    MoveColumn { column_id: String, to: usize },
    /// 1-based positions from a manual reorder.
    ReorderColumns(BTreeMap<String, u32>),

    /// `index` is a rank among the target column's active cards.
    InsertCard { card: Card, index: usize },
    RemoveCard { card_id: String },
    UpdateCard { card_id: String, fields: CardFields },
    /// `index` is a slot in the target column's full card list (archived
    /// cards included) once the card has left its source column.
    MoveCard {
        card_id: String,
        target_column_id: String,
        index: usize,
    },
    ReorderCards(BTreeMap<String, u32>),

    InsertLabel(Label),
    /// Also strips the label from every card.
    RemoveLabel { label_id: String },
    UpdateLabel { label_id: String, fields: LabelFields },
}

impl BoardPatch {
    pub fn kind(&self) -> PatchKind {
        match self {
            BoardPatch::InsertColumn { .. }
            | BoardPatch::InsertCard { .. }
            | BoardPatch::InsertLabel(_) => PatchKind::InsertChild,
            BoardPatch::RemoveColumn { .. }
            | BoardPatch::RemoveCard { .. }
            | BoardPatch::RemoveLabel { .. } => PatchKind::RemoveChild,
            BoardPatch::UpdateBoard(_)
            | BoardPatch::UpdateColumn { .. }
            | BoardPatch::UpdateCard { .. }
            | BoardPatch::UpdateLabel { .. } => PatchKind::UpdateFields,
            BoardPatch::MoveColumn { .. } | BoardPatch::MoveCard { .. } => PatchKind::MoveChild,
            BoardPatch::ReorderColumns(_) | BoardPatch::ReorderCards(_) => PatchKind::ReorderSet,
        }
    }
}

impl Snapshot for Board {
    type Patch = BoardPatch;

    fn apply(&mut self, patch: &BoardPatch) -> Result<(), PatchError> {
        match patch {
            BoardPatch::UpdateBoard(fields) => fields.apply_to(self),

            BoardPatch::InsertColumn { column, index } => {
                order::insert_at(&mut self.columns, column.clone(), *index);
            }
            BoardPatch::RemoveColumn { column_id } => {
                let pos = self
                    .column_index(column_id)
                    .ok_or_else(|| PatchError::UnknownColumn(column_id.clone()))?;
                self.columns.remove(pos);
                order::renumber(&mut self.columns);
            }
            BoardPatch::UpdateColumn { column_id, fields } => {
                let column = self
                    .column_mut(column_id)
                    .ok_or_else(|| PatchError::UnknownColumn(column_id.clone()))?;
                if let Some(title) = &fields.title {
                    column.title = title.clone();
                }
                if let Some(color) = &fields.title_color {
                    column.title_color = Some(color.clone());
                }
                if let Some(color) = &fields.header_color {
                    column.header_color = Some(color.clone());
                }
            }
            BoardPatch::MoveColumn { column_id, to } => {
                let from = self
                    .column_index(column_id)
                    .ok_or_else(|| PatchError::UnknownColumn(column_id.clone()))?;
                order::move_item(&mut self.columns, from, *to);
            }
            BoardPatch::ReorderColumns(positions) => {
                order::apply_positions(&mut self.columns, positions);
            }

            BoardPatch::InsertCard { card, index } => {
                let column = self
                    .column_mut(&card.column_id)
                    .ok_or_else(|| PatchError::UnknownColumn(card.column_id.clone()))?;
                let slot = order::slot_for_rank(&column.cards, *index);
                order::insert_at(&mut column.cards, card.clone(), slot);
            }
            BoardPatch::RemoveCard { card_id } => {
                let (ci, slot) = self
                    .locate_card(card_id)
                    .ok_or_else(|| PatchError::UnknownCard(card_id.clone()))?;
                let cards = &mut self.columns[ci].cards;
                cards.remove(slot);
                order::renumber(cards);
            }
            BoardPatch::UpdateCard { card_id, fields } => {
                if let Some(ids) = &fields.label_ids {
                    if let Some(missing) = ids.iter().find(|id| self.label(id).is_none()) {
                        return Err(PatchError::UnknownLabel(missing.clone()));
                    }
                }
                let (ci, slot) = self
                    .locate_card(card_id)
                    .ok_or_else(|| PatchError::UnknownCard(card_id.clone()))?;
                let cards = &mut self.columns[ci].cards;
                let card = &mut cards[slot];
                if let Some(title) = &fields.title {
                    card.title = title.clone();
                }
                if let Some(description) = &fields.description {
                    card.description = description.clone();
                }
                if let Some(ids) = &fields.label_ids {
                    card.label_ids = ids.clone();
                }
                if let Some(archived) = fields.is_archived {
                    if card.is_archived != archived {
                        card.is_archived = archived;
                        if archived {
                            // Leaves the active ranking; keep its last key.
                            order::renumber(cards);
                        } else {
                            // Back at the end of the active ranking.
                            let rank = cards.iter().filter(|c| !c.is_archived).count();
                            let restored = cards.remove(slot);
                            let slot = order::slot_for_rank(cards, rank - 1);
                            order::insert_at(cards, restored, slot);
                        }
                    }
                }
            }
            BoardPatch::MoveCard {
                card_id,
                target_column_id,
                index,
            } => {
                let target = self
                    .column_index(target_column_id)
                    .ok_or_else(|| PatchError::UnknownColumn(target_column_id.clone()))?;
                let (source, slot) = self
                    .locate_card(card_id)
                    .ok_or_else(|| PatchError::UnknownCard(card_id.clone()))?;

                let mut card = self.columns[source].cards.remove(slot);
                order::renumber(&mut self.columns[source].cards);

                card.column_id = target_column_id.clone();
                order::insert_at(&mut self.columns[target].cards, card, *index);
            }
            BoardPatch::ReorderCards(positions) => {
                for column in &mut self.columns {
                    if column.cards.iter().any(|c| positions.contains_key(&c.id)) {
                        order::apply_positions(&mut column.cards, positions);
                    }
                }
            }

            BoardPatch::InsertLabel(label) => {
                if self.label(&label.id).is_none() {
                    self.labels.push(label.clone());
                }
            }
            BoardPatch::RemoveLabel { label_id } => {
                let pos = self
                    .labels
                    .iter()
                    .position(|l| &l.id == label_id)
                    .ok_or_else(|| PatchError::UnknownLabel(label_id.clone()))?;
                self.labels.remove(pos);
                for card in self.columns.iter_mut().flat_map(|c| c.cards.iter_mut()) {
                    card.label_ids.retain(|id| id != label_id);
                }
            }
            BoardPatch::UpdateLabel { label_id, fields } => {
                let label = self
                    .labels
                    .iter_mut()
                    .find(|l| &l.id == label_id)
                    .ok_or_else(|| PatchError::UnknownLabel(label_id.clone()))?;
                if let Some(name) = &fields.name {
                    label.name = name.clone();
                }
                if let Some(color) = &fields.color {
                    label.color = color.clone();
                }
                if let Some(color) = &fields.text_color {
                    label.text_color = color.clone();
                }
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), PatchError> {
        self.check_invariants()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardListPatch {
    InsertBoard { board: Board, index: usize },
    RemoveBoards { board_ids: Vec<String> },
    UpdateBoard { board_id: String, fields: BoardFields },
}

impl BoardListPatch {
    pub fn kind(&self) -> PatchKind {
        match self {
            BoardListPatch::InsertBoard { .. } => PatchKind::InsertChild,
            BoardListPatch::RemoveBoards { .. } => PatchKind::RemoveChild,
            BoardListPatch::UpdateBoard { .. } => PatchKind::UpdateFields,
        }
    }
}

impl Snapshot for BoardList {
    type Patch = BoardListPatch;

    fn apply(&mut self, patch: &BoardListPatch) -> Result<(), PatchError> {
        match patch {
            BoardListPatch::InsertBoard { board, index } => {
                let index = (*index).min(self.0.len());
                self.0.insert(index, board.clone());
            }
            BoardListPatch::RemoveBoards { board_ids } => {
                if let Some(missing) = board_ids.iter().find(|id| self.get(id).is_none()) {
                    return Err(PatchError::UnknownBoard(missing.clone()));
                }
                self.0.retain(|b| !board_ids.contains(&b.id));
            }
            BoardListPatch::UpdateBoard { board_id, fields } => {
                let board = self
                    .0
                    .iter_mut()
                    .find(|b| &b.id == board_id)
                    .ok_or_else(|| PatchError::UnknownBoard(board_id.clone()))?;
                fields.apply_to(board);
            }
        }
        Ok(())
    }
}
