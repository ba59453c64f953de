/// Drag-and-drop gesture state machine.
///
/// `Idle -> Dragging -> Idle`. Hovering only records the column under the
/// pointer for highlighting; the board is read, never written. Ending the
/// gesture yields at most one `MoveIntent` for the session to commit.
use crate::types::Board;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Card,
    Column,
}

/// What the pointer picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPayload {
    pub kind: DragKind,
    pub id: String,
}

impl DragPayload {
    pub fn card(id: impl Into<String>) -> Self {
        Self {
            kind: DragKind::Card,
            id: id.into(),
        }
    }

    pub fn column(id: impl Into<String>) -> Self {
        Self {
            kind: DragKind::Column,
            id: id.into(),
        }
    }
}

/// Id of the droppable under the pointer: a column or a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget(pub String);

impl DropTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDrag {
    pub kind: DragKind,
    pub item_id: String,
    /// Column of a dragged card, board of a dragged column.
    pub source_parent_id: String,
    pub over_column_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(ActiveDrag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveIntent {
    Column {
        column_id: String,
        from: usize,
        to: usize,
    },
    Card {
        card_id: String,
        source_column_id: String,
        target_column_id: String,
        /// Rank among the target column's active cards once the card has
        /// left its source.
        index: usize,
        /// The target column is a completion column.
        celebrate: bool,
    },
}

#[derive(Debug, Clone)]
pub struct DragController {
    state: DragState,
    completion_marker: String,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new("done")
    }
}

impl DragController {
    pub fn new(completion_marker: &str) -> Self {
        Self {
            state: DragState::Idle,
            completion_marker: completion_marker.to_lowercase(),
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// The drag in progress, for overlay rendering.
    pub fn active(&self) -> Option<&ActiveDrag> {
        match &self.state {
            DragState::Dragging(drag) => Some(drag),
            DragState::Idle => None,
        }
    }

    /// Begin a gesture. Returns false (and stays idle) when the item is not
    /// on the board. Replaces a drag already in progress.
    pub fn start(&mut self, payload: DragPayload, board: &Board) -> bool {
        let source_parent_id = match payload.kind {
            DragKind::Card => board
                .locate_card(&payload.id)
                .map(|(ci, _)| board.columns[ci].id.clone()),
            DragKind::Column => board.column(&payload.id).map(|_| board.id.clone()),
        };
        let Some(source_parent_id) = source_parent_id else {
            log::debug!(
                target: "corkboard.drag",
                "Ignoring drag of unknown {:?} {}",
                payload.kind,
                payload.id
            );
            self.state = DragState::Idle;
            return false;
        };
        self.state = DragState::Dragging(ActiveDrag {
            kind: payload.kind,
            item_id: payload.id,
            source_parent_id,
            over_column_id: None,
        });
        true
    }

    /// Track the column under the pointer. No-op when idle.
    pub fn hover(&mut self, target: Option<&DropTarget>, board: &Board) {
        if let DragState::Dragging(drag) = &mut self.state {
            drag.over_column_id = target
                .and_then(|t| board.resolve_column(&t.0))
                .map(|c| c.id.clone());
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Finish the gesture. Always returns to idle.
    pub fn end(&mut self, target: Option<&DropTarget>, board: &Board) -> Option<MoveIntent> {
        let DragState::Dragging(drag) = std::mem::take(&mut self.state) else {
            return None;
        };
        let target = target?;
        match drag.kind {
            DragKind::Column => column_intent(&drag, target, board),
            DragKind::Card => self.card_intent(&drag, target, board),
        }
    }

    fn card_intent(&self, drag: &ActiveDrag, target: &DropTarget, board: &Board) -> Option<MoveIntent> {
        let (source_ci, _) = board.locate_card(&drag.item_id)?;
        let source = &board.columns[source_ci];
        let target_column = board.resolve_column(&target.0)?;
        if source.id == target_column.id && target.0 == drag.item_id {
            return None;
        }

        // Target list with the dragged card taken out. Archived cards keep
        // their slots, so they count toward the index.
        let remaining: Vec<&str> = target_column
            .cards
            .iter()
            .filter(|c| c.id != drag.item_id)
            .map(|c| c.id.as_str())
            .collect();
        let index = remaining
            .iter()
            .position(|id| *id == target.0)
            .unwrap_or(remaining.len());

        Some(MoveIntent::Card {
            card_id: drag.item_id.clone(),
            source_column_id: source.id.clone(),
            target_column_id: target_column.id.clone(),
            index,
            celebrate: !self.completion_marker.is_empty()
                && target_column
                    .title
                    .to_lowercase()
                    .contains(&self.completion_marker),
        })
    }
}

fn column_intent(drag: &ActiveDrag, target: &DropTarget, board: &Board) -> Option<MoveIntent> {
    if target.0 == drag.item_id {
        return None;
    }
    let from = board.column_index(&drag.item_id)?;
    let over = board.resolve_column(&target.0)?;
    let to = board.column_index(&over.id)?;
    if from == to {
        return None;
    }
    Some(MoveIntent::Column {
        column_id: drag.item_id.clone(),
        from,
        to,
    })
}
