/// Order key assignment for sibling lists (columns within a board, cards
/// within a column).
///
/// Local renumbering always produces dense keys 0..N-1 in list order. Manual
/// bulk reorders use 1-based positions that are clamped, never rejected, and
/// the server normalizes the final keys.
use std::collections::{BTreeMap, HashMap};

use crate::types::{Board, Card, Column};

/// A sibling entity carrying an integer order key.
pub trait Ordered: Clone {
    fn key(&self) -> &str;
    fn order(&self) -> i32;
    fn set_order(&mut self, order: i32);

    /// Whether the entity takes part in ordering. Archived cards do not.
    fn is_ranked(&self) -> bool {
        true
    }
}

impl Ordered for Column {
    fn key(&self) -> &str {
        &self.id
    }
    fn order(&self) -> i32 {
        self.order
    }
    fn set_order(&mut self, order: i32) {
        self.order = order;
    }
}

impl Ordered for Card {
    fn key(&self) -> &str {
        &self.id
    }
    fn order(&self) -> i32 {
        self.order
    }
    fn set_order(&mut self, order: i32) {
        self.order = order;
    }
    fn is_ranked(&self) -> bool {
        !self.is_archived
    }
}

/// Assign sequential orders 0..N-1 to ranked items in list order.
/// Unranked items keep their stored key.
pub fn renumber<T: Ordered>(items: &mut [T]) {
    let mut next = 0;
    for item in items.iter_mut().filter(|i| i.is_ranked()) {
        item.set_order(next);
        next += 1;
    }
}

/// Splice the item at `from` to `to` (clamped to the list end) and renumber.
/// Returns false when `from` is out of range.
pub fn move_item<T: Ordered>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() {
        return false;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
    renumber(items);
    true
}

/// Insert at `index` (clamped to the list end) and renumber. Returns the
/// index actually used.
pub fn insert_at<T: Ordered>(items: &mut Vec<T>, item: T, index: usize) -> usize {
    let index = index.min(items.len());
    items.insert(index, item);
    renumber(items);
    index
}

/// Full-list slot before the `rank`-th ranked item, or the end of the list.
pub fn slot_for_rank<T: Ordered>(items: &[T], rank: usize) -> usize {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_ranked())
        .nth(rank)
        .map(|(slot, _)| slot)
        .unwrap_or(items.len())
}


/// Clamp a requested 1-based position into `[1, len]`.
pub fn clamp_position(requested: i64, len: usize) -> u32 {
    let max = len.max(1) as i64;
    requested.clamp(1, max) as u32
}

/// Clamp every requested position in `requested` into `[1, len]`.
pub fn clamp_positions(requested: &HashMap<String, i64>, len: usize) -> BTreeMap<String, u32> {
    requested
        .iter()
        .map(|(id, &pos)| (id.clone(), clamp_position(pos, len)))
        .collect()
}

/// Re-sort ranked items by requested 1-based positions and renumber.
/// Ties and items without a requested position fall back to their previous
/// order, then to list position (the sort is stable).
pub fn apply_positions<T: Ordered>(items: &mut [T], positions: &BTreeMap<String, u32>) {
    let slots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_ranked())
        .map(|(slot, _)| slot)
        .collect();
    let mut ranked: Vec<T> = slots.iter().map(|&slot| items[slot].clone()).collect();
    ranked.sort_by_key(|item| {
        let requested = positions
            .get(item.key())
            .map(|&p| i64::from(p) - 1)
            .unwrap_or_else(|| i64::from(item.order()));
        (requested, item.order())
    });
    for (slot, item) in slots.into_iter().zip(ranked) {
        items[slot] = item;
    }
    renumber(items);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderTarget {
    Columns,
    Cards,
}

/// A validated manual reorder, forwarded verbatim to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReorder {
    pub target: ReorderTarget,
    pub positions: BTreeMap<String, u32>,
}

impl BulkReorder {
    /// Column positions clamped to `[1, number of columns]`.
    pub fn columns(board: &Board, requested: &HashMap<String, i64>) -> Self {
        let known: HashMap<String, i64> = requested
            .iter()
            .filter(|(id, _)| {
                let is_column = board.column(id).is_some();
                if !is_column && board.locate_card(id).is_none() {
                    log::warn!(
                        target: "corkboard.order.bulk",
                        "Dropping unknown id {} from column reorder",
                        id
                    );
                }
                is_column
            })
            .map(|(id, &pos)| (id.clone(), pos))
            .collect();
        Self {
            target: ReorderTarget::Columns,
            positions: clamp_positions(&known, board.columns.len()),
        }
    }

    /// Card positions clamped to `[1, active cards in the card's column]`.
    /// Archived cards are not orderable and are dropped.
    pub fn cards(board: &Board, requested: &HashMap<String, i64>) -> Self {
        let mut positions = BTreeMap::new();
        for (id, &pos) in requested {
            match board.locate_card(id) {
                Some((ci, slot)) => {
                    let column = &board.columns[ci];
                    if column.cards[slot].is_archived {
                        continue;
                    }
                    positions.insert(id.clone(), clamp_position(pos, column.active_card_count()));
                }
                None if board.column(id).is_none() => {
                    log::warn!(
                        target: "corkboard.order.bulk",
                        "Dropping unknown id {} from card reorder",
                        id
                    );
                }
                None => {}
            }
        }
        Self {
            target: ReorderTarget::Cards,
            positions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Seed positions for a manual reorder editor: columns 1..N by order, and
/// active cards 1..N within each column.
pub fn initial_positions(board: &Board) -> BTreeMap<String, u32> {
    let mut columns: Vec<&Column> = board.columns.iter().collect();
    columns.sort_by_key(|c| c.order);

    let mut positions = BTreeMap::new();
    for (ci, column) in columns.into_iter().enumerate() {
        positions.insert(column.id.clone(), ci as u32 + 1);
        let mut cards: Vec<&Card> = column.active_cards().collect();
        cards.sort_by_key(|c| c.order);
        for (ki, card) in cards.into_iter().enumerate() {
            positions.insert(card.id.clone(), ki as u32 + 1);
        }
    }
    positions
}
