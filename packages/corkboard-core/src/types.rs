use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::error::PatchError;

/// Board-scoped label. Cards reference labels by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: String,
    pub text_color: String,
    #[serde(default)]
    pub board_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: i32,
    pub column_id: String,
    #[serde(default)]
    pub is_archived: bool,
    /// The store sends full label objects here; only the ids are kept.
    #[serde(rename = "labels", default, deserialize_with = "deserialize_label_refs")]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_color: Option<String>,
    pub order: i32,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl Column {
    /// Non-archived cards in list order.
    pub fn active_cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter().filter(|c| !c.is_archived)
    }

    pub fn active_card_count(&self) -> usize {
        self.active_cards().count()
    }

    pub fn card_position(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }
}

/// How a board's background should be painted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Background {
    Image(String),
    Gradient(String),
    Color(String),
    Default,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_color: Option<String>,
    /// Either a gradient token or an `http(s)` image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Board {
    pub fn background(&self) -> Background {
        match (&self.background_image, &self.background_color) {
            (Some(image), _) if image.starts_with("http") => Background::Image(image.clone()),
            (Some(token), _) if !token.trim().is_empty() => Background::Gradient(token.clone()),
            (_, Some(color)) if !color.trim().is_empty() => Background::Color(color.clone()),
            _ => Background::Default,
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    /// Locate a card as (column index, card index).
    pub fn locate_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.card_position(card_id).map(|pos| (ci, pos))
        })
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.locate_card(card_id)
            .map(|(ci, pos)| &self.columns[ci].cards[pos])
    }

    /// Column that contains the card, or the column itself when `id` names one.
    pub fn resolve_column(&self, id: &str) -> Option<&Column> {
        self.column(id).or_else(|| {
            self.locate_card(id).map(|(ci, _)| &self.columns[ci])
        })
    }

    pub fn label(&self, label_id: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.id == label_id)
    }

    /// Sort columns and their cards by `order`. Applied to every fetched
    /// snapshot; the sort is stable so equal keys keep server order.
    pub fn normalize(&mut self) {
        self.columns.sort_by_key(|c| c.order);
        for column in &mut self.columns {
            column.cards.sort_by_key(|c| c.order);
        }
    }

    /// Verify the structural invariants the engine maintains between fetches.
    pub fn check_invariants(&self) -> Result<(), PatchError> {
        let mut column_orders = HashSet::new();
        let mut seen_cards = HashSet::new();
        let label_ids: HashSet<&str> = self.labels.iter().map(|l| l.id.as_str()).collect();

        for column in &self.columns {
            if !column_orders.insert(column.order) {
                return Err(PatchError::Invariant(format!(
                    "duplicate column order {} on board {}",
                    column.order, self.id
                )));
            }
            let mut card_orders = HashSet::new();
            for card in &column.cards {
                if card.column_id != column.id {
                    return Err(PatchError::Invariant(format!(
                        "card {} lists column {} but lives in {}",
                        card.id, card.column_id, column.id
                    )));
                }
                if !seen_cards.insert(card.id.as_str()) {
                    return Err(PatchError::Invariant(format!(
                        "card {} appears in more than one column",
                        card.id
                    )));
                }
                if !card.is_archived && !card_orders.insert(card.order) {
                    return Err(PatchError::Invariant(format!(
                        "duplicate card order {} in column {}",
                        card.order, column.id
                    )));
                }
                if let Some(missing) = card.label_ids.iter().find(|id| !label_ids.contains(id.as_str())) {
                    return Err(PatchError::Invariant(format!(
                        "card {} references unknown label {}",
                        card.id, missing
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dashboard snapshot: every board visible to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardList(pub Vec<Board>);

impl BoardList {
    pub fn get(&self, board_id: &str) -> Option<&Board> {
        self.0.iter().find(|b| b.id == board_id)
    }

    pub fn position(&self, board_id: &str) -> Option<usize> {
        self.0.iter().position(|b| b.id == board_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelRef {
    Id(String),
    Object { id: String },
}

fn deserialize_label_refs<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let refs = Option::<Vec<LabelRef>>::deserialize(d)?.unwrap_or_default();
    Ok(refs
        .into_iter()
        .map(|r| match r {
            LabelRef::Id(id) | LabelRef::Object { id } => id,
        })
        .collect())
}

/// Accepts RFC 3339 timestamps and offset-less ones (read as UTC).
fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(d)? else {
        return Ok(DateTime::<Utc>::default());
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
