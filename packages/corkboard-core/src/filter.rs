/// Read-side projections over stored snapshots.
///
/// Nothing here mutates its input: every projection builds a new value from
/// a shared reference.
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::types::{Board, Card, Column};

/// Card filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardFilter {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// A card matches when it carries any of these labels.
    #[serde(default)]
    pub label_ids: Vec<String>,
}

impl BoardFilter {
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Number of active criteria (each selected label counts once).
    pub fn active_count(&self) -> usize {
        let mut count = self.label_ids.len();
        if !self.title.trim().is_empty() {
            count += 1;
        }
        if !self.description.trim().is_empty() {
            count += 1;
        }
        count
    }

    pub fn toggle_label(&mut self, label_id: &str) {
        if let Some(pos) = self.label_ids.iter().position(|id| id == label_id) {
            self.label_ids.remove(pos);
        } else {
            self.label_ids.push(label_id.to_string());
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        if card.is_archived {
            return false;
        }
        contains_folded(&card.title, &self.title)
            && contains_folded(&card.description, &self.description)
            && (self.label_ids.is_empty()
                || self.label_ids.iter().any(|id| card.label_ids.contains(id)))
    }
}

fn fold(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    needle.is_empty() || fold(haystack).contains(&fold(needle))
}

/// Visible board: every column, each holding only the cards that pass the
/// filter, in their stored relative order. Archived cards never pass.
pub fn project(board: &Board, filter: &BoardFilter) -> Board {
    Board {
        columns: board
            .columns
            .iter()
            .map(|column| Column {
                cards: column
                    .cards
                    .iter()
                    .filter(|card| filter.matches(card))
                    .cloned()
                    .collect(),
                ..column.clone_header()
            })
            .collect(),
        ..board.clone_header()
    }
}

/// Archived cards of a board, grouped with their column title, for the
/// archive browser.
pub fn archived_cards(board: &Board) -> Vec<(&Column, &Card)> {
    board
        .columns
        .iter()
        .flat_map(|column| {
            column
                .cards
                .iter()
                .filter(|card| card.is_archived)
                .map(move |card| (column, card))
        })
        .collect()
}

impl Column {
    fn clone_header(&self) -> Column {
        Column {
            id: self.id.clone(),
            title: self.title.clone(),
            title_color: self.title_color.clone(),
            header_color: self.header_color.clone(),
            order: self.order,
            cards: Vec::new(),
        }
    }
}

impl Board {
    fn clone_header(&self) -> Board {
        Board {
            id: self.id.clone(),
            title: self.title.clone(),
            title_color: self.title_color.clone(),
            background_image: self.background_image.clone(),
            background_color: self.background_color.clone(),
            is_favorite: self.is_favorite,
            created_at: self.created_at,
            columns: Vec::new(),
            labels: self.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Dashboard order: favorites first, then by title in `direction`.
pub fn dashboard_view(boards: &[Board], direction: SortDirection) -> Vec<&Board> {
    let mut view: Vec<&Board> = boards.iter().collect();
    view.sort_by(|a, b| {
        b.is_favorite.cmp(&a.is_favorite).then_with(|| {
            let by_title = fold(&a.title)
                .cmp(&fold(&b.title))
                .then_with(|| a.title.cmp(&b.title));
            match direction {
                SortDirection::Asc => by_title,
                SortDirection::Desc => by_title.reverse(),
            }
        })
    });
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::*;

    fn sample() -> Board {
        let mut b = board("b", vec![column("x", 0, &["k1", "k2", "k3"]), column("y", 1, &["k4"])]);
        b.columns[0].cards[0].title = "Write Report".into();
        b.columns[0].cards[1].title = "Review report draft".into();
        b.columns[0].cards[1].description = "Needs numbers".into();
        b.columns[0].cards[1].label_ids = vec!["l1".into()];
        b.columns[0].cards[2].is_archived = true;
        b.columns[1].cards[0].label_ids = vec!["l2".into()];
        b
    }

    fn visible_ids(b: &Board) -> Vec<Vec<String>> {
        b.columns
            .iter()
            .map(|c| c.cards.iter().map(|k| k.id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_empty_filter_returns_active_cards_in_order() {
        let source = sample();
        let before = source.clone();
        let view = project(&source, &BoardFilter::default());
        assert_eq!(source, before);
        assert_eq!(visible_ids(&view), vec![vec!["k1", "k2"], vec!["k4"]]);
    }

    #[test]
    fn test_title_filter_is_case_insensitive() {
        let filter = BoardFilter {
            title: "REPORT".into(),
            ..Default::default()
        };
        let view = project(&sample(), &filter);
        assert_eq!(visible_ids(&view), vec![vec!["k1", "k2"], vec![]]);
    }

    #[test]
    fn test_criteria_combine_with_and() {
        let filter = BoardFilter {
            title: "report".into(),
            description: "numbers".into(),
            label_ids: vec![],
        };
        let view = project(&sample(), &filter);
        assert_eq!(visible_ids(&view)[0], vec!["k2"]);
    }

    #[test]
    fn test_labels_match_any() {
        let filter = BoardFilter {
            label_ids: vec!["l1".into(), "l2".into()],
            ..Default::default()
        };
        let view = project(&sample(), &filter);
        assert_eq!(visible_ids(&view), vec![vec!["k2"], vec!["k4"]]);
        assert_eq!(view.columns.len(), 2);
    }

    #[test]
    fn test_active_count_and_toggle() {
        let mut filter = BoardFilter {
            title: "  ".into(),
            description: "x".into(),
            label_ids: vec![],
        };
        assert_eq!(filter.active_count(), 1);
        filter.toggle_label("l1");
        filter.toggle_label("l2");
        filter.toggle_label("l1");
        assert_eq!(filter.label_ids, vec!["l2"]);
        assert_eq!(filter.active_count(), 2);
        assert!(BoardFilter::default().is_empty());
    }

    #[test]
    fn test_archived_cards_listing() {
        let b = sample();
        let archived = archived_cards(&b);
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].0.id, "x");
        assert_eq!(archived[0].1.id, "k3");
    }

    #[test]
    fn test_dashboard_view_favorites_first() {
        let mut a = board("1", vec![]);
        a.title = "alpha".into();
        let mut b = board("2", vec![]);
        b.title = "Beta".into();
        b.is_favorite = true;
        let mut c = board("3", vec![]);
        c.title = "charlie".into();
        let boards = vec![c, a, b];

        let asc: Vec<&str> = dashboard_view(&boards, SortDirection::Asc)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(asc, vec!["2", "1", "3"]);

        let desc: Vec<&str> = dashboard_view(&boards, SortDirection::Desc)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(desc, vec!["2", "3", "1"]);
    }
}
