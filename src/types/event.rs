use serde::{Deserialize, Serialize};

use super::bookmark::BOOKMARKS_TABLE;

/// Kind of row change reported by the change feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A "something changed" notification. The view never reads a payload from
/// it; it only triggers a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub bookmark_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, bookmark_id: Option<&str>) -> Self {
        Self {
            kind,
            bookmark_id: bookmark_id.map(str::to_string),
        }
    }
}

/// Scope of a change feed subscription: one table, rows of one owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub user_id: String,
}

impl ChangeFilter {
    /// Filter for all bookmark rows owned by `user_id`.
    pub fn bookmarks_of(user_id: &str) -> Self {
        Self {
            table: BOOKMARKS_TABLE.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// Whether a change to `table` on a row owned by `owner` passes the filter.
    pub fn matches(&self, table: &str, owner: &str) -> bool {
        self.table == table && self.user_id == owner
    }
}
