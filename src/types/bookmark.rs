use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Name of the backend table holding bookmark rows.
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// A saved bookmark as returned by the backend.
///
/// Rows are never mutated in place: the view replaces its whole collection
/// on every reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new bookmark row. `id` and `created_at` are assigned
/// by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub user_id: String,
    pub title: String,
    pub url: String,
}

impl NewBookmark {
    pub fn new(user_id: &str, title: &str, url: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        }
    }
}

/// Hosted tables may key rows by bigint or uuid; both end up as a string here.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
