//! Comment records, raw and cleaned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp;
use crate::storage::schema::{COMMENTS, TableSchema, WarehouseRow};

/// A reply as delivered by the discussion API, before cleaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub id: String,
    /// Parent post id, stamped by extraction
    #[serde(default)]
    pub post_id: String,
    /// Fullname of the item this replies to (`t1_...` comment or `t3_...` post)
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_utc: Value,
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub subreddit: Option<String>,
}

impl RawComment {
    /// Creation instant, if the raw timestamp is readable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp::parse_value(&self.created_utc).ok()
    }
}

/// A cleaned comment, shaped exactly like the `comments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub body: String,
    pub author: String,
    #[serde(with = "timestamp::warehouse")]
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub subreddit: String,
}

impl WarehouseRow for CommentRow {
    fn schema() -> &'static TableSchema {
        &COMMENTS
    }

    fn record_id(&self) -> &str {
        &self.id
    }
}
