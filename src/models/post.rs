//! Post records, raw and cleaned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp;
use crate::storage::schema::{POSTS, TableSchema, WarehouseRow};

/// A post as delivered by the discussion API, before cleaning.
///
/// Loosely typed on purpose: numeric fields may arrive as integers, floats,
/// strings or null, and any text field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_utc: Value,
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub num_comments: Value,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub upvote_ratio: Value,
    #[serde(default)]
    pub over_18: Value,
}

impl RawPost {
    /// Creation instant, if the raw timestamp is readable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp::parse_value(&self.created_utc).ok()
    }
}

/// A cleaned post, shaped exactly like the `posts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    #[serde(with = "timestamp::warehouse")]
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub num_comments: i64,
    pub subreddit: String,
    pub url: Option<String>,
    pub upvote_ratio: Option<f64>,
    pub over_18: bool,
}

impl WarehouseRow for PostRow {
    fn schema() -> &'static TableSchema {
        &POSTS
    }

    fn record_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_listing_payload() {
        let raw: RawPost = serde_json::from_value(json!({
            "id": "1abc",
            "title": "Hello",
            "selftext": "",
            "author": "someone",
            "created_utc": 1714564800.0,
            "score": 42,
            "num_comments": 7,
            "subreddit": "rust",
            "url": "https://example.com",
            "upvote_ratio": 0.97,
            "over_18": false,
            "permalink": "/r/rust/comments/1abc/hello/"
        }))
        .unwrap();

        assert_eq!(raw.id, "1abc");
        assert_eq!(raw.author.as_deref(), Some("someone"));
        assert_eq!(raw.score, json!(42));
        assert!(raw.created_at().is_some());
    }

    #[test]
    fn missing_fields_default_to_absent() {
        let raw: RawPost =
            serde_json::from_value(json!({ "id": "x", "author": null })).unwrap();
        assert!(raw.author.is_none());
        assert!(raw.title.is_none());
        assert!(raw.score.is_null());
        assert!(raw.created_at().is_none());
    }
}
