// src/pipeline/load.rs

//! Load stage: schema setup and batch appends.

use serde_json::Value;

use crate::error::Result;
use crate::storage::{ALL_TABLES, LoadMetadata, Warehouse, WarehouseRow};

/// Create the dataset and every destination table unless they exist.
///
/// Safe to call on every run.
pub async fn ensure_schema(warehouse: &dyn Warehouse) -> Result<()> {
    warehouse.ensure_dataset().await?;
    for table in ALL_TABLES {
        warehouse.ensure_table(table).await?;
    }
    Ok(())
}

/// Serialize rows and check each one against its table schema.
pub fn to_table_rows<R: WarehouseRow>(rows: &[R]) -> Result<Vec<Value>> {
    let schema = R::schema();
    rows.iter()
        .map(|row| -> Result<Value> {
            let value = serde_json::to_value(row)?;
            schema.validate_row(&value).map_err(|e| {
                log::error!("Row {} rejected for {}: {}", row.record_id(), schema.name, e);
                e
            })?;
            Ok(value)
        })
        .collect()
}

/// Append a batch to its destination table and wait for confirmation.
pub async fn load_rows<R: WarehouseRow + Sync>(
    warehouse: &dyn Warehouse,
    rows: &[R],
) -> Result<LoadMetadata> {
    let table = R::schema();
    let values = to_table_rows(rows)?;
    let meta = warehouse.append(table, &values).await?;
    log::info!("Loaded {} rows to {}.", meta.row_count, meta.location);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::models::{CommentRow, PostRow, RawComment, RawPost};
    use crate::pipeline::{clean_comments, clean_posts};
    use crate::storage::{LocalWarehouse, POSTS, SchemaStatus};

    fn row(id: &str) -> PostRow {
        PostRow {
            id: id.to_string(),
            title: "Title".to_string(),
            selftext: String::new(),
            author: "alice".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            score: 1,
            num_comments: 0,
            subreddit: "rust".to_string(),
            url: None,
            upvote_ratio: Some(1.0),
            over_18: false,
        }
    }

    #[tokio::test]
    async fn ensure_schema_twice_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let warehouse = LocalWarehouse::new(tmp.path(), "reddit_data");

        ensure_schema(&warehouse).await.unwrap();
        ensure_schema(&warehouse).await.unwrap();

        assert_eq!(warehouse.ensure_table(&POSTS).await.unwrap(), SchemaStatus::Exists);
        assert_eq!(warehouse.table_names().await.unwrap(), vec!["comments", "posts"]);
    }

    #[tokio::test]
    async fn load_rows_appends_with_warehouse_timestamps() {
        let tmp = TempDir::new().unwrap();
        let warehouse = LocalWarehouse::new(tmp.path(), "reddit_data");
        ensure_schema(&warehouse).await.unwrap();

        let meta = load_rows(&warehouse, &[row("a"), row("b")]).await.unwrap();
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.table, "posts");

        let stored = warehouse.read_rows("posts").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["created_utc"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(stored[1]["id"], "b");
    }

    #[tokio::test]
    async fn empty_batch_loads_nothing() {
        let tmp = TempDir::new().unwrap();
        let warehouse = LocalWarehouse::new(tmp.path(), "reddit_data");
        ensure_schema(&warehouse).await.unwrap();

        let meta = load_rows::<PostRow>(&warehouse, &[]).await.unwrap();
        assert_eq!(meta.row_count, 0);
        assert!(warehouse.read_rows("posts").await.unwrap().is_empty());
    }

    #[test]
    fn serialized_rows_pass_schema_check() {
        let values = to_table_rows(&[row("a")]).unwrap();
        assert_eq!(values[0]["over_18"], false);
        assert!(values[0]["url"].is_null());
    }

    #[tokio::test]
    async fn cleaned_rows_read_back_unchanged() {
        let tmp = TempDir::new().unwrap();
        let warehouse = LocalWarehouse::new(tmp.path(), "reddit_data");
        ensure_schema(&warehouse).await.unwrap();

        let posts = clean_posts(vec![RawPost {
            id: "p1".to_string(),
            title: Some("Release\nnotes".to_string()),
            selftext: Some("Body text".to_string()),
            author: Some("alice".to_string()),
            created_utc: json!(1714564800.5),
            score: json!(42),
            num_comments: json!("7"),
            subreddit: Some("rust".to_string()),
            url: Some("https://example.com/p1".to_string()),
            upvote_ratio: json!(0.87),
            over_18: json!(true),
        }])
        .unwrap();
        let comments = clean_comments(vec![RawComment {
            id: "c1".to_string(),
            post_id: "p1".to_string(),
            parent_id: Some("t3_p1".to_string()),
            body: Some("First!".to_string()),
            author: None,
            created_utc: json!(1714564801),
            score: json!(-3),
            subreddit: Some("rust".to_string()),
        }])
        .unwrap();

        load_rows(&warehouse, &posts).await.unwrap();
        load_rows(&warehouse, &comments).await.unwrap();

        let stored_posts: Vec<PostRow> = warehouse
            .read_rows("posts")
            .await
            .unwrap()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
        let stored_comments: Vec<CommentRow> = warehouse
            .read_rows("comments")
            .await
            .unwrap()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();

        assert_eq!(stored_posts, posts);
        assert_eq!(stored_comments, comments);
        assert_eq!(stored_posts[0].title, "Release notes");
        assert_eq!(
            stored_posts[0].created_utc,
            Utc.timestamp_opt(1_714_564_800, 500_000_000).unwrap()
        );
        assert_eq!(stored_comments[0].author, "[deleted]");
    }
}
