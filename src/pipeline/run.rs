// src/pipeline/run.rs

//! Orchestrator: one batch run over every configured forum.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{Config, PostRow};
use crate::services::ForumSource;
use crate::storage::Warehouse;

use super::clean::{clean_comments, clean_posts};
use super::extract::{RecencyWindow, extract_comments, extract_posts};
use super::load::{ensure_schema, load_rows};

/// Named step of the per-forum flow, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchPosts,
    CleanPosts,
    LoadPosts,
    FetchComments,
    CleanComments,
    LoadComments,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchPosts => "FETCH_POSTS",
            Stage::CleanPosts => "CLEAN_POSTS",
            Stage::LoadPosts => "LOAD_POSTS",
            Stage::FetchComments => "FETCH_COMMENTS",
            Stage::CleanComments => "CLEAN_COMMENTS",
            Stage::LoadComments => "LOAD_COMMENTS",
        };
        f.write_str(name)
    }
}

/// What happened to one forum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForumOutcome {
    pub forum: String,
    pub posts_extracted: usize,
    pub posts_loaded: usize,
    pub comments_loaded: usize,
    /// Posts whose comment flow failed
    pub comment_failures: usize,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub forums: Vec<ForumOutcome>,
    /// Error messages of forums that failed
    pub failures: Vec<String>,
}

impl RunSummary {
    pub fn posts_loaded(&self) -> usize {
        self.forums.iter().map(|f| f.posts_loaded).sum()
    }

    pub fn comments_loaded(&self) -> usize {
        self.forums.iter().map(|f| f.comments_loaded).sum()
    }

    pub fn comment_failures(&self) -> usize {
        self.forums.iter().map(|f| f.comment_failures).sum()
    }

    fn report(&self) {
        log::info!(
            "Run finished: {} forums ok, {} failed, {} posts and {} comments loaded",
            self.forums.len(),
            self.failures.len(),
            self.posts_loaded(),
            self.comments_loaded()
        );
        if self.comment_failures() > 0 {
            log::warn!(
                "{} posts had comment failures",
                self.comment_failures()
            );
        }
        for failure in &self.failures {
            log::warn!("  - {}", failure);
        }
    }
}

/// Run the batch: make sure the schema exists, then process each forum in
/// configured order.
///
/// Failure of one forum is logged and does not stop the others; only a
/// schema setup failure fails the run. `now` anchors the recency window for
/// the whole run.
pub async fn run_pipeline(
    config: &Config,
    source: &dyn ForumSource,
    warehouse: &dyn Warehouse,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let cutoff = RecencyWindow::try_from(&config.extraction)?.cutoff(now)?;
    log::info!(
        "Starting run for {} forums (window {}h, cutoff {})",
        config.forums.len(),
        config.extraction.window_hours,
        cutoff
    );

    ensure_schema(warehouse).await?;

    let mut summary = RunSummary {
        started_at: now,
        ..RunSummary::default()
    };

    for forum in &config.forums {
        log::info!("Processing r/{}...", forum);
        match process_forum(config, source, warehouse, forum, now).await {
            Ok(outcome) => summary.forums.push(outcome),
            Err(e) => {
                log::error!("{}", e);
                summary.failures.push(e.to_string());
            }
        }
    }

    summary.report();
    Ok(summary)
}

async fn process_forum(
    config: &Config,
    source: &dyn ForumSource,
    warehouse: &dyn Warehouse,
    forum: &str,
    now: DateTime<Utc>,
) -> Result<ForumOutcome> {
    let mut outcome = ForumOutcome {
        forum: forum.to_string(),
        ..ForumOutcome::default()
    };

    let raw = extract_posts(source, forum, &config.extraction, now)
        .await
        .map_err(|e| AppError::stage(forum, Stage::FetchPosts, e))?;
    outcome.posts_extracted = raw.len();
    if raw.is_empty() {
        log::info!("No new posts found for r/{}.", forum);
        return Ok(outcome);
    }

    let posts = clean_posts(raw).map_err(|e| AppError::stage(forum, Stage::CleanPosts, e))?;
    if posts.is_empty() {
        log::info!("No posts left for r/{} after cleaning.", forum);
        return Ok(outcome);
    }

    load_rows(warehouse, &posts)
        .await
        .map_err(|e| AppError::stage(forum, Stage::LoadPosts, e))?;
    outcome.posts_loaded = posts.len();

    for post in &posts {
        match process_comments(config, source, warehouse, forum, post, now).await {
            Ok(loaded) => outcome.comments_loaded += loaded,
            Err(e) => {
                log::error!("{}", e);
                outcome.comment_failures += 1;
            }
        }
    }

    log::info!(
        "r/{}: {} posts, {} comments loaded",
        forum,
        outcome.posts_loaded,
        outcome.comments_loaded
    );
    Ok(outcome)
}

/// Fetch, clean and load the replies of one loaded post.
async fn process_comments(
    config: &Config,
    source: &dyn ForumSource,
    warehouse: &dyn Warehouse,
    forum: &str,
    post: &PostRow,
    now: DateTime<Utc>,
) -> Result<usize> {
    let raw = extract_comments(source, forum, &post.id, &config.extraction, now)
        .await
        .map_err(|e| AppError::stage(forum, Stage::FetchComments, e))?;
    if raw.is_empty() {
        log::debug!("No new comments on post {}.", post.id);
        return Ok(0);
    }

    let comments =
        clean_comments(raw).map_err(|e| AppError::stage(forum, Stage::CleanComments, e))?;
    if comments.is_empty() {
        return Ok(0);
    }

    load_rows(warehouse, &comments)
        .await
        .map_err(|e| AppError::stage(forum, Stage::LoadComments, e))?;
    Ok(comments.len())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::pipeline::fixtures::{ScriptedSource, at, raw_comment, raw_post};
    use crate::storage::LocalWarehouse;

    fn now() -> DateTime<Utc> {
        at(1_714_564_800)
    }

    fn config(forums: &[&str]) -> Config {
        Config {
            forums: forums.iter().map(|f| f.to_string()).collect(),
            ..Config::default()
        }
    }

    fn warehouse(tmp: &TempDir) -> LocalWarehouse {
        LocalWarehouse::new(tmp.path(), "reddit_data")
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::FetchPosts.to_string(), "FETCH_POSTS");
        assert_eq!(Stage::LoadComments.to_string(), "LOAD_COMMENTS");
    }

    #[tokio::test]
    async fn loads_only_recent_posts_with_titles() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let source = ScriptedSource::new()
            .with_pages(
                "rust",
                vec![vec![
                    raw_post("valid", "Hello", now() - Duration::hours(1)),
                    raw_post("blank", "  ", now() - Duration::hours(2)),
                    raw_post("old", "Stale", now() - Duration::hours(25)),
                ]],
            )
            .with_comments(
                "valid",
                vec![
                    raw_comment("c1", "Nice\npost", now() - Duration::minutes(30)),
                    raw_comment("c2", "", now() - Duration::minutes(20)),
                ],
            );

        let summary = run_pipeline(&config(&["rust"]), &source, &warehouse, now())
            .await
            .unwrap();

        assert_eq!(summary.forums[0].posts_extracted, 2);
        assert_eq!(summary.posts_loaded(), 1);
        assert_eq!(summary.comments_loaded(), 1);
        assert!(summary.failures.is_empty());

        let posts = warehouse.read_rows("posts").await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["id"], "valid");
        assert_eq!(posts[0]["subreddit"], "rust");

        let comments = warehouse.read_rows("comments").await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["body"], "Nice post");
        assert_eq!(comments[0]["post_id"], "valid");
        assert_eq!(comments[0]["subreddit"], "rust");

        assert_eq!(source.comment_requests(), vec!["valid"]);
    }

    #[tokio::test]
    async fn failing_forum_does_not_stop_the_next() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let source = ScriptedSource::new()
            .failing_forum("broken")
            .with_pages("rust", vec![vec![raw_post("p", "Kept", now())]]);

        let summary = run_pipeline(&config(&["broken", "rust"]), &source, &warehouse, now())
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("FETCH_POSTS"));
        assert!(summary.failures[0].contains("broken"));
        assert_eq!(summary.posts_loaded(), 1);
        assert_eq!(warehouse.read_rows("posts").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clean_failure_is_reported_with_stage() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let mut bad = raw_post("p", "Title", now());
        bad.score = json!("many");
        let source = ScriptedSource::new().with_pages("rust", vec![vec![bad]]);

        let summary = run_pipeline(&config(&["rust"]), &source, &warehouse, now())
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("CLEAN_POSTS"));
        assert!(warehouse.read_rows("posts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_failure_keeps_other_posts() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let source = ScriptedSource::new()
            .with_pages(
                "rust",
                vec![vec![
                    raw_post("a", "First", now()),
                    raw_post("b", "Second", now() - Duration::minutes(1)),
                ]],
            )
            .failing_post("a")
            .with_comments("b", vec![raw_comment("c", "reply", now())]);

        let summary = run_pipeline(&config(&["rust"]), &source, &warehouse, now())
            .await
            .unwrap();

        assert!(summary.failures.is_empty());
        assert_eq!(summary.posts_loaded(), 2);
        assert_eq!(summary.comments_loaded(), 1);
        assert_eq!(summary.comment_failures(), 1);
    }

    #[tokio::test]
    async fn empty_forum_skips_comment_work() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let source = ScriptedSource::new()
            .with_pages("quiet", vec![vec![raw_post("old", "Old", now() - Duration::days(3))]]);

        let summary = run_pipeline(&config(&["quiet"]), &source, &warehouse, now())
            .await
            .unwrap();

        assert_eq!(summary.forums.len(), 1);
        assert_eq!(summary.forums[0].posts_extracted, 0);
        assert!(source.comment_requests().is_empty());
        assert!(warehouse.read_rows("posts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_append_duplicates() {
        let tmp = TempDir::new().unwrap();
        let warehouse = warehouse(&tmp);
        let source =
            ScriptedSource::new().with_pages("rust", vec![vec![raw_post("p", "Again", now())]]);
        let config = config(&["rust"]);

        run_pipeline(&config, &source, &warehouse, now()).await.unwrap();
        run_pipeline(&config, &source, &warehouse, now()).await.unwrap();

        assert_eq!(warehouse.read_rows("posts").await.unwrap().len(), 2);
        assert_eq!(warehouse.table_names().await.unwrap(), vec!["comments", "posts"]);
    }
}
