// src/pipeline/extract.rs

//! Extraction stage: bound the source's listings to the recency window.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{AppError, Result};
use crate::models::{ExtractionConfig, RawComment, RawPost};
use crate::services::ForumSource;

/// Trailing time window used to decide whether a record is new enough.
///
/// A record created exactly at the cutoff is inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    span: TimeDelta,
}

impl RecencyWindow {
    pub fn new(span: TimeDelta) -> Self {
        Self { span }
    }

    pub fn hours(hours: u64) -> Result<Self> {
        i64::try_from(hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .map(Self::new)
            .ok_or_else(|| AppError::config(format!("window of {hours}h is out of range")))
    }

    /// Oldest creation instant still inside the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(self.span).ok_or_else(|| {
            AppError::config(format!("window of {} reaches before the earliest date", self.span))
        })
    }
}

impl TryFrom<&ExtractionConfig> for RecencyWindow {
    type Error = AppError;

    fn try_from(config: &ExtractionConfig) -> Result<Self> {
        Self::hours(config.window_hours)
    }
}

/// Whether a record created at `created` falls inside a window ending now.
pub fn is_recent(created: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    created >= cutoff
}

/// Read a forum's newest-first listing and keep the posts inside the window.
///
/// With `stop_at_first_old` the scan ends at the first post older than the
/// window; this relies on the listing being strictly newest first, and
/// newer posts appearing after an older one are not seen. Without it every
/// page (up to `max_pages`) is read and old posts are filtered out.
///
/// Posts with an unreadable timestamp are kept; cleaning rejects them.
pub async fn extract_posts(
    source: &dyn ForumSource,
    forum: &str,
    config: &ExtractionConfig,
    now: DateTime<Utc>,
) -> Result<Vec<RawPost>> {
    let cutoff = RecencyWindow::try_from(config)?.cutoff(now)?;
    let mut posts = Vec::new();
    let mut after: Option<String> = None;
    let mut skipped = 0usize;

    for page_number in 1..=config.max_pages {
        let page = source.new_posts_page(forum, after.as_deref()).await?;
        log::debug!(
            "r/{}: page {} returned {} posts",
            forum,
            page_number,
            page.items.len()
        );

        for mut post in page.items {
            match post.created_at() {
                Some(created) if !is_recent(created, cutoff) => {
                    if config.stop_at_first_old {
                        log::debug!("r/{}: reached post {} outside window", forum, post.id);
                        return Ok(posts);
                    }
                    skipped += 1;
                    continue;
                }
                Some(_) => {}
                None => log::warn!(
                    "r/{}: post {} has unreadable timestamp {}",
                    forum,
                    post.id,
                    post.created_utc
                ),
            }
            post.subreddit = Some(forum.to_string());
            posts.push(post);
        }

        match page.after {
            Some(cursor) => after = Some(cursor),
            None => return Ok(posts),
        }
    }

    log::warn!(
        "r/{}: stopped after {} pages ({} old posts skipped)",
        forum,
        config.max_pages,
        skipped
    );
    Ok(posts)
}

/// Fetch every reply of a post and keep those inside the window.
///
/// Reply lists are unordered, so old replies are skipped rather than ending
/// the scan. Replies with an unreadable timestamp are kept for cleaning to
/// reject.
pub async fn extract_comments(
    source: &dyn ForumSource,
    forum: &str,
    post_id: &str,
    config: &ExtractionConfig,
    now: DateTime<Utc>,
) -> Result<Vec<RawComment>> {
    let cutoff = RecencyWindow::try_from(config)?.cutoff(now)?;
    let replies = source.post_comments(post_id).await?;
    let total = replies.len();

    let comments: Vec<RawComment> = replies
        .into_iter()
        .filter(|c| c.created_at().is_none_or(|created| is_recent(created, cutoff)))
        .map(|mut c| {
            c.post_id = post_id.to_string();
            if c.subreddit.as_deref().is_none_or(str::is_empty) {
                c.subreddit = Some(forum.to_string());
            }
            c
        })
        .collect();

    log::debug!(
        "r/{}: post {} has {} replies, {} inside window",
        forum,
        post_id,
        total,
        comments.len()
    );
    Ok(comments)
}
