//! Scripted in-memory source for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{ListingPage, RawComment, RawPost};
use crate::services::ForumSource;

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn raw_post(id: &str, title: &str, created: DateTime<Utc>) -> RawPost {
    RawPost {
        id: id.to_string(),
        title: Some(title.to_string()),
        selftext: Some(String::new()),
        author: Some("alice".to_string()),
        created_utc: json!(created.timestamp()),
        score: json!(5),
        num_comments: json!(1),
        subreddit: Some("placeholder".to_string()),
        url: Some(format!("https://example.com/{id}")),
        upvote_ratio: json!(0.75),
        over_18: json!(false),
    }
}

pub fn raw_comment(id: &str, body: &str, created: DateTime<Utc>) -> RawComment {
    RawComment {
        id: id.to_string(),
        post_id: String::new(),
        parent_id: None,
        body: Some(body.to_string()),
        author: Some("bob".to_string()),
        created_utc: json!(created.timestamp()),
        score: json!(2),
        subreddit: None,
    }
}

/// Serves canned pages and replies, and records what was asked for.
#[derive(Default)]
pub struct ScriptedSource {
    pages: HashMap<String, Vec<Vec<RawPost>>>,
    comments: HashMap<String, Vec<RawComment>>,
    failing_forums: HashSet<String>,
    failing_posts: HashSet<String>,
    page_requests: Mutex<usize>,
    comment_requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, forum: &str, pages: Vec<Vec<RawPost>>) -> Self {
        self.pages.insert(forum.to_string(), pages);
        self
    }

    pub fn with_comments(mut self, post_id: &str, comments: Vec<RawComment>) -> Self {
        self.comments.insert(post_id.to_string(), comments);
        self
    }

    pub fn failing_forum(mut self, forum: &str) -> Self {
        self.failing_forums.insert(forum.to_string());
        self
    }

    pub fn failing_post(mut self, post_id: &str) -> Self {
        self.failing_posts.insert(post_id.to_string());
        self
    }

    pub fn page_requests(&self) -> usize {
        *self.page_requests.lock().unwrap()
    }

    pub fn comment_requests(&self) -> Vec<String> {
        self.comment_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForumSource for ScriptedSource {
    async fn new_posts_page(
        &self,
        forum: &str,
        after: Option<&str>,
    ) -> Result<ListingPage<RawPost>> {
        *self.page_requests.lock().unwrap() += 1;
        if self.failing_forums.contains(forum) {
            return Err(AppError::source(forum, "scripted failure"));
        }

        let pages = self.pages.get(forum).cloned().unwrap_or_default();
        let index = match after {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| AppError::source(forum, format!("bad cursor {cursor}")))?,
        };

        let items = pages.get(index).cloned().unwrap_or_default();
        let after = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ListingPage { items, after })
    }

    async fn post_comments(&self, post_id: &str) -> Result<Vec<RawComment>> {
        self.comment_requests
            .lock()
            .unwrap()
            .push(post_id.to_string());
        if self.failing_posts.contains(post_id) {
            return Err(AppError::source(post_id, "scripted failure"));
        }
        Ok(self.comments.get(post_id).cloned().unwrap_or_default())
    }
}
