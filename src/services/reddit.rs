// src/services/reddit.rs

//! Reddit API adapter.
//!
//! Authenticates with the application-only OAuth flow and exposes the two
//! reads the pipeline needs: the newest-first post listing of a subreddit
//! and the fully expanded comment tree of a post.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::ForumSource;
use super::auth::AccessToken;
use crate::error::{AppError, Result};
use crate::models::{ListingPage, RawComment, RawPost, SourceConfig};
use crate::utils::http::{create_client, describe_failure};
use crate::utils::{join_url, short_id};

/// Maximum comment ids accepted by one `morechildren` call.
const MORE_CHILDREN_BATCH: usize = 100;

/// Comments requested with the initial tree.
const COMMENT_LIMIT: &str = "500";

/// Reddit API client.
pub struct RedditClient {
    client: Client,
    config: SourceConfig,
    token: RwLock<Option<AccessToken>>,
    last_request: Mutex<Option<Instant>>,
}

impl RedditClient {
    /// Create a client; fails when credentials are missing.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(AppError::auth("source client id is not configured"));
        }
        if config.client_secret.is_empty() {
            return Err(AppError::auth("source client secret is not configured"));
        }

        let client = create_client(&config.user_agent, config.timeout_secs)?;
        Ok(Self {
            client,
            config: config.clone(),
            token: RwLock::new(None),
            last_request: Mutex::new(None),
        })
    }

    /// Fetch a token now so bad credentials fail before any forum is read.
    pub async fn authenticate(&self) -> Result<()> {
        self.bearer().await.map(|_| ())
    }

    async fn bearer(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.token.clone());
            }
        }

        log::debug!("Requesting Reddit access token");
        let response = self
            .client
            .post(&self.config.auth_url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::auth(format!(
                "token request rejected: {}",
                describe_failure(response).await
            )));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            return Err(AppError::auth(format!("token request rejected: {error}")));
        }
        let token = AccessToken::from_response(serde_json::from_value(body)?, now);
        let bearer = token.token.clone();
        *self.token.write().await = Some(token);
        Ok(bearer)
    }

    /// Space requests out by the configured delay.
    async fn pace(&self) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET an API path and decode the JSON body.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = join_url(&self.config.api_base, path);
        let bearer = self.bearer().await?;
        self.pace().await;

        log::debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(query)
            .query(&[("raw_json", "1")])
            .send()
            .await
            .map_err(|e| AppError::source(&url, e))?;

        if !response.status().is_success() {
            return Err(AppError::source(&url, describe_failure(response).await));
        }

        let wait = rate_limit_wait(&response);
        let body = response.json().await.map_err(|e| AppError::source(&url, e))?;
        if let Some(wait) = wait {
            log::warn!("Rate limit exhausted, sleeping {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        Ok(body)
    }

    /// Resolve "load more" placeholders until the tree is complete.
    async fn expand(&self, post_id: &str, tree: &mut CommentTree) -> Result<()> {
        let link_id = format!("t3_{post_id}");
        let mut requested: HashSet<String> = HashSet::new();
        let mut expanded_threads: HashSet<String> = HashSet::new();

        loop {
            let pending: Vec<String> = tree
                .take_pending()
                .into_iter()
                .filter(|id| requested.insert(id.clone()))
                .collect();
            let threads: Vec<String> = tree
                .take_threads()
                .into_iter()
                .filter(|id| expanded_threads.insert(id.clone()))
                .collect();

            if pending.is_empty() && threads.is_empty() {
                return Ok(());
            }

            for batch in pending.chunks(MORE_CHILDREN_BATCH) {
                let children = batch.join(",");
                let body = self
                    .get_json(
                        "/api/morechildren",
                        &[
                            ("api_type", "json"),
                            ("link_id", link_id.as_str()),
                            ("children", children.as_str()),
                            ("limit_children", "false"),
                        ],
                    )
                    .await?;
                let things = body
                    .pointer("/json/data/things")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                log::debug!(
                    "morechildren for {}: {} ids requested, {} things returned",
                    post_id,
                    batch.len(),
                    things.len()
                );
                tree.add_things(&things)?;
            }

            for comment_id in threads {
                let path = format!("/comments/{post_id}/_/{comment_id}");
                let body = self.get_json(&path, &[("limit", COMMENT_LIMIT)]).await?;
                tree.add_thread_response(&body)?;
            }
        }
    }
}

#[async_trait]
impl ForumSource for RedditClient {
    async fn new_posts_page(
        &self,
        forum: &str,
        after: Option<&str>,
    ) -> Result<ListingPage<RawPost>> {
        let path = format!("/r/{forum}/new");
        let limit = self.config.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", limit.as_str())];
        if let Some(after) = after {
            query.push(("after", after));
        }

        let body = self.get_json(&path, &query).await?;
        parse_post_listing(&body)
    }

    async fn post_comments(&self, post_id: &str) -> Result<Vec<RawComment>> {
        let path = format!("/comments/{post_id}");
        let body = self.get_json(&path, &[("limit", COMMENT_LIMIT)]).await?;

        let mut tree = CommentTree::default();
        tree.add_thread_response(&body)?;
        self.expand(post_id, &mut tree).await?;
        Ok(tree.into_comments())
    }
}

/// Sleep duration requested by the rate-limit headers, if the quota is spent.
fn rate_limit_wait(response: &Response) -> Option<Duration> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    let remaining = header("x-ratelimit-remaining")?;
    if remaining >= 1.0 {
        return None;
    }
    let reset = header("x-ratelimit-reset").unwrap_or(1.0).max(1.0);
    Some(Duration::from_secs_f64(reset))
}

/// Decode a `Listing` of `t3` things.
pub fn parse_post_listing(body: &Value) -> Result<ListingPage<RawPost>> {
    let data = body
        .get("data")
        .ok_or_else(|| AppError::source("listing", "response has no data"))?;

    let mut items = Vec::new();
    for child in data
        .get("children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        if child.get("kind").and_then(Value::as_str) != Some("t3") {
            continue;
        }
        if let Some(post) = child.get("data") {
            items.push(serde_json::from_value(post.clone())?);
        }
    }

    let after = data
        .get("after")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ListingPage { items, after })
}

/// Accumulates a flattened comment tree and the placeholders still to expand.
#[derive(Debug, Default)]
pub struct CommentTree {
    comments: Vec<RawComment>,
    seen: HashSet<String>,
    /// Comment ids behind "load more" placeholders
    pending: Vec<String>,
    /// Parent comment ids behind "continue this thread" placeholders
    threads: Vec<String>,
}

impl CommentTree {
    /// Add the body of a `/comments/{id}` response (`[post, comments]`).
    pub fn add_thread_response(&mut self, body: &Value) -> Result<()> {
        let listing = body
            .as_array()
            .and_then(|parts| parts.get(1))
            .ok_or_else(|| AppError::source("comments", "unexpected comment response shape"))?;
        self.add_listing(listing)
    }

    /// Add every thing of a `Listing`, recursing into replies.
    pub fn add_listing(&mut self, listing: &Value) -> Result<()> {
        let children = listing
            .pointer("/data/children")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.add_things(children)
    }

    /// Add a flat list of things (`t1` comments and `more` placeholders).
    pub fn add_things(&mut self, things: &[Value]) -> Result<()> {
        for thing in things {
            let Some(data) = thing.get("data") else {
                continue;
            };
            match thing.get("kind").and_then(Value::as_str) {
                Some("t1") => {
                    let comment: RawComment = serde_json::from_value(data.clone())?;
                    if self.seen.insert(comment.id.clone()) {
                        self.comments.push(comment);
                    }
                    if let Some(replies) = data.get("replies").filter(|r| r.is_object()) {
                        self.add_listing(replies)?;
                    }
                }
                Some("more") => self.add_more(data),
                _ => {}
            }
        }
        Ok(())
    }

    fn add_more(&mut self, data: &Value) {
        let children: Vec<String> = data
            .get("children")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if children.is_empty() {
            // "continue this thread": the subtree hangs off the parent comment
            if let Some(parent) = data.get("parent_id").and_then(Value::as_str) {
                if parent.starts_with("t1_") {
                    self.threads.push(short_id(parent).to_string());
                }
            }
        } else {
            self.pending
                .extend(children.into_iter().filter(|id| !self.seen.contains(id)));
        }
    }

    fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    fn take_threads(&mut self) -> Vec<String> {
        std::mem::take(&mut self.threads)
    }

    /// Whether placeholders remain unresolved.
    #[cfg(test)]
    fn has_placeholders(&self) -> bool {
        !self.pending.is_empty() || !self.threads.is_empty()
    }

    pub fn into_comments(self) -> Vec<RawComment> {
        self.comments
    }
}
