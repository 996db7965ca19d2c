//! Service layer for the ETL job.
//!
//! This module contains the clients for external systems:
//! - Discussion API access (`RedditClient`, behind `ForumSource`)
//! - Google API tokens (`GoogleAuth`)
//! - Secret retrieval (`SecretClient`)

pub mod auth;
mod reddit;
mod secrets;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ListingPage, RawComment, RawPost};

pub use auth::GoogleAuth;
pub use reddit::{CommentTree, RedditClient, parse_post_listing};
pub use secrets::{SecretClient, decode_payload};

/// Read access to a discussion platform.
#[async_trait]
pub trait ForumSource: Send + Sync {
    /// One page of a forum's posts, newest first.
    ///
    /// `after` is the cursor returned with the previous page.
    async fn new_posts_page(&self, forum: &str, after: Option<&str>)
    -> Result<ListingPage<RawPost>>;

    /// Every reply attached to a post, with "load more" placeholders
    /// resolved. Order is not guaranteed.
    async fn post_comments(&self, post_id: &str) -> Result<Vec<RawComment>>;
}
