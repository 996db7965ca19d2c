// src/models/mod.rs

//! Domain models for the ETL job.
//!
//! Raw records come straight from the discussion API; rows are the cleaned,
//! warehouse-shaped form of the same records.

mod comment;
mod config;
mod post;
pub mod timestamp;

// Re-export all public types
pub use comment::{CommentRow, RawComment};
pub use config::{
    Config, ExtractionConfig, Secret, SecretsConfig, SourceConfig, WarehouseConfig,
    parse_forum_list,
};
pub use post::{PostRow, RawPost};

/// Author placeholder used when the author identity is unavailable.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// One page of a newest-first listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage<T> {
    pub items: Vec<T>,
    /// Continuation cursor; `None` on the last page
    pub after: Option<String>,
}
