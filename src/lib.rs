// src/lib.rs

//! Subreddit ETL Library
//!
//! Pulls recent posts and comments from a set of forums, cleans them into
//! fixed-schema rows and appends them to a warehouse.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
