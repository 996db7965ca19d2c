// src/pipeline/clean.rs

//! Cleaning stage: turn raw records into warehouse-shaped rows.
//!
//! Per record, in order:
//! 1. Missing author becomes [`DELETED_AUTHOR`].
//! 2. Records whose primary text (post title, comment body) is missing or
//!    blank after trimming are dropped.
//! 3. Numeric and boolean fields are coerced to their column types.
//! 4. The creation timestamp is parsed into a UTC instant.
//! 5. Free text has line breaks replaced by spaces and is trimmed.
//!
//! A record that fails step 3 or 4 fails the whole batch.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{CommentRow, DELETED_AUTHOR, PostRow, RawComment, RawPost, timestamp};

/// Clean a batch of posts. Order of the surviving posts is preserved.
pub fn clean_posts(raw: Vec<RawPost>) -> Result<Vec<PostRow>> {
    let total = raw.len();
    let rows = raw
        .into_iter()
        .filter_map(|post| clean_post(post).transpose())
        .collect::<Result<Vec<_>>>()?;

    if rows.len() < total {
        log::debug!("Dropped {} posts with empty titles", total - rows.len());
    }
    Ok(rows)
}

/// Clean a batch of comments. Order of the surviving comments is preserved.
pub fn clean_comments(raw: Vec<RawComment>) -> Result<Vec<CommentRow>> {
    let total = raw.len();
    let rows = raw
        .into_iter()
        .filter_map(|comment| clean_comment(comment).transpose())
        .collect::<Result<Vec<_>>>()?;

    if rows.len() < total {
        log::debug!("Dropped {} comments with empty bodies", total - rows.len());
    }
    Ok(rows)
}

/// Replace every line break with a space, then trim.
pub fn normalize_text(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// `Ok(None)` when the post is dropped for having no title.
fn clean_post(post: RawPost) -> Result<Option<PostRow>> {
    let Some(title) = non_blank(post.title) else {
        return Ok(None);
    };
    let id = post.id;

    Ok(Some(PostRow {
        score: coerce_int(&id, "score", &post.score)?,
        num_comments: coerce_int(&id, "num_comments", &post.num_comments)?,
        upvote_ratio: coerce_float(&id, "upvote_ratio", &post.upvote_ratio)?,
        over_18: coerce_bool(&id, "over_18", &post.over_18)?,
        created_utc: parse_created(&id, &post.created_utc)?,
        title: normalize_text(&title),
        selftext: normalize_text(post.selftext.as_deref().unwrap_or_default()),
        author: post.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        subreddit: post.subreddit.unwrap_or_default(),
        url: post.url,
        id,
    }))
}

/// `Ok(None)` when the comment is dropped for having no body.
fn clean_comment(comment: RawComment) -> Result<Option<CommentRow>> {
    let Some(body) = non_blank(comment.body) else {
        return Ok(None);
    };
    let id = comment.id;

    Ok(Some(CommentRow {
        score: coerce_int(&id, "score", &comment.score)?,
        created_utc: parse_created(&id, &comment.created_utc)?,
        body: normalize_text(&body),
        author: comment.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        post_id: comment.post_id,
        parent_id: comment.parent_id,
        subreddit: comment.subreddit.unwrap_or_default(),
        id,
    }))
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

fn parse_created(id: &str, value: &Value) -> Result<DateTime<Utc>> {
    timestamp::parse_value(value).map_err(|e| AppError::coercion(id, "created_utc", e))
}

/// Integers pass through, finite floats truncate toward zero, numeric
/// strings are parsed, null becomes 0.
fn coerce_int(id: &str, field: &str, value: &Value) -> Result<i64> {
    let fail = |message: String| AppError::coercion(id, field, message);

    match value {
        Value::Null => Ok(0),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| fail(format!("{n} does not fit an integer")))
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                        .map(|f| f.trunc() as i64)
                })
                .ok_or_else(|| fail(format!("'{s}' is not a number")))
        }
        other => Err(fail(format!("unexpected value {other}"))),
    }
}

/// Null stays null; numbers and numeric strings become floats.
fn coerce_float(id: &str, field: &str, value: &Value) -> Result<Option<f64>> {
    let fail = |message: String| AppError::coercion(id, field, message);

    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => return Err(fail(format!("unexpected value {other}"))),
    };
    parsed
        .filter(|f| f.is_finite())
        .map(Some)
        .ok_or_else(|| fail(format!("{value} is not a finite number")))
}

/// Booleans pass through; null is false; 0/1 and "true"/"false" are accepted.
fn coerce_bool(id: &str, field: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(AppError::coercion(
            id,
            field,
            format!("{other} is not a boolean"),
        )),
    }
}
