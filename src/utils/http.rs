// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::Result;

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Create a configured asynchronous HTTP client.
pub fn create_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Describe a failed response as `HTTP <status>: <body excerpt>`.
pub async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", truncate(body, MAX_ERROR_BODY))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abcdef", 3), "abc");
    }
}
