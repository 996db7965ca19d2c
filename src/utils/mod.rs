//! Utility functions and helpers.

pub mod http;

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Strip a `t1_`/`t3_` style type prefix from a fullname.
pub fn short_id(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.len() == 2 && kind.starts_with('t') => id,
        _ => fullname,
    }
}
