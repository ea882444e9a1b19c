//! Minimal secret-substitution templates.
//!
//! Literal text passes through untouched.  The only action understood is a
//! secret lookup, in either spelling:
//!
//! ```text
//! password = {{ .Get "app/db/password" }}
//! user     = {{ get "app/db/user" }}
//! ```

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use secretsfs_core::FsError;

static GET_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:\.Get|get)\s+"((?:[^"\\]|\\.)*)"\s*$"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Get(String),
}

/// Split `src` into literal text and secret lookups.
pub fn parse(src: &str) -> Result<Vec<Segment<'_>>, FsError> {
    let mut segments = Vec::new();
    let mut rest = src;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| FsError::Configuration("unterminated template action".to_string()))?;
        let action = &after[..close];
        let caps = GET_ACTION.captures(action).ok_or_else(|| {
            FsError::Configuration(format!("unsupported template action '{}'", action.trim()))
        })?;
        segments.push(Segment::Get(unescape(&caps[1])));
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(next) = chars.next()
        {
            out.push(next);
        } else {
            out.push(c);
        }
    }
    out
}

/// Render `src`, resolving each lookup through `get` in order.
///
/// The first failing lookup fails the whole render.
pub async fn render<F, Fut>(src: &str, mut get: F) -> Result<Vec<u8>, FsError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, FsError>>,
{
    let mut out = Vec::with_capacity(src.len());
    for segment in parse(src)? {
        match segment {
            Segment::Text(text) => out.extend_from_slice(text.as_bytes()),
            Segment::Get(path) => out.extend_from_slice(&get(path).await?),
        }
    }
    Ok(out)
}
