//! Sub-response parsing.
//!
//! Each block looks like:
//!
//! ```text
//! Content-Type: application/http
//! Content-ID: <response-item-N>
//!
//! HTTP/1.1 200 OK
//! Content-Type: application/json; charset=UTF-8
//! ETag: "..."
//!
//! {...}
//! ```
//!
//! The first three lines are the wrapper; everything after is a literal
//! HTTP/1.1 response.

use super::decode::SubResponseBlock;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static CONTENT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Content-ID:\s*<response-item-(\d+)>").expect("static regex")
});

/// Prefix of the boundaries batch servers generate. Always checked, alongside
/// the learned boundary when there is one.
const BATCH_BOUNDARY_PREFIX: &str = "--batch";

/// One embedded HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubResponse {
    /// Position of the originating call inside its batch.
    pub content_id: Option<usize>,
    pub protocol_version: Option<String>,
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ParsedSubResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a block; `Ok(None)` means the block was too short and is skipped.
pub fn parse_sub_response(block: &SubResponseBlock) -> Result<Option<ParsedSubResponse>> {
    let lines = split_lines(&block.text);
    if lines.len() < 3 {
        debug!(lines = lines.len(), "skipping short multipart block");
        return Ok(None);
    }

    let mut parsed = parse_http_response(&block.text, &lines[3..]);
    parsed.content_id = CONTENT_ID
        .captures(lines[1].text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let learned = block.boundary.as_deref();
    if let Some(body) = parsed.body.as_deref() {
        if leaks_boundary(body, learned) {
            warn!(content_id = ?parsed.content_id, "boundary marker inside sub-response body");
            return Err(Error::framing_with_context(
                "sub-response body contains a batch boundary marker",
                ErrorContext::new()
                    .with_field_path(format!(
                        "response-item-{}",
                        parsed
                            .content_id
                            .map(|i| i.to_string())
                            .unwrap_or_else(|| "?".into())
                    ))
                    .with_details(learned.unwrap_or(BATCH_BOUNDARY_PREFIX).to_string())
                    .with_source("sub_response_parser"),
            ));
        }
    }
    Ok(Some(parsed))
}

/// A leaked delimiter always starts a line; mid-line occurrences are content.
/// Lines starting with the learned boundary or with `--batch` both count.
fn leaks_boundary(body: &str, learned: Option<&str>) -> bool {
    body.lines().map(str::trim_start).any(|line| {
        learned.is_some_and(|b| !b.is_empty() && line.starts_with(b))
            || line.starts_with(BATCH_BOUNDARY_PREFIX)
    })
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    /// Line content without its `\r\n` / `\n` terminator.
    text: &'a str,
    /// Byte offset just past the terminator.
    end: usize,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut start = 0;
    text.split('\n')
        .map(|raw| {
            start = (start + raw.len() + 1).min(text.len());
            Line {
                text: raw.strip_suffix('\r').unwrap_or(raw),
                end: start,
            }
        })
        .collect()
}

/// Status line, headers up to the first blank line, then the body.
///
/// The body is sliced out of `text` untouched, minus the single line break
/// that precedes the next boundary.
fn parse_http_response(text: &str, lines: &[Line<'_>]) -> ParsedSubResponse {
    let mut iter = lines.iter();
    let ((protocol_version, status_code, status_message), mut body_start) = match iter.next() {
        Some(line) => (parse_status_line(line.text), line.end),
        None => ((None, None, None), text.len()),
    };

    let mut headers = Vec::new();
    for line in iter {
        body_start = line.end;
        if line.text.is_empty() {
            break;
        }
        if let Some((name, value)) = line.text.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let rest = &text[body_start..];
    let body = rest
        .strip_suffix("\r\n")
        .or_else(|| rest.strip_suffix('\n'))
        .unwrap_or(rest);
    ParsedSubResponse {
        content_id: None,
        protocol_version,
        status_code,
        status_message,
        headers,
        body: (!body.trim().is_empty()).then(|| body.to_string()),
    }
}

fn parse_status_line(line: &str) -> (Option<String>, Option<u16>, Option<String>) {
    let mut parts = line.trim().splitn(3, ' ');
    let version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .map(str::to_string);
    if version.is_none() {
        return (None, None, None);
    }
    let code = parts.next().and_then(|c| c.parse().ok());
    let message = parts
        .next()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    (version, code, message)
}
