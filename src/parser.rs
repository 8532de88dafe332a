//! Turns model output into segments
//!
//! The model is asked for `{"list": [{"title": ..., "content": ...}]}` but
//! may wrap it in a markdown fence or surround it with prose. Entries
//! missing a title or content are dropped; a missing `list` fails the
//! whole response.

use crate::segment::{Segment, SegmentId};
use serde_json::Value;
use thiserror::Error;

/// Characters of the raw response kept in error messages
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object found in response: {0}")]
    NoJson(String),

    #[error("response JSON has no `list` array")]
    MissingList,
}

/// Extract a JSON object from model response text.
///
/// Tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from ```json ... ``` or ``` ... ``` fenced block
/// 3. Find the first `{` to last `}` span and parse that
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// Body of the first fenced block, with any info string (`json`) skipped
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    body.find("```").map(|end| &body[..end])
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

fn non_empty_str<'a>(entry: &'a Value, field: &str) -> Option<&'a str> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse a model response into fresh segments under `parent_id`.
///
/// An empty `list` is valid and yields no segments.
pub fn parse_segments(raw: &str, parent_id: Option<SegmentId>) -> Result<Vec<Segment>, ParseError> {
    let parsed = extract_json(raw).ok_or_else(|| ParseError::NoJson(preview(raw)))?;
    let list = parsed
        .get("list")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingList)?;

    let segments = list
        .iter()
        .filter_map(|entry| {
            let title = non_empty_str(entry, "title")?;
            let content = non_empty_str(entry, "content")?;
            Some(Segment {
                id: SegmentId::new(),
                title: title.to_string(),
                content: content.to_string(),
                parent_id,
            })
        })
        .collect();

    Ok(segments)
}
