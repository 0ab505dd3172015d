//! Recovery of structured caption records from free-form model output.
//!
//! Vision and text models asked for JSON routinely wrap it in markdown
//! fences, surround it with prose, emit several objects, or ignore the
//! format entirely. [`normalize`] turns any of that into a
//! [`NormalizedCaption`] and never fails: structure degrades, content is
//! kept.
//!
//! Attempts, first success wins:
//!
//! 1. the contents of each fenced code block, in order, then the whole text;
//! 2. for each candidate text, a full JSON parse, then every balanced
//!    `{...}` span located by a string-aware brace tokenizer, left to right
//!    and outermost first (a second, string-unaware pass catches objects
//!    hidden behind a stray quote);
//! 3. otherwise a record is constructed from the text itself, with entities
//!    picked out by a handful of heuristics.
//!
//! Text trailing the parsed object is preserved as `additional_notes`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub const KEY_ANALYSIS: &str = "analysis";
pub const KEY_ADDITIONAL_NOTES: &str = "additional_notes";
pub const KEY_ORIGINAL_LENGTH: &str = "original_length";
pub const KEY_ERROR: &str = "error";
pub const KEY_ORIGINAL_CONTENT: &str = "original_content";

/// `analysis` value on records constructed without a parseable object.
pub const PARTIAL_EXTRACTION: &str = "Content processed with partial extraction";
/// Description used when there is no text at all to describe.
pub const NO_ANALYSIS: &str = "Content processed but no analysis available";

const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_BACKFILL_DESCRIPTION_CHARS: usize = 200;
const MAX_NOTES_CHARS: usize = 200;
const MAX_ERROR_MESSAGE_CHARS: usize = 100;
const MAX_ERROR_CONTENT_CHARS: usize = 300;
const MAX_MATCHES_PER_PATTERN: usize = 5;
const MAX_ENTITIES: usize = 10;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\S\n]*\n?(.*?)```").expect("valid regex"));

static ENTITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Capitalised word sequences ("New York Times")
        r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b",
        // Currency amounts
        r"\$[\d,]+\.?\d*",
        // Dates like 12/31/2024 or 1-2-24
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        // Acronyms
        r"\b[A-Z]{2,}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// A caption record with the two required keys typed and everything else
/// (model-supplied or added during recovery) kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCaption {
    pub description: String,
    pub entities: Vec<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NormalizedCaption {
    pub fn analysis(&self) -> Option<&str> {
        self.fields.get(KEY_ANALYSIS).and_then(Value::as_str)
    }

    pub fn additional_notes(&self) -> Option<&str> {
        self.fields.get(KEY_ADDITIONAL_NOTES).and_then(Value::as_str)
    }

    pub fn original_length(&self) -> Option<u64> {
        self.fields.get(KEY_ORIGINAL_LENGTH).and_then(Value::as_u64)
    }

    pub fn original_content(&self) -> Option<&str> {
        self.fields.get(KEY_ORIGINAL_CONTENT).and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.fields
            .get(KEY_ERROR)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// How the record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A JSON object was found in the output.
    Parsed,
    /// No object parsed; the record was built from the raw text.
    Constructed,
    /// Normalisation itself failed; a minimal error record was produced.
    Error,
}

/// Result of [`normalize`].
#[derive(Debug, Clone)]
pub struct Normalized {
    pub caption: NormalizedCaption,
    /// Canonical serialized form handed back to the captioning caller.
    pub json: String,
    pub entity_count: usize,
    pub recovery: Recovery,
}

/// Turn raw model output into a caption record. Never fails.
pub fn normalize(raw: &str) -> Normalized {
    match try_normalize(raw) {
        Ok(normalized) => {
            info!(
                entities = normalized.entity_count,
                recovery = ?normalized.recovery,
                "normalized model output"
            );
            normalized
        }
        Err(e) => error_record(&format!("{:#}", e), raw),
    }
}

fn try_normalize(raw: &str) -> Result<Normalized> {
    let original = raw.trim();

    let found = candidate_texts(original)
        .into_iter()
        .find_map(find_first_object);

    let (caption, recovery) = match found {
        Some((object, extra)) => (from_object(object, extra, original), Recovery::Parsed),
        None => {
            debug!(
                preview = %truncate_chars(original, 100),
                "no JSON object in model output, constructing record"
            );
            (constructed(original), Recovery::Constructed)
        }
    };

    let json = serde_json::to_string(&caption)?;
    Ok(Normalized {
        entity_count: caption.entities.len(),
        caption,
        json,
        recovery,
    })
}

/// Minimal record used when normalisation, or the model call feeding it,
/// fails outright.
pub fn error_record(message: &str, raw: &str) -> Normalized {
    let original_content = if raw.is_empty() {
        "No content available"
    } else {
        truncate_chars(raw, MAX_ERROR_CONTENT_CHARS)
    };
    let mut fields = Map::new();
    fields.insert(KEY_ERROR.to_string(), Value::Bool(true));
    fields.insert(
        KEY_ORIGINAL_CONTENT.to_string(),
        Value::String(original_content.to_string()),
    );
    let caption = NormalizedCaption {
        description: format!(
            "Processing error occurred: {}",
            truncate_chars(message, MAX_ERROR_MESSAGE_CHARS)
        ),
        entities: Vec::new(),
        fields,
    };
    let json = json!({
        "description": caption.description,
        "entities": [],
        KEY_ERROR: true,
        KEY_ORIGINAL_CONTENT: original_content,
    })
    .to_string();
    tracing::error!("caption normalization failed: {}", message);
    Normalized {
        caption,
        json,
        entity_count: 0,
        recovery: Recovery::Error,
    }
}

/// Fenced block contents in order, followed by the full text.
fn candidate_texts(text: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    candidates.push(text);
    candidates
}

/// First JSON object in `text`, plus whatever follows it.
fn find_first_object(text: &str) -> Option<(Map<String, Value>, &str)> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Some((map, ""));
    }
    for string_aware in [true, false] {
        for (start, end) in brace_spans(text, string_aware) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..end]) {
                return Some((map, text[end..].trim()));
            }
        }
    }
    None
}

/// Byte ranges of every balanced `{...}` span, ordered by start position.
///
/// With `string_aware`, braces inside JSON string literals are ignored.
/// Strings are only tracked inside an open brace, so apostrophes and quotes
/// in surrounding prose do not confuse the scan.
fn brace_spans(text: &str, string_aware: bool) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if string_aware && !open.is_empty() => in_string = true,
            '{' => open.push(idx),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, idx + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_by_key(|&(start, end)| (start, std::cmp::Reverse(end)));
    spans
}

fn from_object(mut object: Map<String, Value>, extra: &str, original: &str) -> NormalizedCaption {
    if !extra.is_empty() && !object.contains_key(KEY_ADDITIONAL_NOTES) {
        object.insert(
            KEY_ADDITIONAL_NOTES.to_string(),
            Value::String(truncate_chars(extra, MAX_NOTES_CHARS).to_string()),
        );
    }

    let description = match object.remove("description") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Null) | Some(Value::String(_)) | None => {
            non_empty_or_placeholder(truncate_chars(original, MAX_BACKFILL_DESCRIPTION_CHARS))
        }
        Some(other) => other.to_string(),
    };

    let entities = match object.remove("entities") {
        Some(Value::Array(items)) => items.iter().filter_map(entity_label).collect(),
        Some(single) => entity_label(&single).into_iter().collect(),
        None => Vec::new(),
    };

    NormalizedCaption {
        description,
        entities,
        fields: object,
    }
}

/// Entities arrive as strings, as objects with a name, or as scalars.
fn entity_label(value: &Value) -> Option<String> {
    let label = match value {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        Value::Object(obj) => ["entity_name", "name"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    };
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn constructed(original: &str) -> NormalizedCaption {
    let mut fields = Map::new();
    fields.insert(
        KEY_ANALYSIS.to_string(),
        Value::String(PARTIAL_EXTRACTION.to_string()),
    );
    fields.insert(
        KEY_ORIGINAL_LENGTH.to_string(),
        Value::from(original.chars().count()),
    );
    NormalizedCaption {
        description: non_empty_or_placeholder(truncate_chars(original, MAX_DESCRIPTION_CHARS)),
        entities: heuristic_entities(original),
        fields,
    }
}

/// Up to ten distinct entity-looking tokens, in first-seen order.
pub fn heuristic_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for pattern in ENTITY_PATTERNS.iter() {
        for m in pattern.find_iter(text).take(MAX_MATCHES_PER_PATTERN) {
            let found = m.as_str();
            if !entities.iter().any(|e| e == found) {
                entities.push(found.to_string());
            }
        }
    }
    entities.truncate(MAX_ENTITIES);
    entities
}

fn non_empty_or_placeholder(text: &str) -> String {
    if text.trim().is_empty() {
        NO_ANALYSIS.to_string()
    } else {
        text.to_string()
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
