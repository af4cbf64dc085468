//! Intake feed contracts + file-backed feed implementations.
//!
//! A feed hands the sync pass one payload: the exact raw bytes it fetched
//! (kept for the archive) plus the rows it could lift out of them. Row
//! extraction is deliberately forgiving — spreadsheet exports rename columns,
//! retype them, and pad the tail with blank rows, and none of that should
//! stop a sync pass. Field *content* is passed through untouched; deciding
//! what a date or an email means is the normalizer's job, not the feed's.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evreq_core::IntakeRow;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "evreq-intake";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Per-pass context handed to every feed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

/// One fetched feed payload: raw bytes for the archive, parsed rows for the
/// reconciler, and a count of elements that were dropped as blank or
/// structurally unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePayload {
    pub feed_id: String,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    pub raw: String,
    pub rows: Vec<IntakeRow>,
    pub skipped_rows: usize,
}

#[async_trait]
pub trait IntakeFeed: Send + Sync {
    fn feed_id(&self) -> &str;

    async fn fetch_rows(&self, ctx: &FeedContext) -> Result<IntakePayload, IntakeError>;
}

/// Registry of configured feeds, loaded from `feeds.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRegistry {
    pub feeds: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub feed_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub mode: String,
    pub path: PathBuf,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn load_feed_registry(path: impl AsRef<Path>) -> anyhow::Result<FeedRegistry> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Build the feed implementation a registry entry names.
pub fn feed_from_entry(entry: &FeedEntry) -> Result<Box<dyn IntakeFeed>, IntakeError> {
    match entry.mode.as_str() {
        "file" => Ok(Box::new(FileFeed::new(&entry.feed_id, &entry.path))),
        other => Err(IntakeError::Message(format!(
            "no feed implementation registered for mode {other:?} (feed {})",
            entry.feed_id
        ))),
    }
}

/// Feed backed by a JSON document on disk — a spreadsheet export, or a
/// captured fixture of one. Accepts either a bare array of row objects or an
/// object wrapping them under `"rows"`.
#[derive(Debug, Clone)]
pub struct FileFeed {
    feed_id: String,
    path: PathBuf,
}

impl FileFeed {
    pub fn new(feed_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            feed_id: feed_id.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl IntakeFeed for FileFeed {
    fn feed_id(&self) -> &str {
        &self.feed_id
    }

    async fn fetch_rows(&self, ctx: &FeedContext) -> Result<IntakePayload, IntakeError> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))
            .map_err(IntakeError::Anyhow)?;
        let (rows, skipped_rows) = parse_rows(&raw)?;
        Ok(IntakePayload {
            feed_id: self.feed_id.clone(),
            content_type: "application/json".to_string(),
            fetched_at: ctx.fetched_at,
            raw,
            rows,
            skipped_rows,
        })
    }
}

/// Lift rows out of a raw JSON payload. Returns the parsed rows and how many
/// elements were dropped (blank padding rows, non-object elements).
pub fn parse_rows(raw: &str) -> Result<(Vec<IntakeRow>, usize), IntakeError> {
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|e| IntakeError::Message(format!("invalid intake payload JSON: {e}")))?;

    let elements = match &value {
        JsonValue::Array(items) => items.as_slice(),
        JsonValue::Object(map) => match map.get("rows") {
            Some(JsonValue::Array(items)) => items.as_slice(),
            _ => {
                return Err(IntakeError::Message(
                    "intake payload object has no \"rows\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(IntakeError::Message(
                "intake payload is neither an array nor a rows object".to_string(),
            ))
        }
    };

    let mut rows = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;
    for element in elements {
        match element {
            JsonValue::Object(obj) => match row_from_object(obj) {
                Some(row) => rows.push(row),
                None => skipped += 1,
            },
            _ => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

fn row_from_object(obj: &JsonMap<String, JsonValue>) -> Option<IntakeRow> {
    let fields: Vec<(String, String)> = obj
        .iter()
        .filter_map(|(key, value)| value_as_text(value).map(|text| (canonical_header(key), text)))
        .collect();

    let row = IntakeRow {
        external_row_id: field_text(&fields, &["external row id", "row id", "row", "id"]),
        organization_name: field_text(
            &fields,
            &["organization name", "organization", "org", "school organization"],
        ),
        contact_name: field_text(&fields, &["contact name", "name", "full name", "contact"]),
        email: field_text(&fields, &["email", "email address", "contact email"]),
        phone: field_text(&fields, &["phone", "phone number", "contact phone"]),
        desired_event_date: field_text(
            &fields,
            &["desired event date", "event date", "date of event", "requested date"],
        ),
        submitted_at: field_text(&fields, &["submitted at", "timestamp", "submission time"]),
    };

    if row == IntakeRow::default() {
        None
    } else {
        Some(row)
    }
}

fn field_text(fields: &[(String, String)], aliases: &[&str]) -> String {
    for alias in aliases {
        if let Some((_, text)) = fields.iter().find(|(header, _)| header == alias) {
            return text.clone();
        }
    }
    String::new()
}

/// Collapse a column header to a comparable form: lowercase, alphanumeric
/// runs separated by single spaces. `"Email Address"`, `"email_address"` and
/// `"EMAIL  ADDRESS"` all canonicalize identically.
fn canonical_header(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => text_or_none(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
