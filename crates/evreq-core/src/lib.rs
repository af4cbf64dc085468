//! Core domain model for the event request intake reconciler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "evreq-core";

/// Persisted event request as the platform knows it.
///
/// Contact fields are stored free-text exactly as entered; canonicalization
/// for comparison happens at match time, not at rest. `desired_event_date` is
/// the identity of *which* event this request is about, so it is typed and
/// optional rather than a string: a request with no parseable date carries
/// `None` and can never accidentally equal another record's date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub id: Uuid,
    /// Intake-feed row this record is linked to, once known. Set on first
    /// successful reconciliation and stable from then on.
    pub external_row_id: Option<String>,
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_name: String,
    pub desired_event_date: Option<NaiveDate>,
    /// When the request was first recorded.
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Human-readable reconciliation trail; every sync merge appends the tier
    /// that produced it.
    pub sync_notes: Vec<String>,
}

impl EventRequest {
    pub fn is_linked(&self) -> bool {
        self.external_row_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// One raw row handed over from an intake feed, one per sync pass.
///
/// Every field is the feed's free-form string, untouched. Parsing and
/// canonicalization belong to the sync crate's normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeRow {
    /// Feed-side row identifier. Empty means the feed supplied none.
    #[serde(default)]
    pub external_row_id: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub desired_event_date: String,
    #[serde(default)]
    pub submitted_at: String,
}
