//! The reconciliation engine: row normalization, organization similarity,
//! the tiered candidate matcher, and the sync pass that drives them.
//!
//! The matcher is a pure function over one normalized row and one snapshot of
//! existing requests. Everything stateful — feed fetching, the store, the
//! archive, reports, the single-flight guard — lives in [`SyncService`].
//!
//! Matching runs a strict tier cascade. An external row id that is already
//! linked always wins. Failing that, an exact composite (same email, same
//! event date, submission timestamps within a few minutes) identifies a
//! re-submission of the identical request. Only then do the fuzzy fallbacks
//! run, and every one of them insists on exact event-date equality: two
//! requests for different calendar dates are different events, no matter how
//! similar the submitter looks. That date gate is what keeps a same-day
//! resubmission from swallowing a genuinely new request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use evreq_core::{EventRequest, IntakeRow};
use evreq_intake::{feed_from_entry, load_feed_registry, FeedContext, FeedEntry, IntakeFeed};
use evreq_store::{IntakeArchive, JsonFileStore, RequestStore};
use serde::Serialize;
use strsim::normalized_levenshtein;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "evreq-sync";

/// Minimum canonicalized-organization similarity for every fuzzy tier,
/// inclusive. Single definition point.
pub const ORG_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Submission timestamps at most this many minutes apart (inclusive) count
/// as the same submission in the exact-composite tier.
pub const SUBMISSION_TOLERANCE_MINUTES: i64 = 5;

// ---------------------------------------------------------------------------
// Row normalization

pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Trim-only; case is preserved so the similarity scorer can decide how to
/// compare. Empty input is absent.
pub fn normalize_org(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First whitespace-delimited token becomes the first name, the remainder the
/// last name. `"Jane Ann Smith"` splits as `("Jane", "Ann Smith")`.
pub fn split_contact_name(raw: &str) -> (Option<String>, Option<String>) {
    let mut parts = raw.split_whitespace();
    let first = parts.next().map(|token| token.to_string());
    let rest = parts.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() { None } else { Some(rest) };
    (first, last)
}

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Permissive US-locale event date parsing. Date-time input is truncated to
/// its date. Empty or unparseable input is absent — never a default date,
/// since a defaulted date could spuriously equal another record's date.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    parse_submitted_at(text).map(|dt| dt.date_naive())
}

/// Permissive US-locale date-time parsing. Zone-less values are taken as UTC,
/// which is how the intake feeds record them; date-only input maps to
/// midnight UTC.
pub fn parse_submitted_at(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// One intake row in canonical comparison shape. Absent is always `None`,
/// never an empty string or a sentinel date.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub external_row_id: Option<String>,
    pub organization_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub desired_event_date: Option<NaiveDate>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl NormalizedRow {
    pub fn from_intake(row: &IntakeRow) -> Self {
        let (first_name, last_name) = split_contact_name(&row.contact_name);
        let row_id = row.external_row_id.trim();
        Self {
            external_row_id: if row_id.is_empty() {
                None
            } else {
                Some(row_id.to_string())
            },
            organization_name: normalize_org(&row.organization_name),
            first_name,
            last_name,
            email: normalize_email(&row.email),
            phone: normalize_phone(&row.phone),
            desired_event_date: parse_event_date(&row.desired_event_date),
            submitted_at: parse_submitted_at(&row.submitted_at),
        }
    }

    /// Canonical full contact name, if any part of one is present.
    pub fn full_name(&self) -> Option<String> {
        let joined = match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => return None,
        };
        Some(canonical_compare_text(&joined))
    }
}

// ---------------------------------------------------------------------------
// Organization similarity

fn canonical_compare_text(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized-Levenshtein ratio over canonicalized (lowercased,
/// whitespace-collapsed) organization names: symmetric, 1.0 for equal inputs,
/// 0.0 for empty-vs-non-empty, and strictly decreasing as edits accumulate.
/// Callers gate out absent names before scoring; two empty strings score 1.0
/// here and must never be allowed to vouch for a match.
pub fn organization_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&canonical_compare_text(a), &canonical_compare_text(b))
}

// ---------------------------------------------------------------------------
// Candidate matcher

/// Which strategy produced a match, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    ExternalId,
    Exact,
    FuzzyEmail,
    FuzzyPhone,
    FuzzyName,
}

impl MatchTier {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchTier::ExternalId => "external-id",
            MatchTier::Exact => "exact",
            MatchTier::FuzzyEmail => "fuzzy-email",
            MatchTier::FuzzyPhone => "fuzzy-phone",
            MatchTier::FuzzyName => "fuzzy-name",
        }
    }
}

/// At most one existing request matches an incoming row. `contenders` counts
/// how many records satisfied the winning tier; anything above one is a
/// data-quality signal the caller should log, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Match {
        id: Uuid,
        tier: MatchTier,
        contenders: usize,
    },
}

/// Resolve one normalized row against a snapshot of existing requests.
///
/// Tiers run in strict order and the first hit wins: linked external row id;
/// exact composite (equal non-empty emails, equal event dates, submissions
/// within [`SUBMISSION_TOLERANCE_MINUTES`]); then fuzzy fallbacks by email,
/// phone, and full name, each requiring exact event-date equality and
/// organization similarity at or above [`ORG_SIMILARITY_THRESHOLD`]. A field
/// that is absent fails the specific checks that need it and nothing else.
/// Pure and total: any string input yields a result, never a panic.
pub fn match_row(row: &NormalizedRow, existing: &[EventRequest]) -> MatchResult {
    if let Some(row_id) = &row.external_row_id {
        let linked: Vec<&EventRequest> = existing
            .iter()
            .filter(|record| record.external_row_id.as_deref() == Some(row_id.as_str()))
            .collect();
        if let Some(winner) = linked.first() {
            return MatchResult::Match {
                id: winner.id,
                tier: MatchTier::ExternalId,
                contenders: linked.len(),
            };
        }
    }

    if let (Some(email), Some(event_date), Some(submitted_at)) =
        (&row.email, row.desired_event_date, row.submitted_at)
    {
        let exact: Vec<&EventRequest> = existing
            .iter()
            .filter(|record| {
                normalize_email(&record.email).as_deref() == Some(email.as_str())
                    && record.desired_event_date == Some(event_date)
                    && within_submission_tolerance(submitted_at, record.submitted_at)
            })
            .collect();
        if let Some(winner) = exact.first() {
            return MatchResult::Match {
                id: winner.id,
                tier: MatchTier::Exact,
                contenders: exact.len(),
            };
        }
    }

    // Fuzzy fallbacks share one candidate pool: exact event-date equality plus
    // organization similarity at the threshold, both org names present.
    let pool: Vec<&EventRequest> = match (row.desired_event_date, &row.organization_name) {
        (Some(event_date), Some(org)) => existing
            .iter()
            .filter(|record| {
                record.desired_event_date == Some(event_date)
                    && normalize_org(&record.organization_name).is_some_and(|stored| {
                        organization_similarity(org, &stored) >= ORG_SIMILARITY_THRESHOLD
                    })
            })
            .collect(),
        _ => Vec::new(),
    };

    let fuzzy_tiers: [(MatchTier, fn(&NormalizedRow, &EventRequest) -> bool); 3] = [
        (MatchTier::FuzzyEmail, emails_equal),
        (MatchTier::FuzzyPhone, phones_equal),
        (MatchTier::FuzzyName, full_names_equal),
    ];
    for (tier, satisfied) in fuzzy_tiers {
        let hits: Vec<&EventRequest> = pool
            .iter()
            .copied()
            .filter(|record| satisfied(row, record))
            .collect();
        if let Some(winner) = hits.first() {
            return MatchResult::Match {
                id: winner.id,
                tier,
                contenders: hits.len(),
            };
        }
    }

    MatchResult::NoMatch
}

fn within_submission_tolerance(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_seconds().abs() <= SUBMISSION_TOLERANCE_MINUTES * 60
}

fn emails_equal(row: &NormalizedRow, record: &EventRequest) -> bool {
    match (&row.email, normalize_email(&record.email)) {
        (Some(incoming), Some(stored)) => *incoming == stored,
        _ => false,
    }
}

fn phones_equal(row: &NormalizedRow, record: &EventRequest) -> bool {
    match (&row.phone, normalize_phone(&record.phone)) {
        (Some(incoming), Some(stored)) => *incoming == stored,
        _ => false,
    }
}

fn full_names_equal(row: &NormalizedRow, record: &EventRequest) -> bool {
    match (row.full_name(), record_full_name(record)) {
        (Some(incoming), Some(stored)) => incoming == stored,
        _ => false,
    }
}

fn record_full_name(record: &EventRequest) -> Option<String> {
    let joined = format!("{} {}", record.first_name, record.last_name);
    let canonical = canonical_compare_text(&joined);
    if canonical.is_empty() {
        None
    } else {
        Some(canonical)
    }
}

// ---------------------------------------------------------------------------
// Sync orchestration

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub registry_path: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron_1: String,
    pub sync_cron_2: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("EVREQ_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            artifacts_dir: std::env::var("EVREQ_ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            reports_dir: std::env::var("EVREQ_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./reports")),
            registry_path: std::env::var("EVREQ_REGISTRY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("feeds.yaml")),
            scheduler_enabled: std::env::var("EVREQ_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron_1: std::env::var("SYNC_CRON_1")
                .unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            sync_cron_2: std::env::var("SYNC_CRON_2")
                .unwrap_or_else(|_| "0 0 18 * * *".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncRunSummary),
    /// Another pass held the single-flight guard; nothing was read or written.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_feeds: usize,
    pub feeds: Vec<FeedRowCount>,
    pub fetched_rows: usize,
    pub skipped_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub tier_counts: BTreeMap<String, usize>,
    pub reports_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedRowCount {
    pub feed_id: String,
    pub rows: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Created,
    Updated,
}

/// One line of the reconciliation delta: what happened to one intake row.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub feed_id: String,
    pub external_row_id: Option<String>,
    pub action: RowAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<MatchTier>,
    pub request_id: Uuid,
}

/// Owns one reconciliation pass end to end: fetch, archive, normalize, match,
/// create-or-merge, report. `run_once` refuses to overlap with itself.
pub struct SyncService {
    config: SyncConfig,
    store: Arc<dyn RequestStore>,
    archive: IntakeArchive,
    pass_guard: Mutex<()>,
}

impl SyncService {
    pub fn new(config: SyncConfig, store: Arc<dyn RequestStore>, archive: IntakeArchive) -> Self {
        Self {
            config,
            store,
            archive,
            pass_guard: Mutex::new(()),
        }
    }

    /// Run one sync pass, or skip if a pass is already in flight. Two
    /// concurrent passes could each conclude `NoMatch` for the same incoming
    /// request and create duplicates, so overlap is refused rather than
    /// queued.
    pub async fn run_once(&self) -> Result<SyncOutcome> {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            warn!("sync pass already in flight, skipping this trigger");
            return Ok(SyncOutcome::Skipped);
        };
        let summary = self.run_pass().await?;
        Ok(SyncOutcome::Completed(summary))
    }

    async fn run_pass(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "sync pass started");

        let registry = load_feed_registry(&self.config.registry_path)?;
        let enabled_feeds: Vec<FeedEntry> =
            registry.feeds.into_iter().filter(|f| f.enabled).collect();

        // One snapshot per pass, fetched before any write; if this fails the
        // pass aborts with nothing applied. Each create is appended to the
        // working set so later rows in the same pass can match it.
        let mut working_set = self
            .store
            .snapshot()
            .await
            .context("fetching request snapshot")?;

        let mut outcomes: Vec<RowOutcome> = Vec::new();
        let mut tier_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut feed_counts: Vec<FeedRowCount> = Vec::new();
        let mut fetched_rows = 0usize;
        let mut skipped_rows = 0usize;
        let mut created = 0usize;
        let mut updated = 0usize;

        for entry in &enabled_feeds {
            let feed = feed_from_entry(entry)?;
            let ctx = FeedContext {
                run_id,
                fetched_at: Utc::now(),
            };
            let payload = feed
                .fetch_rows(&ctx)
                .await
                .with_context(|| format!("fetching feed {}", entry.feed_id))?;

            self.archive
                .archive(
                    payload.fetched_at,
                    &payload.feed_id,
                    "json",
                    payload.raw.as_bytes(),
                )
                .await
                .with_context(|| format!("archiving payload for feed {}", entry.feed_id))?;

            fetched_rows += payload.rows.len();
            skipped_rows += payload.skipped_rows;
            feed_counts.push(FeedRowCount {
                feed_id: entry.feed_id.clone(),
                rows: payload.rows.len(),
                skipped: payload.skipped_rows,
            });
            info!(
                feed = %entry.feed_id,
                rows = payload.rows.len(),
                skipped = payload.skipped_rows,
                "feed fetched"
            );

            for raw_row in &payload.rows {
                let outcome = self
                    .reconcile_row(&entry.feed_id, raw_row, &mut working_set)
                    .await?;
                match outcome.action {
                    RowAction::Created => created += 1,
                    RowAction::Updated => updated += 1,
                }
                if let Some(tier) = outcome.tier {
                    *tier_counts.entry(tier.as_str().to_string()).or_default() += 1;
                }
                outcomes.push(outcome);
            }
        }

        let finished_at = Utc::now();
        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            enabled_feeds: enabled_feeds.len(),
            feeds: feed_counts,
            fetched_rows,
            skipped_rows,
            created,
            updated,
            tier_counts,
            reports_dir: reports_dir.display().to_string(),
        };
        self.write_reports(&reports_dir, &summary, &outcomes).await?;
        info!(%run_id, created, updated, "sync pass finished");
        Ok(summary)
    }

    async fn reconcile_row(
        &self,
        feed_id: &str,
        raw_row: &IntakeRow,
        working_set: &mut Vec<EventRequest>,
    ) -> Result<RowOutcome> {
        let row = NormalizedRow::from_intake(raw_row);
        match match_row(&row, working_set) {
            MatchResult::Match {
                id,
                tier,
                contenders,
            } => {
                if contenders > 1 {
                    warn!(
                        request = %id,
                        tier = tier.as_str(),
                        contenders,
                        "multiple records satisfied the winning tier, keeping first-encountered"
                    );
                }
                let record = working_set
                    .iter_mut()
                    .find(|r| r.id == id)
                    .with_context(|| format!("matched request {id} missing from working set"))?;
                merge_row_into(record, &row, tier, feed_id, Utc::now());
                self.store
                    .update(record.clone())
                    .await
                    .with_context(|| format!("updating request {id}"))?;
                info!(request = %id, tier = tier.as_str(), "merged intake row into existing request");
                Ok(RowOutcome {
                    feed_id: feed_id.to_string(),
                    external_row_id: row.external_row_id,
                    action: RowAction::Updated,
                    tier: Some(tier),
                    request_id: id,
                })
            }
            MatchResult::NoMatch => {
                let record = new_request_from_row(&row, feed_id, Utc::now());
                self.store
                    .create(record.clone())
                    .await
                    .with_context(|| format!("creating request {}", record.id))?;
                info!(request = %record.id, "created new request from intake row");
                let outcome = RowOutcome {
                    feed_id: feed_id.to_string(),
                    external_row_id: row.external_row_id,
                    action: RowAction::Created,
                    tier: None,
                    request_id: record.id,
                };
                working_set.push(record);
                Ok(outcome)
            }
        }
    }

    async fn write_reports(
        &self,
        reports_dir: &Path,
        summary: &SyncRunSummary,
        outcomes: &[RowOutcome],
    ) -> Result<()> {
        fs::create_dir_all(reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let feed_lines = if summary.feeds.is_empty() {
            "- none".to_string()
        } else {
            summary
                .feeds
                .iter()
                .map(|f| format!("- {}: {} rows, {} skipped", f.feed_id, f.rows, f.skipped))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let tier_lines = if summary.tier_counts.is_empty() {
            "- none".to_string()
        } else {
            summary
                .tier_counts
                .iter()
                .map(|(tier, count)| format!("- {tier}: {count}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let brief = format!(
            "# Sync Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Enabled feeds: {}\n- Rows reconciled: {}\n- Rows skipped by feed parsing: {}\n- Requests created: {}\n- Requests updated: {}\n\n## Feeds\n{}\n\n## Merge Tiers\n{}\n",
            summary.run_id,
            summary.started_at,
            summary.finished_at,
            summary.enabled_feeds,
            summary.fetched_rows,
            summary.skipped_rows,
            summary.created,
            summary.updated,
            feed_lines,
            tier_lines
        );
        fs::write(reports_dir.join("sync_brief.md"), brief)
            .await
            .context("writing sync_brief.md")?;

        let delta_json = serde_json::to_vec_pretty(&serde_json::json!({
            "sync_run": summary,
            "rows": outcomes,
        }))
        .context("serializing reconciliation delta")?;
        fs::write(reports_dir.join("reconciliation_delta.json"), delta_json)
            .await
            .context("writing reconciliation_delta.json")?;

        Ok(())
    }

    /// Build the twice-daily scheduler when enabled. Each tick goes through
    /// `run_once`, so a tick that fires while a pass is still running is
    /// skipped, not queued behind it.
    pub async fn maybe_build_scheduler(self: Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        for cron in [
            self.config.sync_cron_1.clone(),
            self.config.sync_cron_2.clone(),
        ] {
            let service = Arc::clone(&self);
            let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
                let service = Arc::clone(&service);
                Box::pin(async move {
                    match service.run_once().await {
                        Ok(SyncOutcome::Completed(summary)) => info!(
                            run_id = %summary.run_id,
                            created = summary.created,
                            updated = summary.updated,
                            "scheduled sync pass finished"
                        ),
                        Ok(SyncOutcome::Skipped) => {
                            warn!("scheduled sync pass skipped, previous pass still running");
                        }
                        Err(err) => warn!(error = %err, "scheduled sync pass failed"),
                    }
                })
            })
            .with_context(|| format!("creating scheduler job for cron {cron}"))?;
            sched.add(job).await.context("adding scheduler job")?;
        }
        Ok(Some(sched))
    }
}

/// Merge a normalized row into a matched record: present values overwrite,
/// absent values never erase. `submitted_at` is provenance of the original
/// submission and stays untouched. Links the external row id when the record
/// has none, and appends the audit note naming the tier.
pub fn merge_row_into(
    record: &mut EventRequest,
    row: &NormalizedRow,
    tier: MatchTier,
    feed_id: &str,
    now: DateTime<Utc>,
) {
    if let Some(email) = &row.email {
        record.email = email.clone();
    }
    if let Some(phone) = &row.phone {
        record.phone = phone.clone();
    }
    if let Some(first) = &row.first_name {
        record.first_name = first.clone();
    }
    if let Some(last) = &row.last_name {
        record.last_name = last.clone();
    }
    if let Some(org) = &row.organization_name {
        record.organization_name = org.clone();
    }
    if let Some(date) = row.desired_event_date {
        record.desired_event_date = Some(date);
    }
    if !record.is_linked() {
        if let Some(row_id) = &row.external_row_id {
            record.external_row_id = Some(row_id.clone());
        }
    }
    record.updated_at = now;
    record.sync_notes.push(match &row.external_row_id {
        Some(row_id) => format!(
            "merged intake row {row_id} from {feed_id} via {} match",
            tier.as_str()
        ),
        None => format!("merged intake row from {feed_id} via {} match", tier.as_str()),
    });
}

/// Build a fresh request from a row no tier claimed. A row without a parseable
/// submission timestamp is stamped with the pass time.
pub fn new_request_from_row(row: &NormalizedRow, feed_id: &str, now: DateTime<Utc>) -> EventRequest {
    let origin = match &row.external_row_id {
        Some(row_id) => format!("created from feed {feed_id} row {row_id}"),
        None => format!("created from feed {feed_id}"),
    };
    EventRequest {
        id: Uuid::new_v4(),
        external_row_id: row.external_row_id.clone(),
        email: row.email.clone().unwrap_or_default(),
        phone: row.phone.clone().unwrap_or_default(),
        first_name: row.first_name.clone().unwrap_or_default(),
        last_name: row.last_name.clone().unwrap_or_default(),
        organization_name: row.organization_name.clone().unwrap_or_default(),
        desired_event_date: row.desired_event_date,
        submitted_at: row.submitted_at.unwrap_or(now),
        updated_at: now,
        sync_notes: vec![origin],
    }
}

/// Assemble a service over the JSON-file store using environment config.
pub fn service_from_env() -> SyncService {
    let config = SyncConfig::from_env();
    let store = Arc::new(JsonFileStore::new(config.data_dir.join("requests.json")));
    let archive = IntakeArchive::new(config.artifacts_dir.clone());
    SyncService::new(config, store, archive)
}

pub async fn run_sync_once_from_env() -> Result<SyncOutcome> {
    service_from_env().run_once().await
}

/// Render briefs for the most recent runs under the reports root, newest
/// first.
pub fn report_recent_markdown(runs: usize, reports_root: Option<PathBuf>) -> Result<String> {
    let root = reports_root.unwrap_or_else(|| PathBuf::from("./reports"));
    let mut dirs = std::fs::read_dir(&root)
        .with_context(|| format!("reading {}", root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# Recent Sync Runs".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let delta_path = dir.path().join("reconciliation_delta.json");
        let brief_path = dir.path().join("sync_brief.md");

        let delta_value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&delta_path)
                .with_context(|| format!("reading {}", delta_path.display()))?,
        )
        .with_context(|| format!("parsing {}", delta_path.display()))?;
        let rows = delta_value
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        let created = delta_value
            .get("sync_run")
            .and_then(|v| v.get("created"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let updated = delta_value
            .get("sync_run")
            .and_then(|v| v.get("updated"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- rows reconciled: {rows}"));
        lines.push(format!("- created: {created}"));
        lines.push(format!("- updated: {updated}"));
        lines.push(format!("- delta: `{}`", delta_path.display()));
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).single().expect("valid timestamp")
    }

    fn record(email: &str, org: &str, event: Option<NaiveDate>, submitted: DateTime<Utc>) -> EventRequest {
        EventRequest {
            id: Uuid::new_v4(),
            external_row_id: None,
            email: email.into(),
            phone: "(555) 010-0199".into(),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            organization_name: org.into(),
            desired_event_date: event,
            submitted_at: submitted,
            updated_at: submitted,
            sync_notes: vec![],
        }
    }

    fn row(email: &str, org: &str, event: Option<NaiveDate>, submitted: Option<DateTime<Utc>>) -> NormalizedRow {
        NormalizedRow {
            external_row_id: None,
            organization_name: normalize_org(org),
            first_name: Some("Jane".into()),
            last_name: Some("Smith".into()),
            email: normalize_email(email),
            phone: Some("5550100199".into()),
            desired_event_date: event,
            submitted_at: submitted,
        }
    }

    fn tier_of(result: MatchResult) -> Option<MatchTier> {
        match result {
            MatchResult::Match { tier, .. } => Some(tier),
            MatchResult::NoMatch => None,
        }
    }

    #[test]
    fn email_normalization_lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Jane.Smith@School.COM "),
            Some("jane.smith@school.com".into())
        );
        assert_eq!(normalize_email(""), None);
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn phone_normalization_keeps_digits_only() {
        assert_eq!(normalize_phone("(555) 010-0199"), Some("5550100199".into()));
        assert_eq!(normalize_phone("+1 555.010.0199"), Some("15550100199".into()));
        assert_eq!(normalize_phone("ext."), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn event_dates_parse_across_us_locale_forms() {
        let expected = Some(date(2025, 11, 15));
        assert_eq!(parse_event_date("11/15/2025"), expected);
        assert_eq!(parse_event_date("11/15/25"), expected);
        assert_eq!(parse_event_date("2025-11-15"), expected);
        assert_eq!(parse_event_date(" 11/15/2025 "), expected);
        // Date-time input truncates to its date.
        assert_eq!(parse_event_date("11/15/2025 10:00:00"), expected);
        assert_eq!(parse_event_date(""), None);
        assert_eq!(parse_event_date("mid November"), None);
        assert_eq!(parse_event_date("13/45/2025"), None);
    }

    #[test]
    fn submission_timestamps_parse_and_default_to_utc() {
        let expected = Some(at(2025, 9, 26, 10, 0, 0));
        assert_eq!(parse_submitted_at("9/26/2025 10:00:00"), expected);
        assert_eq!(parse_submitted_at("2025-09-26 10:00:00"), expected);
        assert_eq!(parse_submitted_at("2025-09-26T10:00:00Z"), expected);
        assert_eq!(parse_submitted_at("9/26/2025 10:00 AM"), expected);
        // Offsets convert into UTC.
        assert_eq!(
            parse_submitted_at("2025-09-26T06:00:00-04:00"),
            expected
        );
        // Date-only input lands on midnight UTC.
        assert_eq!(parse_submitted_at("9/26/2025"), Some(at(2025, 9, 26, 0, 0, 0)));
        assert_eq!(parse_submitted_at("whenever"), None);
        assert_eq!(parse_submitted_at(""), None);
    }

    #[test]
    fn contact_names_split_first_and_rest() {
        assert_eq!(
            split_contact_name("Jane Smith"),
            (Some("Jane".into()), Some("Smith".into()))
        );
        assert_eq!(
            split_contact_name("Jane Ann Smith"),
            (Some("Jane".into()), Some("Ann Smith".into()))
        );
        assert_eq!(split_contact_name("Jane"), (Some("Jane".into()), None));
        assert_eq!(split_contact_name("   "), (None, None));
    }

    #[test]
    fn similarity_is_symmetric_case_and_whitespace_insensitive() {
        assert_eq!(organization_similarity("Springfield Elementary", "Springfield Elementary"), 1.0);
        assert_eq!(
            organization_similarity("Springfield  Elementary", "springfield elementary"),
            1.0
        );
        let ab = organization_similarity("Springfield Elementary", "Springfield Elementary PTA");
        let ba = organization_similarity("Springfield Elementary PTA", "Springfield Elementary");
        assert_eq!(ab, ba);
        assert!(ab > ORG_SIMILARITY_THRESHOLD);
        assert_eq!(organization_similarity("", "Springfield Elementary"), 0.0);
    }

    #[test]
    fn similarity_decreases_with_edit_distance() {
        let close = organization_similarity("Springfield Elementary", "Springfield Elementury");
        let farther = organization_similarity("Springfield Elementary", "Springfold Elementury");
        let unrelated = organization_similarity("Springfield Elementary", "Westside Chess Club");
        assert!(close > farther);
        assert!(farther > unrelated);
        assert!(unrelated < ORG_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn different_event_dates_never_match_below_the_id_tier() {
        // Everything about the submitter is identical; only the event date
        // differs. No tier below the external-id anchor may claim it.
        let existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        let incoming = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 12, 20)),
            Some(at(2025, 9, 26, 10, 0, 30)),
        );
        assert_eq!(match_row(&incoming, &[existing.clone()]), MatchResult::NoMatch);

        // The same pair linked by row id resolves through the id tier alone.
        let mut linked = existing;
        linked.external_row_id = Some("77".into());
        let mut linked_row = incoming;
        linked_row.external_row_id = Some("77".into());
        assert_eq!(tier_of(match_row(&linked_row, &[linked])), Some(MatchTier::ExternalId));
    }

    #[test]
    fn submission_tolerance_is_five_minutes_inclusive() {
        // Org withheld so the fuzzy tiers stay out of the picture.
        let existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        let at_boundary = row(
            "jane.smith@school.com",
            "",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 5, 0)),
        );
        assert_eq!(
            tier_of(match_row(&at_boundary, &[existing.clone()])),
            Some(MatchTier::Exact)
        );

        let past_boundary = row(
            "jane.smith@school.com",
            "",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 6, 0)),
        );
        assert_eq!(match_row(&past_boundary, &[existing.clone()]), MatchResult::NoMatch);

        let one_second_past = row(
            "jane.smith@school.com",
            "",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 5, 1)),
        );
        assert_eq!(match_row(&one_second_past, &[existing]), MatchResult::NoMatch);
    }

    #[test]
    fn linked_row_id_wins_over_every_content_signal() {
        let mut anchored = record(
            "old.contact@district.org",
            "Old District Name",
            Some(date(2025, 10, 1)),
            at(2025, 9, 1, 8, 0, 0),
        );
        anchored.external_row_id = Some("row-42".into());

        // A second record that would win the exact tier on content.
        let decoy = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );

        let mut incoming = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        incoming.external_row_id = Some("row-42".into());

        let result = match_row(&incoming, &[decoy, anchored.clone()]);
        assert_eq!(
            result,
            MatchResult::Match {
                id: anchored.id,
                tier: MatchTier::ExternalId,
                contenders: 1,
            }
        );
    }

    #[test]
    fn fuzzy_email_requires_exact_event_date() {
        let existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 1, 8, 0, 0),
        );
        // Submission far outside the exact-tier window, org renamed but
        // similar: the email fallback carries it, for the same date only.
        let renamed_same_date = row(
            "jane.smith@school.com",
            "Springfield Elementary PTA",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        assert_eq!(
            tier_of(match_row(&renamed_same_date, &[existing.clone()])),
            Some(MatchTier::FuzzyEmail)
        );

        let renamed_other_date = row(
            "jane.smith@school.com",
            "Springfield Elementary PTA",
            Some(date(2025, 12, 20)),
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        assert_eq!(match_row(&renamed_other_date, &[existing]), MatchResult::NoMatch);
    }

    #[test]
    fn org_similarity_gate_is_inclusive_at_the_threshold() {
        // "abcde" vs "abc" scores exactly at the threshold: 1 - 2/5.
        assert!(organization_similarity("abcde", "abc") >= ORG_SIMILARITY_THRESHOLD);
        assert!(organization_similarity("abcde", "ab") < ORG_SIMILARITY_THRESHOLD);

        let existing = record(
            "jane.smith@school.com",
            "abcde",
            Some(date(2025, 11, 15)),
            at(2025, 9, 1, 8, 0, 0),
        );
        let at_threshold = row(
            "jane.smith@school.com",
            "abc",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        assert_eq!(
            tier_of(match_row(&at_threshold, &[existing.clone()])),
            Some(MatchTier::FuzzyEmail)
        );

        let below_threshold = row(
            "jane.smith@school.com",
            "ab",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        assert_eq!(match_row(&below_threshold, &[existing]), MatchResult::NoMatch);
    }

    #[test]
    fn fuzzy_priorities_run_email_then_phone_then_name() {
        let event = Some(date(2025, 11, 15));
        let submitted = at(2025, 9, 1, 8, 0, 0);

        let mut by_phone = record("other@school.com", "Springfield Elementary", event, submitted);
        by_phone.phone = "(555) 010-0199".into();
        let mut by_email = record("jane.smith@school.com", "Springfield Elementary", event, submitted);
        by_email.phone = "555-999-0000".into();

        // Both candidates clear the date + org gate; email outranks phone.
        let incoming = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            event,
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        let result = match_row(&incoming, &[by_phone.clone(), by_email.clone()]);
        assert_eq!(
            result,
            MatchResult::Match {
                id: by_email.id,
                tier: MatchTier::FuzzyEmail,
                contenders: 1,
            }
        );

        // With no email on the row, the phone fallback finds its candidate.
        let mut no_email = incoming.clone();
        no_email.email = None;
        assert_eq!(
            match_row(&no_email, &[by_phone.clone(), by_email.clone()]),
            MatchResult::Match {
                id: by_phone.id,
                tier: MatchTier::FuzzyPhone,
                contenders: 1,
            }
        );

        // With neither channel, the full contact name still identifies them.
        let mut name_only = no_email;
        name_only.phone = None;
        let by_name = match_row(&name_only, &[by_phone, by_email.clone()]);
        assert_eq!(tier_of(by_name), Some(MatchTier::FuzzyName));
    }

    #[test]
    fn missing_fields_fail_checks_without_errors() {
        let dated = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        // Unparseable event date on the row: nothing below the id tier fires.
        let undated_row = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            None,
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        assert_eq!(match_row(&undated_row, &[dated.clone()]), MatchResult::NoMatch);

        // Date missing on the record's side instead.
        let undated_record = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            None,
            at(2025, 9, 26, 10, 0, 0),
        );
        let dated_row = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        assert_eq!(match_row(&dated_row, &[undated_record.clone()]), MatchResult::NoMatch);

        // Two missing dates are not "equal"; and a fully empty row is inert.
        assert_eq!(match_row(&undated_row, &[undated_record]), MatchResult::NoMatch);
        let empty = NormalizedRow::from_intake(&IntakeRow::default());
        assert_eq!(match_row(&empty, &[dated]), MatchResult::NoMatch);
    }

    #[test]
    fn absent_org_names_never_vouch_for_fuzzy_matches() {
        // Same email and date, submission outside the exact window, and no
        // organization on either side: empty-vs-empty similarity is 1.0 by
        // the metric, so the gate must refuse to consult it.
        let existing = record(
            "jane.smith@school.com",
            "",
            Some(date(2025, 11, 15)),
            at(2025, 9, 1, 8, 0, 0),
        );
        let incoming = row(
            "jane.smith@school.com",
            "",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 0, 0)),
        );
        assert_eq!(match_row(&incoming, &[existing]), MatchResult::NoMatch);
    }

    #[test]
    fn ambiguous_winners_surface_contender_counts() {
        let event = Some(date(2025, 11, 15));
        let first = record("jane.smith@school.com", "Springfield Elementary", event, at(2025, 9, 26, 10, 0, 0));
        let second = record("jane.smith@school.com", "Springfield Elementary", event, at(2025, 9, 26, 10, 2, 0));

        let incoming = row(
            "jane.smith@school.com",
            "",
            event,
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        let result = match_row(&incoming, &[first.clone(), second]);
        assert_eq!(
            result,
            MatchResult::Match {
                id: first.id,
                tier: MatchTier::Exact,
                contenders: 2,
            }
        );
    }

    #[test]
    fn resubmitted_request_for_a_new_date_stays_distinct() {
        // The shape of the historical data-loss defect: same submitter, one
        // minute apart, but a different event. Must create, never merge.
        let existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        let incoming = row(
            "jane.smith@school.com",
            "Springfield Elementary PTA",
            Some(date(2025, 12, 20)),
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        assert_eq!(match_row(&incoming, &[existing]), MatchResult::NoMatch);
    }

    #[test]
    fn matcher_is_deterministic_over_identical_inputs() {
        let existing = vec![
            record("a@b.org", "Org One", Some(date(2025, 11, 15)), at(2025, 9, 26, 10, 0, 0)),
            record("c@d.org", "Org Two", Some(date(2025, 11, 15)), at(2025, 9, 26, 10, 0, 0)),
        ];
        let incoming = row("a@b.org", "Org One", Some(date(2025, 11, 15)), Some(at(2025, 9, 26, 10, 3, 0)));
        assert_eq!(match_row(&incoming, &existing), match_row(&incoming, &existing));
    }

    #[test]
    fn normalized_rows_lift_all_fields() {
        let raw = IntakeRow {
            external_row_id: " 2101 ".into(),
            organization_name: "  Springfield Elementary ".into(),
            contact_name: "Jane Ann Smith".into(),
            email: " Jane.Smith@School.com ".into(),
            phone: "(555) 010-0199".into(),
            desired_event_date: "11/15/2025".into(),
            submitted_at: "9/26/2025 10:00:00".into(),
        };
        let normalized = NormalizedRow::from_intake(&raw);
        assert_eq!(normalized.external_row_id, Some("2101".into()));
        assert_eq!(normalized.organization_name, Some("Springfield Elementary".into()));
        assert_eq!(normalized.first_name, Some("Jane".into()));
        assert_eq!(normalized.last_name, Some("Ann Smith".into()));
        assert_eq!(normalized.email, Some("jane.smith@school.com".into()));
        assert_eq!(normalized.phone, Some("5550100199".into()));
        assert_eq!(normalized.desired_event_date, Some(date(2025, 11, 15)));
        assert_eq!(normalized.submitted_at, Some(at(2025, 9, 26, 10, 0, 0)));
        assert_eq!(normalized.full_name(), Some("jane ann smith".into()));
    }

    #[test]
    fn merge_overwrites_present_fields_and_keeps_absent_ones() {
        let now = at(2025, 9, 27, 6, 0, 0);
        let mut existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        let stored_submitted = existing.submitted_at;

        let incoming = NormalizedRow {
            external_row_id: Some("2101".into()),
            organization_name: Some("Springfield Elementary PTA".into()),
            first_name: None,
            last_name: None,
            email: Some("jane.smith@school.com".into()),
            phone: None,
            desired_event_date: Some(date(2025, 11, 15)),
            submitted_at: Some(at(2025, 9, 27, 5, 0, 0)),
        };
        merge_row_into(&mut existing, &incoming, MatchTier::FuzzyEmail, "districts-intake", now);

        assert_eq!(existing.organization_name, "Springfield Elementary PTA");
        // Absent name and phone did not erase the stored values.
        assert_eq!(existing.first_name, "Jane");
        assert_eq!(existing.phone, "(555) 010-0199");
        // Original submission provenance survives the merge.
        assert_eq!(existing.submitted_at, stored_submitted);
        assert_eq!(existing.external_row_id, Some("2101".into()));
        assert_eq!(existing.updated_at, now);
        let note = existing.sync_notes.last().expect("audit note");
        assert!(note.contains("fuzzy-email"), "note names the tier: {note}");
        assert!(note.contains("2101"));
    }

    #[test]
    fn merge_never_replaces_an_established_row_link() {
        let now = at(2025, 9, 27, 6, 0, 0);
        let mut existing = record(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            at(2025, 9, 26, 10, 0, 0),
        );
        existing.external_row_id = Some("row-42".into());

        let mut incoming = row(
            "jane.smith@school.com",
            "Springfield Elementary",
            Some(date(2025, 11, 15)),
            Some(at(2025, 9, 26, 10, 1, 0)),
        );
        incoming.external_row_id = Some("row-99".into());
        merge_row_into(&mut existing, &incoming, MatchTier::Exact, "districts-intake", now);
        assert_eq!(existing.external_row_id, Some("row-42".into()));
    }

    #[test]
    fn new_requests_stamp_missing_submission_with_pass_time() {
        let now = at(2025, 9, 27, 6, 0, 0);
        let incoming = row("host@pta.org", "Westside PTA", Some(date(2025, 12, 6)), None);
        let request = new_request_from_row(&incoming, "districts-intake", now);
        assert_eq!(request.submitted_at, now);
        assert_eq!(request.email, "host@pta.org");
        assert!(request.sync_notes[0].contains("districts-intake"));

        let stamped = row("host@pta.org", "Westside PTA", Some(date(2025, 12, 6)), Some(at(2025, 9, 26, 10, 0, 0)));
        let request = new_request_from_row(&stamped, "districts-intake", now);
        assert_eq!(request.submitted_at, at(2025, 9, 26, 10, 0, 0));
    }
}
