//! Payload normalization.
//!
//! The server serializes its embedded model fields in PascalCase (`ID`,
//! `CreatedAt`) and everything else in snake_case, and older producers use
//! PascalCase throughout. Each canonical field therefore has an ordered list
//! of candidate keys; the first one present with a non-null value wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::duration::processing_time_ms;
use super::{BrokenLink, CrawlMetrics, JobId, JobRecord, JobStatus};
use crate::error::{json_kind, ValidationError};

mod keys {
    pub const ID: &[&str] = &["ID", "id"];
    pub const CREATED_AT: &[&str] = &["CreatedAt", "created_at"];
    pub const UPDATED_AT: &[&str] = &["UpdatedAt", "updated_at"];
    pub const USER_ID: &[&str] = &["UserID", "user_id"];
    pub const URL: &[&str] = &["URL", "url"];
    pub const STATUS: &[&str] = &["Status", "status"];
    pub const HTML_VERSION: &[&str] = &["HTMLVersion", "html_version"];
    pub const TITLE: &[&str] = &["Title", "title"];
    pub const HEADING_COUNTS: &[&str] = &["HeadingCounts", "heading_counts"];
    pub const INTERNAL_LINKS: &[&str] = &["InternalLinks", "internal_links"];
    pub const EXTERNAL_LINKS: &[&str] = &["ExternalLinks", "external_links"];
    pub const BROKEN_LINKS: &[&str] = &["BrokenLinks", "broken_links"];
    pub const TOTAL_LINKS: &[&str] = &["TotalLinks", "total_links"];
    pub const BROKEN_LINK_DETAIL: &[&str] = &["BrokenLinkDetail", "broken_link_detail"];
    pub const HAS_LOGIN_FORM: &[&str] = &["HasLoginForm", "has_login_form"];
    // The raw duration outranks the millisecond fields
    pub const PROCESSING_TIME: &[&str] = &[
        "processing_time",
        "ProcessingTimeMs",
        "processing_time_ms",
        "ProcessingTime",
    ];
    pub const ERROR_MESSAGE: &[&str] = &["ErrorMessage", "error_message"];
    pub const STATUS_CODE: &[&str] = &["StatusCode", "status_code"];
}

/// Returns the first candidate key that is present and not null.
fn resolve<'a>(obj: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, candidates: &[&str]) -> String {
    resolve(obj, candidates)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn count_field(obj: &Map<String, Value>, candidates: &[&str]) -> u64 {
    resolve(obj, candidates).and_then(as_u64).unwrap_or(0)
}

fn timestamp_field(obj: &Map<String, Value>, candidates: &[&str]) -> Option<DateTime<Utc>> {
    let raw = resolve(obj, candidates)?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Ignoring unparseable timestamp '{}': {}", raw, e);
            None
        }
    }
}

fn resolve_id(obj: &Map<String, Value>) -> Result<JobId, ValidationError> {
    let raw = resolve(obj, keys::ID).ok_or(ValidationError::MissingId)?;
    match as_u64(raw) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidId(raw.to_string())),
    }
}

fn resolve_status(obj: &Map<String, Value>, id: JobId) -> JobStatus {
    match resolve(obj, keys::STATUS).and_then(Value::as_str) {
        Some(raw) => JobStatus::parse(raw).unwrap_or_else(|| {
            log::warn!(
                "Unknown job status '{}' for job {}, defaulting to PENDING",
                raw,
                id
            );
            JobStatus::Pending
        }),
        None => JobStatus::Pending,
    }
}

fn resolve_heading_counts(obj: &Map<String, Value>) -> BTreeMap<String, u64> {
    match resolve(obj, keys::HEADING_COUNTS) {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(tag, count)| as_u64(count).map(|c| (tag.clone(), c)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn normalize_broken_link(value: &Value) -> Option<BrokenLink> {
    let obj = value.as_object()?;
    let status_code = resolve(obj, keys::STATUS_CODE)
        .and_then(as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(0);

    Some(BrokenLink {
        url: string_field(obj, keys::URL),
        status_code,
        error_message: string_field(obj, keys::ERROR_MESSAGE),
    })
}

fn resolve_broken_link_detail(obj: &Map<String, Value>, id: JobId) -> Option<Vec<BrokenLink>> {
    let entries = resolve(obj, keys::BROKEN_LINK_DETAIL)?.as_array()?;
    let links: Vec<BrokenLink> = entries.iter().filter_map(normalize_broken_link).collect();
    if links.len() != entries.len() {
        log::debug!(
            "Dropped {} non-object broken link entries for job {}",
            entries.len() - links.len(),
            id
        );
    }
    Some(links)
}

/// Converts a raw wire payload into a canonical [`JobRecord`].
///
/// Only the id is required. Every other field falls back to its default
/// (empty string, zero, false, `None`) when absent, null, or of the wrong
/// type.
pub fn normalize(raw: &Value) -> Result<JobRecord, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject(json_kind(raw)))?;

    let id = resolve_id(obj)?;
    let status = resolve_status(obj, id);

    let error_message = match status {
        JobStatus::Failed => Some(string_field(obj, keys::ERROR_MESSAGE)).filter(|m| !m.is_empty()),
        _ => None,
    };

    Ok(JobRecord {
        id,
        created_at: timestamp_field(obj, keys::CREATED_AT),
        updated_at: timestamp_field(obj, keys::UPDATED_AT),
        user_id: count_field(obj, keys::USER_ID),
        url: string_field(obj, keys::URL),
        status,
        html_version: string_field(obj, keys::HTML_VERSION),
        title: string_field(obj, keys::TITLE),
        metrics: CrawlMetrics {
            internal_links: count_field(obj, keys::INTERNAL_LINKS),
            external_links: count_field(obj, keys::EXTERNAL_LINKS),
            broken_links: count_field(obj, keys::BROKEN_LINKS),
            total_links: count_field(obj, keys::TOTAL_LINKS),
            heading_counts: resolve_heading_counts(obj),
        },
        broken_link_detail: resolve_broken_link_detail(obj, id),
        has_login_form: resolve(obj, keys::HAS_LOGIN_FORM)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        processing_time_ms: resolve(obj, keys::PROCESSING_TIME)
            .map(processing_time_ms)
            .unwrap_or(0.0),
        error_message,
    })
}
