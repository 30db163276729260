//! Canonical crawl job records and the normalizer that produces them.
//!
//! Every payload entering the crate, whether a bulk-fetch row or a stream
//! event, passes through [`normalize`] so the rest of the system only ever
//! sees [`JobRecord`] values.

pub mod duration;
pub mod normalize;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use duration::{parse_duration_str, processing_time_ms};
pub use normalize::normalize;

/// Primary key assigned by the remote system.
pub type JobId = u64;

/// Status of a crawl job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Parses a wire status, ignoring case. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns true once the job will not change without a rerun.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link and heading counts gathered by a crawl. Zeroed until the job completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrawlMetrics {
    pub internal_links: u64,
    pub external_links: u64,
    pub broken_links: u64,
    pub total_links: u64,
    /// Heading tag (`h1`..`h6`) to occurrence count.
    #[serde(default)]
    pub heading_counts: BTreeMap<String, u64>,
}

/// A link that failed during the crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    /// HTTP status, or 0 when the request never got a response.
    pub status_code: u16,
    pub error_message: String,
}

/// Canonical representation of one crawl job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: u64,
    pub url: String,
    pub status: JobStatus,
    pub html_version: String,
    pub title: String,
    pub metrics: CrawlMetrics,
    /// `None` when the payload carried no detail at all, which is not the
    /// same as an empty list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_link_detail: Option<Vec<BrokenLink>>,
    pub has_login_form: bool,
    pub processing_time_ms: f64,
    /// Only set when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecord {
    /// Creates a record with every field except `id` at its default.
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}
