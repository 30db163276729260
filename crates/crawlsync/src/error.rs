use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// A raw payload that cannot be coerced into a minimally valid record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Job payload is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    #[error("Job payload has no id")]
    MissingId,

    #[error("Job payload has an invalid id: {0}")]
    InvalidId(String),
}

/// A stream frame or bulk body that could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not valid UTF-8")]
    NotUtf8,

    #[error("Expected a JSON array of jobs, got {0}")]
    NotAnArray(&'static str),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to connect to '{url}': {message}")]
    Connect { url: String, message: String },

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Invalid stream endpoint '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid API URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid request header '{name}': {message}")]
    InvalidHeader { name: String, message: String },
}

impl FetchError {
    /// Returns true if retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_)
            | FetchError::InvalidUrl { .. }
            | FetchError::InvalidHeader { .. } => false,
        }
    }
}

/// Short JSON type name for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
