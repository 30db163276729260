//! Builders for raw job payloads.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

/// Key convention of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// `ID`, `Status`, `ProcessingTime`, ...
    Pascal,
    /// `id`, `status`, `processing_time_ms`, ...
    Snake,
}

/// Builder for a raw job payload as the server would send it.
pub struct JobPayload {
    style: KeyStyle,
    fields: Map<String, Value>,
}

impl JobPayload {
    /// PascalCase payload with the given id.
    pub fn new(id: u64) -> Self {
        Self::with_style(id, KeyStyle::Pascal)
    }

    /// snake_case payload with the given id.
    pub fn snake(id: u64) -> Self {
        Self::with_style(id, KeyStyle::Snake)
    }

    pub fn with_style(id: u64, style: KeyStyle) -> Self {
        let builder = Self {
            style,
            fields: Map::new(),
        };
        builder.field("ID", "id", json!(id))
    }

    fn field(mut self, pascal: &str, snake: &str, value: Value) -> Self {
        let key = match self.style {
            KeyStyle::Pascal => pascal,
            KeyStyle::Snake => snake,
        };
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn status(self, status: &str) -> Self {
        self.field("Status", "status", json!(status))
    }

    pub fn url(self, url: &str) -> Self {
        self.field("URL", "url", json!(url))
    }

    pub fn title(self, title: &str) -> Self {
        self.field("Title", "title", json!(title))
    }

    /// Raw duration value; strings like `"1.5s"` or numbers.
    pub fn processing_time(self, value: Value) -> Self {
        self.field("ProcessingTime", "processing_time_ms", value)
    }

    pub fn error(self, message: &str) -> Self {
        self.field("ErrorMessage", "error_message", json!(message))
    }

    pub fn updated_at(self, rfc3339: &str) -> Self {
        self.field("UpdatedAt", "updated_at", json!(rfc3339))
    }

    pub fn created_at(self, rfc3339: &str) -> Self {
        self.field("CreatedAt", "created_at", json!(rfc3339))
    }

    pub fn links(self, internal: u64, external: u64, broken: u64) -> Self {
        self.field("InternalLinks", "internal_links", json!(internal))
            .field("ExternalLinks", "external_links", json!(external))
            .field("BrokenLinks", "broken_links", json!(broken))
    }

    /// Adds an arbitrary key verbatim.
    pub fn raw(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    /// Serialized form, as it would appear in a stream frame.
    pub fn to_text(self) -> String {
        self.build().to_string()
    }
}

/// Payloads for ids `1..=n`, all with the given status.
pub fn payloads_with_status(n: u64, status: &str) -> Vec<Value> {
    (1..=n)
        .map(|id| JobPayload::new(id).status(status).build())
        .collect()
}
