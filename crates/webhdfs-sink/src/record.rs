// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::template::Template;

pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// A single admitted event: the fields used for path resolution and the
/// bytes that end up in the destination file.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    timestamp: Option<DateTime<Utc>>,
    payload: Bytes,
}

impl Record {
    pub fn new(fields: Map<String, Value>, payload: impl Into<Bytes>) -> Self {
        Self {
            fields,
            timestamp: None,
            payload: payload.into(),
        }
    }

    /// Builds a record whose payload is produced by `encoder` from `fields`.
    pub fn encoded(fields: Map<String, Value>, encoder: &dyn RecordEncoder) -> Self {
        let payload = encoder.encode(&fields);
        let timestamp = timestamp_field(&fields);
        Self {
            fields,
            timestamp,
            payload,
        }
    }

    /// Parses one JSON object, taking `@timestamp` (RFC 3339) as the event
    /// time when present.
    pub fn from_json_line(line: &str, encoder: &dyn RecordEncoder) -> serde_json::Result<Self> {
        let fields: Map<String, Value> = serde_json::from_str(line)?;
        Ok(Self::encoded(fields, encoder))
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

fn timestamp_field(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
    fields
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Turns record fields into the bytes written for that record.
pub trait RecordEncoder: Send + Sync + Debug {
    fn encode(&self, fields: &Map<String, Value>) -> Bytes;
}

/// Writes each record as a single JSON line.
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    /// Hive rejects a leading `@` in column names, so the field is dropped
    /// from the output while staying available for path resolution.
    pub remove_at_timestamp: bool,
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self {
            remove_at_timestamp: true,
        }
    }
}

impl RecordEncoder for JsonEncoder {
    fn encode(&self, fields: &Map<String, Value>) -> Bytes {
        let rendered = if self.remove_at_timestamp && fields.contains_key(TIMESTAMP_FIELD) {
            let mut trimmed = fields.clone();
            trimmed.remove(TIMESTAMP_FIELD);
            Value::Object(trimmed).to_string()
        } else {
            serde_json::to_string(fields).unwrap_or_default()
        };
        Bytes::from(rendered)
    }
}

/// Renders a `%{field}` format string for each record.
#[derive(Debug, Clone)]
pub struct FormatEncoder {
    template: Arc<Template>,
}

impl FormatEncoder {
    pub fn new(message_format: &str) -> Self {
        Self {
            template: Arc::new(Template::parse(message_format)),
        }
    }
}

impl RecordEncoder for FormatEncoder {
    fn encode(&self, fields: &Map<String, Value>) -> Bytes {
        let now = timestamp_field(fields).unwrap_or_else(Utc::now);
        Bytes::from(self.template.render(fields, now))
    }
}
