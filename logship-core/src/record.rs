use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};

use crate::errors::Result;

/// Severity attached to an emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
    Debug,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Error => "error",
            Level::Debug => "debug",
        }
    }
}

/// One structured log record: a flat string map over the caller's
/// attributes plus the reserved `level`, `event_id`, `message` and
/// `time` fields. Reserved fields win on key collision.
#[derive(Debug, Clone)]
pub struct LogRecord {
    fields: HashMap<String, String>,
}

impl LogRecord {
    /// Combines the caller attributes with the reserved fields and
    /// stamps the record with the current RFC3339 wall-clock time.
    pub fn build(
        level: Level,
        event_id: &str,
        message: &str,
        attributes: Option<HashMap<String, String>>,
    ) -> Self {
        let mut fields = attributes.unwrap_or_default();
        fields.insert("level".to_string(), level.as_str().to_string());
        fields.insert("event_id".to_string(), event_id.to_string());
        fields.insert("message".to_string(), message.to_string());
        fields.insert(
            "time".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        LogRecord { fields }
    }

    /// Serializes the record to the JSON wire payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }
}
