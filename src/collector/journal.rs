use serde::Deserialize;
use serde_json::Value;
use std::convert::TryFrom;

use crate::event::{RawEvent, DEFAULT_PRIORITY};

const DEFAULT_UNIT: &str = "system";

/// The fields of a `journalctl -o json` record the pipeline cares about.
#[derive(Debug, Deserialize)]
struct JournalRecord {
    #[serde(rename = "MESSAGE", default)]
    message: Option<Value>,
    #[serde(rename = "PRIORITY", default)]
    priority: Option<Value>,
    #[serde(rename = "_SYSTEMD_UNIT", default)]
    unit: Option<String>,
}

/// Parses one line of journal JSON output. Broken lines and records without
/// a message yield `None`.
#[must_use]
pub fn parse_record(line: &str) -> Option<RawEvent> {
    let record: JournalRecord = serde_json::from_str(line).ok()?;
    let message = record.message.as_ref().and_then(message_text)?;
    let priority = record
        .priority
        .as_ref()
        .and_then(priority_value)
        .unwrap_or(DEFAULT_PRIORITY);
    RawEvent::new(
        &message,
        priority,
        record.unit.as_deref().unwrap_or(DEFAULT_UNIT),
    )
}

// journald emits non-UTF-8 messages as arrays of bytes
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(bytes) => {
            let bytes = bytes
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => None,
    }
}

fn priority_value(value: &Value) -> Option<u8> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    }
}
