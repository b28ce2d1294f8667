//! Structured payload recovery from semi-structured log lines.
//!
//! Backends deliver log lines in two wire shapes:
//!
//!   1. `{...json...}` possibly preceded by arbitrary prefix text
//!   2. `[LEVEL]\tTIMESTAMP\tREQUEST_ID\t{...json...}`
//!
//! Both are handled from the same raw input. Parse failure is never an
//! error here; a line that yields no payload is simply skipped by
//! structured analysis downstream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The structured record embedded in a log line.
///
/// Unknown top-level keys are retained in `extra` so nothing the service
/// logged is lost between extraction and re-serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPayload {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Timestamp written by the service itself, distinct from the backend
    /// ingestion timestamp on the surrounding event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_level() -> String {
    "INFO".to_string()
}

/// A recovered payload plus, for the tab-delimited shape, the backend
/// timestamp prefix kept for cross-referencing against the storage console.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPayload {
    pub payload: StructuredPayload,
    pub backend_timestamp: Option<String>,
}

/// Recover a structured payload from a raw log line, or `None`.
///
/// The tab-delimited shape is tried first; if its JSON segment does not
/// parse the input falls through to the first-brace scan.
pub fn extract_structured_payload(raw: &str) -> Option<ExtractedPayload> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw.splitn(4, '\t').collect();
    if parts.len() == 4 {
        if let Ok(payload) = serde_json::from_str::<StructuredPayload>(parts[3].trim()) {
            return Some(ExtractedPayload {
                payload,
                backend_timestamp: Some(parts[1].trim().to_string()),
            });
        }
    }

    let idx = raw.find('{')?;
    let payload = serde_json::from_str::<StructuredPayload>(&raw[idx..]).ok()?;
    Some(ExtractedPayload {
        payload,
        backend_timestamp: None,
    })
}
