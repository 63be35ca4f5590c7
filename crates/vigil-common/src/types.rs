use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One alert as reported by a machine, together with the evidence and
/// decisions it produced.
///
/// Instants are RFC 3339 strings and decision durations use the human
/// duration grammar (see [`crate::duration`]); both are validated at
/// ingestion, not at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubmission {
    pub scenario: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub events_count: i32,
    pub start_at: String,
    pub stop_at: String,
    pub source: SourceSubmission,
    #[serde(default)]
    pub capacity: i32,
    #[serde(default)]
    pub leakspeed: String,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default)]
    pub scenario_version: String,
    #[serde(default)]
    pub scenario_hash: String,
    #[serde(default)]
    pub events: Vec<EventSubmission>,
    #[serde(default)]
    pub meta: Vec<MetaSubmission>,
    #[serde(default)]
    pub decisions: Vec<DecisionSubmission>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSubmission {
    pub scope: String,
    pub value: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub as_number: Option<String>,
    #[serde(default)]
    pub as_name: Option<String>,
    #[serde(default)]
    pub cn: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubmission {
    pub timestamp: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSubmission {
    pub key: String,
    pub value: String,
}

/// A decision has no expiry instant of its own: `until` is derived from
/// `duration` when the decision is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSubmission {
    pub duration: String,
    pub scenario: String,
    #[serde(rename = "type")]
    pub decision_type: String,
    pub value: String,
    pub scope: String,
    pub origin: String,
    #[serde(default)]
    pub start_ip: Option<i64>,
    #[serde(default)]
    pub end_ip: Option<i64>,
}
