//! Core domain model for BLS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

pub const CRATE_NAME: &str = "bls-core";

/// Owner id used when broker resolution finds no matching profile.
/// Listings scraped under this id are left unattributed and never trigger
/// deactivation of existing rows.
pub const PLACEHOLDER_BROKER_ID: Uuid = Uuid::nil();

/// Listing descriptions are clipped to this many characters before persistence.
pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Inactive => "inactive",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "active" => Some(ListingStatus::Active),
            "inactive" => Some(ListingStatus::Inactive),
            _ => None,
        }
    }
}

/// Transient record produced by one scrape pass. Never stored directly;
/// reaches the listings table only through the keyed upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub title: String,
    pub price: i64,
    pub description: String,
    pub images: Vec<String>,
    pub external_url: String,
    pub external_source: String,
    pub location: String,
    pub status: ListingStatus,
    pub broker_id: Option<Uuid>,
}

/// Persisted listing projection used by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub id: Uuid,
    pub external_url: String,
    pub status: ListingStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Configuration entry identifying which broker a scrape target belongs to.
/// Read-only from the sync job's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub id: i64,
    pub broker_id: Uuid,
    pub value: BrokerProfileValue,
}

/// Payload of a broker-profile row. Historically free-form JSON: either a
/// bare string (usually the portal URL itself) or an object of varying shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrokerProfileValue {
    Raw(String),
    Structured(Map<String, JsonValue>),
}

impl BrokerProfileValue {
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::String(text) => BrokerProfileValue::Raw(text),
            JsonValue::Object(map) => BrokerProfileValue::Structured(map),
            other => BrokerProfileValue::Raw(other.to_string()),
        }
    }

    /// Whether this payload refers to `url`. Search order: raw substring
    /// containment, then exact `url`/`link`/`href` fields, then substring
    /// containment over the serialized object.
    pub fn matches_url(&self, url: &str) -> bool {
        match self {
            BrokerProfileValue::Raw(text) => text.contains(url),
            BrokerProfileValue::Structured(map) => {
                for key in ["url", "link", "href"] {
                    if map.get(key).and_then(JsonValue::as_str) == Some(url) {
                        return true;
                    }
                }
                JsonValue::Object(map.clone()).to_string().contains(url)
            }
        }
    }

    /// Optional per-broker override of the parsing strategy name.
    pub fn source_hint(&self) -> Option<&str> {
        match self {
            BrokerProfileValue::Raw(_) => None,
            BrokerProfileValue::Structured(map) => map.get("source").and_then(JsonValue::as_str),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One row of the append-only run ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_processed: i64,
    pub items_upserted: i64,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TARGET: &str = "https://portal.example/agents/9118/jan-novak/";

    #[test]
    fn raw_value_matches_by_substring() {
        let value = BrokerProfileValue::from_json(json!(
            "profile page: https://portal.example/agents/9118/jan-novak/ (primary)"
        ));
        assert!(value.matches_url(TARGET));
        assert!(!value.matches_url("https://portal.example/agents/1/other/"));
    }

    #[test]
    fn structured_value_matches_url_link_and_href_fields() {
        for key in ["url", "link", "href"] {
            let value = BrokerProfileValue::from_json(json!({ key: TARGET }));
            assert!(value.matches_url(TARGET), "field {key} should match");
        }
    }

    #[test]
    fn structured_field_match_is_exact_not_substring() {
        let value = BrokerProfileValue::from_json(json!({ "url": TARGET }));
        assert!(!value.matches_url("https://portal.example/agents/9118/"));
    }

    #[test]
    fn structured_value_falls_back_to_serialized_containment() {
        let value = BrokerProfileValue::from_json(json!({
            "bio": "listings",
            "links": [{ "label": "portal", "target": TARGET }],
        }));
        assert!(value.matches_url(TARGET));
    }

    #[test]
    fn source_hint_reads_source_field() {
        let value = BrokerProfileValue::from_json(json!({ "source": "remax" }));
        assert_eq!(value.source_hint(), Some("remax"));
        assert_eq!(BrokerProfileValue::Raw(TARGET.into()).source_hint(), None);
    }

    #[test]
    fn non_string_non_object_payload_degrades_to_raw() {
        let value = BrokerProfileValue::from_json(json!(["https://a.example", "https://b.example"]));
        assert!(value.matches_url("https://a.example"));
    }

    #[test]
    fn status_labels_round_trip_with_db_text() {
        assert_eq!(ListingStatus::Active.as_str(), "active");
        assert_eq!(ListingStatus::Inactive.as_str(), "inactive");
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Success.as_str(), "success");
        assert_eq!(RunStatus::Error.as_str(), "error");
    }
}
