use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Severity level carried by an alert.
///
/// The store keeps the raw severity string untouched; this is a typed view
/// for consumers that need to rank or colour alerts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Unknown,
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    /// Parse a severity string case-insensitively. Anything unrecognised is
    /// `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "extreme" => Severity::Extreme,
            "severe" => Severity::Severe,
            "moderate" => Severity::Moderate,
            "minor" => Severity::Minor,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Extreme => "Extreme",
            Severity::Severe => "Severe",
            Severity::Moderate => "Moderate",
            Severity::Minor => "Minor",
            Severity::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A cached emergency alert.
///
/// `alert_id` is the primary key. Both timestamps are Unix epoch
/// milliseconds; `fetched_at` drives read ordering and retention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub alert_id: String,
    pub severity: String,
    pub headline: String,
    pub expires: i64,
    pub instructions: String,
    pub source_url: String,
    /// True when the alert came from an official source.
    pub verified: bool,
    pub fetched_at: i64,
}

impl AlertRecord {
    /// Typed severity, parsed from the stored string.
    pub fn severity_level(&self) -> Severity {
        Severity::parse(&self.severity)
    }

    /// Whether the alert has expired at `now_ms` (epoch millis).
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires <= now_ms
    }

    pub fn fetched_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.fetched_at).single()
    }

    pub fn expires_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires).single()
    }
}
