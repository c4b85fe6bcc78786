use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Sources ---

/// How a source is polled. Only strategy today: fetch the page, reduce it to
/// visible text, and diff against the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    HtmlDiff,
}

impl std::fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStrategy::HtmlDiff => write!(f, "html_diff"),
        }
    }
}

impl std::str::FromStr for SourceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html_diff" => Ok(SourceStrategy::HtmlDiff),
            other => Err(format!("unknown source strategy: {other}")),
        }
    }
}

/// A single polling target, materialized at scout creation. The URL is a
/// search URL (dynamic content), not a fixed article URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutSource {
    pub url: String,
    pub label: String,
    pub strategy: SourceStrategy,
}

// --- Scout config ---

/// One user-initiated monitoring request. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutConfig {
    pub scout_id: String,
    pub query: String,
    pub email: String,
    pub sources: Vec<ScoutSource>,
    pub created_at: DateTime<Utc>,
    /// Absent only in stores written before the expiration column existed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ScoutConfig {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

// --- Snapshot ---

/// The most recent fetched state of a source. Overwritten every poll cycle.
/// An empty `content_hash` marks the baseline cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub content_hash: String,
    pub text: String,
    pub checked_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn is_baseline(prev: Option<&Snapshot>) -> bool {
        match prev {
            None => true,
            Some(s) => s.content_hash.is_empty(),
        }
    }
}

// --- Events ---

/// An article referenced by a detected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventArticle {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single detected meaningful transition, keyed by
/// `SHA256(sourceUrl | oldHash | newHash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutEvent {
    pub event_id: String,
    pub source_url: String,
    pub source_label: String,
    pub tldr: String,
    pub summary: String,
    pub highlights: Vec<String>,
    pub articles: Vec<EventArticle>,
    pub is_breaking: bool,
    pub detected_at: DateTime<Utc>,
    pub notified: bool,
}

// --- Email counter ---

/// Per-UTC-day outbound email tally. Only the current day's row is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCount {
    pub date_key: String,
    pub count: u32,
}

/// The `YYYY-MM-DD` counter key for a UTC instant.
pub fn date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_key_is_utc_day() {
        let t = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(date_key(t), "2026-03-09");
    }

    #[test]
    fn baseline_when_snapshot_absent_or_hash_empty() {
        assert!(Snapshot::is_baseline(None));
        let empty = Snapshot {
            content_hash: String::new(),
            text: "migrated row".into(),
            checked_at: Utc::now(),
        };
        assert!(Snapshot::is_baseline(Some(&empty)));
        let real = Snapshot {
            content_hash: "abc".into(),
            text: "t".into(),
            checked_at: Utc::now(),
        };
        assert!(!Snapshot::is_baseline(Some(&real)));
    }

    #[test]
    fn strategy_round_trips_through_str() {
        let s: SourceStrategy = "html_diff".parse().unwrap();
        assert_eq!(s, SourceStrategy::HtmlDiff);
        assert_eq!(s.to_string(), "html_diff");
        assert!("rss".parse::<SourceStrategy>().is_err());
    }
}
