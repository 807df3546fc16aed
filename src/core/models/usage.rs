use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reset label used when a session window has fully reset and no new
/// session has started yet.
pub const READY: &str = "ready";

/// One normalized usage reading for an account at a point in time.
///
/// Percentages are fractions (0.0 - 1.0). Upstream APIs occasionally report
/// values above 1.0; those are passed through as-is rather than clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Session (short window) usage fraction.
    pub session_percent: f64,
    /// Human-readable session reset label, or [`READY`].
    pub session_reset: String,
    /// Weekly (long window) usage fraction.
    pub weekly_percent: f64,
    /// Human-readable weekly reset label.
    pub weekly_reset: String,
    /// Plan/membership tier (e.g. "pro", "free").
    pub tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Raw used/limit pairs for providers that report request or token counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_limit: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Snapshot with zeroed usage and empty labels; providers fill it in.
    pub fn empty() -> Self {
        Self {
            session_percent: 0.0,
            session_reset: String::new(),
            weekly_percent: 0.0,
            weekly_reset: String::new(),
            tier: String::new(),
            email: None,
            organization: None,
            plan: None,
            session_used: None,
            session_limit: None,
            weekly_used: None,
            weekly_limit: None,
            fetched_at: Utc::now(),
        }
    }

    /// True when the session window has reset and is waiting for first use.
    pub fn session_ready(&self) -> bool {
        self.session_percent == 0.0 && self.session_reset == READY
    }

    /// Highest usage fraction across both windows.
    pub fn max_percent(&self) -> f64 {
        self.session_percent.max(self.weekly_percent)
    }
}
