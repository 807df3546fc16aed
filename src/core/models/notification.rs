use serde::{Deserialize, Serialize};

use crate::core::models::usage::UsageSnapshot;

/// The closed set of notification events a session can raise.
///
/// The string ids are stable: they name the default thresholds and are used
/// as cooldown keys and OS notification identifiers even when the user
/// adjusts the numeric threshold values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SessionLow,
    SessionHigh,
    WeeklyLow,
    WeeklyHigh,
    SessionReady,
}

impl NotificationType {
    pub fn id(&self) -> &'static str {
        match self {
            Self::SessionLow => "session_75",
            Self::SessionHigh => "session_90",
            Self::WeeklyLow => "weekly_75",
            Self::WeeklyHigh => "weekly_90",
            Self::SessionReady => "session_ready",
        }
    }

    pub fn all() -> &'static [NotificationType] {
        &[
            Self::SessionLow,
            Self::SessionHigh,
            Self::WeeklyLow,
            Self::WeeklyHigh,
            Self::SessionReady,
        ]
    }

    /// Identifier under which a delivered notification is keyed, so it can
    /// be retracted later (e.g. on account removal).
    pub fn delivery_id(&self, account_id: &str) -> String {
        format!("{}_{}", account_id, self.id())
    }

    pub fn title(&self, account_name: &str) -> String {
        match self {
            Self::SessionLow => format!("{}: session usage climbing", account_name),
            Self::SessionHigh => format!("{}: session nearly exhausted", account_name),
            Self::WeeklyLow => format!("{}: weekly usage climbing", account_name),
            Self::WeeklyHigh => format!("{}: weekly nearly exhausted", account_name),
            Self::SessionReady => format!("{}: session ready", account_name),
        }
    }

    pub fn body(&self, snapshot: &UsageSnapshot) -> String {
        match self {
            Self::SessionLow | Self::SessionHigh => format!(
                "Session usage at {:.0}%, resets {}",
                snapshot.session_percent * 100.0,
                snapshot.session_reset
            ),
            Self::WeeklyLow | Self::WeeklyHigh => format!(
                "Weekly usage at {:.0}%, resets {}",
                snapshot.weekly_percent * 100.0,
                snapshot.weekly_reset
            ),
            Self::SessionReady => "A new session window is available".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_distinct() {
        let ids: Vec<&str> = NotificationType::all().iter().map(|t| t.id()).collect();
        assert_eq!(
            ids,
            vec!["session_75", "session_90", "weekly_75", "weekly_90", "session_ready"]
        );
    }

    #[test]
    fn delivery_id_combines_account_and_type() {
        let id = NotificationType::SessionHigh.delivery_id("abc-123");
        assert_eq!(id, "abc-123_session_90");
    }

    #[test]
    fn body_reports_the_matching_window() {
        let snap = UsageSnapshot {
            session_percent: 0.78,
            session_reset: "in 2h 10m".to_string(),
            weekly_percent: 0.91,
            weekly_reset: "in 3d".to_string(),
            ..UsageSnapshot::empty()
        };
        assert!(NotificationType::SessionLow.body(&snap).contains("78%"));
        assert!(NotificationType::WeeklyHigh.body(&snap).contains("91%"));
        assert!(NotificationType::WeeklyHigh.body(&snap).contains("in 3d"));
    }
}
