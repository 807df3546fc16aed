//! Pure threshold-crossing policy.
//!
//! Everything here is a function of (previous reading, current reading,
//! configured thresholds). Session state, cooldowns and user toggles live
//! elsewhere; this module only decides which events a new reading fires.

use crate::core::models::notification::NotificationType;
use crate::core::models::usage::{UsageSnapshot, READY};

/// User-adjustable threshold pair, ordered low-then-high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { low: 0.75, high: 0.90 }
    }
}

/// A crossing fires iff a previous value exists, was below the threshold,
/// and the current value is at or above it. No previous value never fires:
/// the first reading after launch or account creation has no baseline.
///
/// Comparisons are made on the raw values; out-of-range readings (>1.0)
/// from upstream are deliberately not clamped first.
pub fn crossed(prev: Option<f64>, cur: f64, threshold: f64) -> bool {
    match prev {
        Some(prev) => prev < threshold && cur >= threshold,
        None => false,
    }
}

/// A ready transition fires iff the session was previously in use (strictly
/// positive), the new reading is exactly zero, and the provider reports the
/// ready sentinel. The strictly-positive requirement keeps a run of zero
/// readings from firing repeatedly.
pub fn ready_transition(prev: Option<f64>, cur: f64, reset_label: &str) -> bool {
    match prev {
        Some(prev) => prev > 0.0 && cur == 0.0 && reset_label == READY,
        None => false,
    }
}

/// Evaluate all checks for one new reading. Checks are independent; several
/// events can co-fire in the same tick (e.g. both session thresholds when a
/// single reading straddles them).
pub fn evaluate(
    prev_session: Option<f64>,
    prev_weekly: Option<f64>,
    snapshot: &UsageSnapshot,
    thresholds: Thresholds,
) -> Vec<NotificationType> {
    let mut fired = Vec::new();

    if crossed(prev_session, snapshot.session_percent, thresholds.low) {
        fired.push(NotificationType::SessionLow);
    }
    if crossed(prev_session, snapshot.session_percent, thresholds.high) {
        fired.push(NotificationType::SessionHigh);
    }
    if crossed(prev_weekly, snapshot.weekly_percent, thresholds.low) {
        fired.push(NotificationType::WeeklyLow);
    }
    if crossed(prev_weekly, snapshot.weekly_percent, thresholds.high) {
        fired.push(NotificationType::WeeklyHigh);
    }
    if ready_transition(prev_session, snapshot.session_percent, &snapshot.session_reset) {
        fired.push(NotificationType::SessionReady);
    }

    fired
}
