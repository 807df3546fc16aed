use chrono::{DateTime, Utc};

/// Returns "in Xh Ym" relative to now, "in Xd Yh" beyond a day, or "now"
/// once the instant has passed.
pub fn countdown(resets_at: &DateTime<Utc>) -> String {
    let total_seconds = (*resets_at - Utc::now()).num_seconds();
    if total_seconds <= 0 {
        return "now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("in {}d", days)
        } else {
            format!("in {}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("in {}h {}m", hours, minutes)
    } else {
        format!("in {}m", total_minutes.max(1))
    }
}

/// Returns "72%" for a 0.28 usage fraction, rounded to the nearest integer.
pub fn percent_label(fraction: f64) -> String {
    format!("{}%", (fraction * 100.0).round() as i64)
}

/// Returns "[████████░░░░]" where █ = remaining portion, ░ = used portion.
/// Width is the number of block characters inside the brackets.
pub fn usage_bar(used_fraction: f64, width: usize) -> String {
    let used = used_fraction.clamp(0.0, 1.0);
    let used_blocks = (used * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    let filled: String = "█".repeat(remaining_blocks);
    let empty: String = "░".repeat(used_blocks);

    format!("[{}{}]", filled, empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn countdown_past_is_now() {
        let past = Utc::now() - Duration::seconds(10);
        assert_eq!(countdown(&past), "now");
    }

    #[test]
    fn countdown_minutes_only() {
        let future = Utc::now() + Duration::minutes(45);
        let label = countdown(&future);
        assert!(label.starts_with("in "));
        assert!(label.ends_with('m'));
        assert!(!label.contains('h'));
    }

    #[test]
    fn countdown_hours_and_minutes() {
        let future = Utc::now() + Duration::minutes(135);
        let label = countdown(&future);
        assert!(label.contains('h'));
        assert!(label.contains('m'));
    }

    #[test]
    fn countdown_days() {
        let future = Utc::now() + Duration::hours(25);
        assert!(countdown(&future).contains('d'));
    }

    #[test]
    fn percent_label_rounds() {
        assert_eq!(percent_label(0.284), "28%");
        assert_eq!(percent_label(0.0), "0%");
        assert_eq!(percent_label(1.0), "100%");
        // Out-of-range input is the provider's business; the label just renders it.
        assert_eq!(percent_label(1.07), "107%");
    }

    #[test]
    fn usage_bar_fills_remaining() {
        assert_eq!(usage_bar(0.0, 12), "[████████████]");
        assert_eq!(usage_bar(1.0, 12), "[░░░░░░░░░░░░]");
        assert_eq!(usage_bar(0.5, 12), "[██████░░░░░░]");
        // Over-limit readings clamp for rendering only.
        assert_eq!(usage_bar(1.4, 12), "[░░░░░░░░░░░░]");
    }
}
