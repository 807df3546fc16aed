use colored::Colorize;

use crate::core::formatter;
use crate::core::models::usage::{UsageSnapshot, READY};
use crate::core::providers::ProviderKind;
use crate::core::registry::AggregateState;

const BAR_WIDTH: usize = 12;

fn window_line(label: &str, percent: f64, reset: &str, use_color: bool) -> String {
    let bar = formatter::usage_bar(percent, BAR_WIDTH);
    let pct = formatter::percent_label(percent);
    let reset_text = if reset == READY {
        "ready".to_string()
    } else if reset.is_empty() {
        String::new()
    } else {
        format!("resets {}", reset)
    };

    let pct_text = if use_color {
        colored::control::set_override(true);
        let colored_pct = if percent >= 0.90 {
            pct.red().to_string()
        } else if percent >= 0.75 {
            pct.yellow().to_string()
        } else {
            pct.green().to_string()
        };
        colored::control::unset_override();
        colored_pct
    } else {
        pct
    };

    if reset_text.is_empty() {
        format!("  {:<8}{} {} used", label, bar, pct_text)
    } else {
        format!("  {:<8}{} {} used · {}", label, bar, pct_text, reset_text)
    }
}

/// Text section for one account: header, both usage windows, identity line.
pub fn render_account(
    name: &str,
    kind: ProviderKind,
    snapshot: Option<&UsageSnapshot>,
    error: Option<&str>,
    use_color: bool,
) -> String {
    let header = format!(" {} ({})", name, kind.display_name());
    let header = if use_color {
        colored::control::set_override(true);
        let h = header.bold().to_string();
        colored::control::unset_override();
        h
    } else {
        header
    };

    let mut lines = vec![header];

    match snapshot {
        Some(snap) => {
            lines.push(window_line(
                "Session",
                snap.session_percent,
                &snap.session_reset,
                use_color,
            ));
            lines.push(window_line(
                "Weekly",
                snap.weekly_percent,
                &snap.weekly_reset,
                use_color,
            ));

            let mut identity = vec![snap.tier.clone()];
            if let Some(email) = &snap.email {
                identity.push(email.clone());
            }
            if let Some(org) = &snap.organization {
                identity.push(org.clone());
            }
            lines.push(format!("  {}", identity.join(" · ")));
        }
        None => {
            lines.push("  no data yet".to_string());
        }
    }

    if let Some(err) = error {
        let line = format!("  error: {}", err);
        let line = if use_color {
            colored::control::set_override(true);
            let l = line.red().to_string();
            colored::control::unset_override();
            l
        } else {
            line
        };
        lines.push(line);
    }

    lines.join("\n")
}

/// One-line summary used by the daemon's periodic status log.
pub fn render_aggregate(state: &AggregateState) -> String {
    match state {
        AggregateState::NoAccounts => "no accounts".to_string(),
        AggregateState::Loading => "loading".to_string(),
        AggregateState::AllReady => "all sessions ready".to_string(),
        AggregateState::Active {
            worst_session,
            worst_weekly,
        } => format!(
            "worst session {} · worst weekly {}",
            formatter::percent_label(*worst_session),
            formatter::percent_label(*worst_weekly)
        ),
    }
}
