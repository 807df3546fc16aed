use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::cli::run_cmd::build_registry;
use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::ProviderKind;
use crate::core::session::AccountSession;

fn worst(session: &std::sync::Arc<AccountSession>) -> f64 {
    session
        .snapshot()
        .map(|snap| snap.max_percent())
        .unwrap_or(-1.0)
}

#[derive(Serialize)]
struct AccountPayload {
    id: String,
    name: String,
    kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<UsageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Fetch every account once and print the results.
pub async fn run(opts: &OutputOptions) -> Result<()> {
    let (registry, _settings) = build_registry()?;

    if registry.is_empty() {
        eprintln!("No accounts configured. Run `quotabar account add` first.");
        return Ok(());
    }

    registry.refresh_all().await;

    // Worst usage first.
    let mut sessions = registry.sessions();
    sessions.sort_by(|a, b| {
        worst(b).partial_cmp(&worst(a)).unwrap_or(std::cmp::Ordering::Equal)
    });

    match opts.format {
        OutputFormat::Text => {
            let mut sections = Vec::new();
            for session in &sessions {
                let snapshot = session.snapshot();
                let error = session.last_error();
                sections.push(renderer::render_account(
                    session.name(),
                    session.kind(),
                    snapshot.as_ref(),
                    error.as_deref(),
                    opts.use_color,
                ));
            }
            println!("{}", sections.join("\n\n"));
        }
        OutputFormat::Json => {
            let payloads: Vec<AccountPayload> = sessions
                .iter()
                .map(|session| AccountPayload {
                    id: session.id().to_string(),
                    name: session.name().to_string(),
                    kind: session.kind(),
                    usage: session.snapshot(),
                    error: session.last_error(),
                })
                .collect();

            let json = if opts.pretty {
                serde_json::to_string_pretty(&payloads)?
            } else {
                serde_json::to_string(&payloads)?
            };
            println!("{}", json);
        }
    }

    registry.stop_all();
    Ok(())
}
