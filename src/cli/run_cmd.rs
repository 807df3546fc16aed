use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cli::renderer;
use crate::core::notify::{DesktopNotifier, NotificationGate};
use crate::core::registry::SessionRegistry;
use crate::core::secrets::{KeyringStore, SecureStore};
use crate::core::settings::{Settings, SharedSettings};

/// How often the daemon logs its aggregate state.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Wire up the process-wide capabilities and open the registry.
pub fn build_registry() -> Result<(SessionRegistry, SharedSettings)> {
    let settings = Settings::load().unwrap_or_default().shared();
    let secrets: Arc<dyn SecureStore> = Arc::new(KeyringStore::new());
    let gate = Arc::new(NotificationGate::new(Arc::new(DesktopNotifier)));
    gate.request_permission();
    let registry = SessionRegistry::open(
        SessionRegistry::default_path(),
        settings.clone(),
        secrets,
        gate,
    )?;
    Ok((registry, settings))
}

/// Run the watcher until interrupted.
pub async fn run() -> Result<()> {
    let (registry, settings) = build_registry()?;

    if registry.is_empty() {
        eprintln!("No accounts configured. Run `quotabar account add` first.");
        return Ok(());
    }

    registry.start_all();
    info!(accounts = registry.len(), "watcher started");

    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    summary.tick().await; // immediate first tick

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = summary.tick() => {
                reload_settings(&settings, &registry);
                let sessions = registry.sessions();
                let in_flight = sessions.iter().filter(|s| s.is_fetching()).count();
                let waking = sessions.iter().filter(|s| s.awaiting_ping()).count();
                info!(
                    state = %renderer::render_aggregate(&registry.aggregate_state()),
                    in_flight,
                    waking,
                    "summary"
                );
            }
        }
    }

    info!("shutting down");
    registry.stop_all();
    Ok(())
}

/// Pick up edits to the config file while running; a changed refresh
/// interval re-arms every session's timer.
fn reload_settings(settings: &SharedSettings, registry: &SessionRegistry) {
    let Ok(latest) = Settings::load() else { return };

    let interval_changed = {
        let current = settings.read().unwrap();
        current.refresh_interval() != latest.refresh_interval()
    };
    *settings.write().unwrap() = latest;

    if interval_changed {
        info!("refresh interval changed, re-arming timers");
        registry.reschedule_all();
    }
}
