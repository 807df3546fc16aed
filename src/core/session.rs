use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::models::account::Account;
use crate::core::models::notification::NotificationType;
use crate::core::models::usage::UsageSnapshot;
use crate::core::notify::NotificationGate;
use crate::core::providers::{ProviderKind, UsageSource};
use crate::core::settings::SharedSettings;
use crate::core::thresholds::{self, Thresholds};

/// Delay before the extra fetch that follows a successful wake ping, so the
/// freshly started session's numbers show up well before the next tick.
const WAKE_FOLLOWUP_DELAY: Duration = Duration::from_secs(20);

struct SessionState {
    account: Account,
    prev_session: Option<f64>,
    prev_weekly: Option<f64>,
    last_error: Option<String>,
    awaiting_ping: bool,
}

/// Polling lifecycle for one account.
///
/// The session alternates Idle -> Fetching -> Idle on a timer. The
/// `fetching` flag makes a session's fetch mutually exclusive with itself;
/// sessions for different accounts are fully independent. A fetch that is
/// still in flight when the session is closed must not mutate state when it
/// lands, hence the `closed` check after every await.
pub struct AccountSession {
    id: String,
    name: String,
    kind: ProviderKind,
    state: Mutex<SessionState>,
    fetching: AtomicBool,
    closed: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    source: Arc<dyn UsageSource>,
    settings: SharedSettings,
    gate: Arc<NotificationGate>,
}

impl AccountSession {
    pub fn new(
        account: Account,
        source: Arc<dyn UsageSource>,
        settings: SharedSettings,
        gate: Arc<NotificationGate>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: account.id.clone(),
            name: account.name.clone(),
            kind: account.kind,
            state: Mutex::new(SessionState {
                account,
                prev_session: None,
                prev_weekly: None,
                last_error: None,
                awaiting_ping: false,
            }),
            fetching: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            timer: Mutex::new(None),
            source,
            settings,
            gate,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Metadata clone for persistence (includes the cached snapshot).
    pub fn account(&self) -> Account {
        self.state.lock().unwrap().account.clone()
    }

    pub fn snapshot(&self) -> Option<UsageSnapshot> {
        self.state.lock().unwrap().account.usage.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    pub fn awaiting_ping(&self) -> bool {
        self.state.lock().unwrap().awaiting_ping
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Immediate fetch, then a repeating timer at the configured interval.
    pub fn start(self: Arc<Self>) {
        let session = self.clone();
        tokio::spawn(async move {
            session.refresh().await;
        });
        self.arm_timer();
    }

    /// (Re-)arm the timer with the interval the settings hold right now.
    pub fn arm_timer(self: Arc<Self>) {
        let interval = self.settings.read().unwrap().refresh_interval();
        let session = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if session.is_closed() {
                    break;
                }
                session.clone().refresh().await;
            }
        });

        let mut timer = self.timer.lock().unwrap();
        if let Some(old) = timer.take() {
            old.abort();
        }
        *timer = Some(handle);
    }

    /// Cancel the timer. Idempotent; an in-flight fetch is not interrupted.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Stop and mark the session dead: late fetch results are discarded.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// One guarded fetch. A refresh requested while another is in flight is
    /// a no-op.
    pub async fn refresh(self: Arc<Self>) {
        if self.is_closed() {
            return;
        }
        if self.fetching.swap(true, Ordering::SeqCst) {
            debug!(account = %self.id, "fetch already in flight, skipping");
            return;
        }

        let result = self.source.fetch().await;

        if self.is_closed() {
            self.fetching.store(false, Ordering::SeqCst);
            return;
        }

        match result {
            Ok(snapshot) => self.clone().handle_snapshot(snapshot).await,
            Err(e) => {
                warn!(account = %self.id, error = %e, "usage fetch failed");
                // Keep the stale snapshot; only the error status changes.
                self.state.lock().unwrap().last_error = Some(e.to_string());
            }
        }

        self.fetching.store(false, Ordering::SeqCst);
    }

    async fn handle_snapshot(self: Arc<Self>, snapshot: UsageSnapshot) {
        let settings = self.settings.read().unwrap().clone();
        let fired = self.apply_snapshot(snapshot.clone(), settings.threshold_pair());

        for kind in &fired {
            self.gate
                .deliver(&settings, &self.id, &self.name, *kind, &snapshot);
        }

        let ready_fired = fired.contains(&NotificationType::SessionReady);
        if ready_fired && settings.auto_wake && self.kind.supports_ping() {
            self.clone().wake().await;
        }
    }

    /// Fold one successful reading into the session, returning the events
    /// it fired. Evaluation sees the pre-rotation previous values, so the
    /// first-ever reading (prev unset) can never fire.
    fn apply_snapshot(&self, snapshot: UsageSnapshot, thresholds: Thresholds) -> Vec<NotificationType> {
        let mut state = self.state.lock().unwrap();
        let fired = thresholds::evaluate(state.prev_session, state.prev_weekly, &snapshot, thresholds);
        state.prev_session = Some(snapshot.session_percent);
        state.prev_weekly = Some(snapshot.weekly_percent);
        state.account.usage = Some(snapshot);
        state.last_error = None;
        fired
    }

    // Boxed to a `dyn Future` so the mutual recursion
    // refresh -> handle_snapshot -> wake -> (spawned) refresh crosses a type
    // boundary; without it rustc cannot coinductively prove the spawned
    // future is `Send`.
    fn wake(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.state.lock().unwrap().awaiting_ping = true;
            let accepted = self.source.ping_session().await;
            self.state.lock().unwrap().awaiting_ping = false;

            if !accepted {
                debug!(account = %self.id, "wake ping not accepted");
                return;
            }

            info!(account = %self.id, "session woken, scheduling follow-up fetch");
            let session = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(WAKE_FOLLOWUP_DELAY).await;
                session.refresh().await;
            });
        })
    }
}
