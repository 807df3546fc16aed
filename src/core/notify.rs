use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::models::notification::NotificationType;
use crate::core::models::usage::UsageSnapshot;
use crate::core::settings::Settings;

/// Capability interface over OS notification delivery. One process-wide
/// instance is constructed at startup; tests substitute a recording fake.
pub trait NotificationSink: Send + Sync {
    /// Ask the OS for permission to post notifications. A no-op on
    /// platforms where delivery needs no grant.
    fn request_permission(&self) {}

    fn send(&self, identifier: &str, title: &str, body: &str);

    /// Retract a previously delivered notification, where the platform
    /// supports it.
    fn remove_delivered(&self, identifier: &str);

    fn remove_all_delivered(&self);
}

/// Desktop notification sink backed by notify-rust. Delivery failures are
/// logged and swallowed; a watcher daemon must not die because a
/// notification server is absent.
pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn send(&self, identifier: &str, title: &str, body: &str) {
        let result = notify_rust::Notification::new()
            .appname("quotabar")
            .summary(title)
            .body(body)
            .show();
        match result {
            Ok(_) => debug!(id = identifier, "notification delivered"),
            Err(e) => warn!(id = identifier, error = %e, "notification delivery failed"),
        }
    }

    fn remove_delivered(&self, identifier: &str) {
        // notify-rust exposes no portable retraction by id; the identifier
        // is still tracked so platform backends that can retract do.
        debug!(id = identifier, "retract requested");
    }

    fn remove_all_delivered(&self) {
        debug!("retract-all requested");
    }
}

/// Last-send ledger keyed by (account id, notification type).
///
/// Records are created on first send and overwritten on every send; a
/// cooldown is computed on read as `now - last_sent`, so records never need
/// explicit expiry.
#[derive(Default)]
pub struct CooldownLedger {
    sent: Mutex<HashMap<(String, NotificationType), Instant>>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, account_id: &str, kind: NotificationType, cooldown: Duration) -> bool {
        self.is_allowed_at(account_id, kind, cooldown, Instant::now())
    }

    pub fn record_sent(&self, account_id: &str, kind: NotificationType) {
        self.record_sent_at(account_id, kind, Instant::now());
    }

    fn is_allowed_at(
        &self,
        account_id: &str,
        kind: NotificationType,
        cooldown: Duration,
        now: Instant,
    ) -> bool {
        let sent = self.sent.lock().unwrap();
        match sent.get(&(account_id.to_string(), kind)) {
            Some(last) => now.duration_since(*last) >= cooldown,
            None => true,
        }
    }

    fn record_sent_at(&self, account_id: &str, kind: NotificationType, at: Instant) {
        self.sent
            .lock()
            .unwrap()
            .insert((account_id.to_string(), kind), at);
    }

    /// Drop all records for an account (on removal).
    pub fn forget_account(&self, account_id: &str) {
        self.sent.lock().unwrap().retain(|(id, _), _| id != account_id);
    }
}

/// Settings-and-cooldown filter in front of the sink. A notification is
/// dispatched only when the per-type toggle allows it and the account/type
/// pair is outside its cooldown window.
pub struct NotificationGate {
    sink: std::sync::Arc<dyn NotificationSink>,
    cooldowns: CooldownLedger,
}

impl NotificationGate {
    pub fn new(sink: std::sync::Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            cooldowns: CooldownLedger::new(),
        }
    }

    /// Returns true when the notification was actually dispatched.
    pub fn deliver(
        &self,
        settings: &Settings,
        account_id: &str,
        account_name: &str,
        kind: NotificationType,
        snapshot: &UsageSnapshot,
    ) -> bool {
        if !settings.should_send(kind) {
            debug!(account = account_id, kind = kind.id(), "notification disabled");
            return false;
        }
        if !self.cooldowns.is_allowed(account_id, kind, settings.cooldown()) {
            debug!(account = account_id, kind = kind.id(), "notification in cooldown");
            return false;
        }

        self.sink.send(
            &kind.delivery_id(account_id),
            &kind.title(account_name),
            &kind.body(snapshot),
        );
        self.cooldowns.record_sent(account_id, kind);
        true
    }

    /// Retract everything delivered for an account and drop its cooldown
    /// records; used when the account is removed.
    pub fn purge_account(&self, account_id: &str) {
        for kind in NotificationType::all() {
            self.sink.remove_delivered(&kind.delivery_id(account_id));
        }
        self.cooldowns.forget_account(account_id);
    }

    pub fn request_permission(&self) {
        self.sink.request_permission();
    }
}
