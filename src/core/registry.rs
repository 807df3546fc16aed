use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::models::account::{secret_key, Account};
use crate::core::models::usage::UsageSnapshot;
use crate::core::notify::NotificationGate;
use crate::core::providers::{source_for, ProviderKind};
use crate::core::secrets::SecureStore;
use crate::core::session::AccountSession;
use crate::core::settings::SharedSettings;

/// One persisted account record. The legacy format embedded credential
/// material directly in the record; those fields are only ever read (for
/// migration into the secure store) and are stripped before writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    id: String,
    name: String,
    kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<UsageSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    credentials_migrated: bool,
    #[serde(default)]
    accounts: Vec<StoredAccount>,
}

/// Summary of all sessions, derived on demand for the display layer and
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    NoAccounts,
    /// No account has produced a reading yet.
    Loading,
    /// Every account's session window is ready.
    AllReady,
    /// Worst-case usage across accounts that have readings.
    Active { worst_session: f64, worst_weekly: f64 },
}

fn aggregate(snapshots: &[Option<UsageSnapshot>]) -> AggregateState {
    if snapshots.is_empty() {
        return AggregateState::NoAccounts;
    }
    let readings: Vec<&UsageSnapshot> = snapshots.iter().flatten().collect();
    if readings.is_empty() {
        return AggregateState::Loading;
    }
    if readings.iter().all(|s| s.session_ready()) {
        return AggregateState::AllReady;
    }
    AggregateState::Active {
        worst_session: readings
            .iter()
            .map(|s| s.session_percent)
            .fold(0.0, f64::max),
        worst_weekly: readings
            .iter()
            .map(|s| s.weekly_percent)
            .fold(0.0, f64::max),
    }
}

/// Owns the account sessions: persistence, lifecycle, credential migration,
/// and summary aggregation.
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<AccountSession>>>,
    settings: SharedSettings,
    secrets: Arc<dyn SecureStore>,
    gate: Arc<NotificationGate>,
    path: PathBuf,
    /// Legacy secrets whose migration into the secure store failed. They are
    /// re-embedded on every persist so the next launch retries; the
    /// migration flag stays unset until this drains.
    pending_secrets: Mutex<std::collections::HashMap<String, String>>,
}

impl SessionRegistry {
    /// Account-list path, respecting XDG_CONFIG_HOME.
    pub fn default_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("quotabar").join("accounts.json")
    }

    /// Load the account list, run the credential migration if it has not
    /// completed yet, and build (unstarted) sessions.
    pub fn open(
        path: PathBuf,
        settings: SharedSettings,
        secrets: Arc<dyn SecureStore>,
        gate: Arc<NotificationGate>,
    ) -> Result<Self> {
        let mut file = load_file(&path)?;

        if !file.credentials_migrated {
            let complete = migrate_credentials(&mut file, secrets.as_ref());
            file.credentials_migrated = complete;
            write_file(&path, &file)?;
            if complete {
                info!("credential migration complete");
            } else {
                warn!("credential migration incomplete, will retry on next launch");
            }
        }

        // Secrets still embedded after migration stay pending until a
        // later launch stores them successfully.
        let pending_secrets: std::collections::HashMap<String, String> = file
            .accounts
            .iter()
            .filter_map(|a| {
                a.session_key
                    .clone()
                    .or_else(|| a.api_key.clone())
                    .map(|secret| (a.id.clone(), secret))
            })
            .collect();

        let sessions = file
            .accounts
            .iter()
            .map(|stored| {
                let account = Account {
                    id: stored.id.clone(),
                    name: stored.name.clone(),
                    kind: stored.kind,
                    usage: stored.usage.clone(),
                };
                let source = source_for(account.kind, &account.id, secrets.clone());
                AccountSession::new(account, source, settings.clone(), gate.clone())
            })
            .collect();

        Ok(Self {
            sessions: Mutex::new(sessions),
            settings,
            secrets,
            gate,
            path,
            pending_secrets: Mutex::new(pending_secrets),
        })
    }

    pub fn sessions(&self) -> Vec<Arc<AccountSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_all(&self) {
        for session in self.sessions() {
            session.start();
        }
    }

    /// Stop timers and persist the latest cached snapshots.
    pub fn stop_all(&self) {
        for session in self.sessions() {
            session.stop();
        }
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist accounts on shutdown");
        }
    }

    /// Create an account, store its credential material, persist, and start
    /// its session.
    pub fn add(&self, name: &str, kind: ProviderKind, secret: Option<&str>) -> Result<String> {
        let account = Account::new(name, kind);
        if let Some(secret) = secret {
            self.secrets
                .save(&account.secret_key(), secret)
                .with_context(|| format!("Failed to store credentials for '{}'", name))?;
        }

        let source = source_for(kind, &account.id, self.secrets.clone());
        let session = AccountSession::new(
            account.clone(),
            source,
            self.settings.clone(),
            self.gate.clone(),
        );
        self.sessions.lock().unwrap().push(session.clone());
        self.persist()?;
        session.start();

        info!(account = %account.id, name = %account.name, "account added");
        Ok(account.id)
    }

    /// Remove an account: stop its session, purge credentials and delivered
    /// notifications, persist. A secure-store delete failure is logged but
    /// does not block removal.
    pub fn remove(&self, id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.lock().unwrap();
            let pos = sessions
                .iter()
                .position(|s| s.id() == id)
                .with_context(|| format!("No account with id '{}'", id))?;
            sessions.remove(pos)
        };

        session.close();
        if let Err(e) = self.secrets.delete(&secret_key(session.kind(), id)) {
            warn!(account = id, error = %e, "failed to delete stored credentials");
        }
        self.gate.purge_account(id);
        self.pending_secrets.lock().unwrap().remove(id);
        self.persist()?;

        info!(account = id, "account removed");
        Ok(())
    }

    /// Manual refresh across all sessions; in-flight sessions skip.
    pub async fn refresh_all(&self) {
        let handles: Vec<_> = self
            .sessions()
            .into_iter()
            .map(|session| tokio::spawn(async move { session.refresh().await }))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Re-arm every session's timer with the interval the settings hold
    /// now; used when the user changes the refresh interval.
    pub fn reschedule_all(&self) {
        for session in self.sessions() {
            session.arm_timer();
        }
    }

    pub fn aggregate_state(&self) -> AggregateState {
        let snapshots: Vec<Option<UsageSnapshot>> =
            self.sessions().iter().map(|s| s.snapshot()).collect();
        aggregate(&snapshots)
    }

    /// Write the account list: metadata plus cached snapshots. Secrets are
    /// excluded by construction, except legacy ones still awaiting
    /// migration, which must survive until the secure store accepts them.
    pub fn persist(&self) -> Result<()> {
        let pending = self.pending_secrets.lock().unwrap();
        let accounts: Vec<StoredAccount> = self
            .sessions()
            .iter()
            .map(|session| {
                let account = session.account();
                let legacy = pending.get(&account.id).cloned();
                let (session_key, api_key) = match account.kind {
                    ProviderKind::Glm => (None, legacy),
                    _ => (legacy, None),
                };
                StoredAccount {
                    id: account.id,
                    name: account.name,
                    kind: account.kind,
                    usage: account.usage,
                    session_key,
                    api_key,
                }
            })
            .collect();
        let file = AccountsFile {
            credentials_migrated: pending.is_empty(),
            accounts,
        };
        write_file(&self.path, &file)
    }
}

fn load_file(path: &Path) -> Result<AccountsFile> {
    if !path.exists() {
        return Ok(AccountsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_file(path: &Path, file: &AccountsFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(file).context("Failed to serialize account list")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Move legacy embedded credentials into the secure store. Each record is
/// stripped only after its secret is stored; returns true when every record
/// migrated cleanly, so a partial failure is retried on the next launch.
fn migrate_credentials(file: &mut AccountsFile, secrets: &dyn SecureStore) -> bool {
    let mut complete = true;
    for account in &mut file.accounts {
        let legacy = account.session_key.take().or_else(|| account.api_key.take());
        let Some(secret) = legacy else { continue };

        let key = secret_key(account.kind, &account.id);
        match secrets.save(&key, &secret) {
            Ok(()) => {
                info!(account = %account.id, "migrated embedded credentials to secure store");
            }
            Err(e) => {
                warn!(account = %account.id, error = %e, "credential migration failed");
                // Put the secret back so the next launch retries.
                match account.kind {
                    ProviderKind::Glm => account.api_key = Some(secret),
                    _ => account.session_key = Some(secret),
                }
                complete = false;
            }
        }
    }
    complete
}
