use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::formatter;
use crate::core::models::usage::{UsageSnapshot, READY};
use crate::core::providers::fetch::{http_client, FetchError};
use crate::core::providers::UsageSource;

const DB_SUFFIX: &str = "User/globalStorage/state.vscdb";
const SUMMARY_URL: &str = "https://cursor.com/api/usage-summary";
const USER_AGENT: &str = "quotabar/0.4";

/// Resolve the Cursor editor database, honoring a `CURSOR_DATA_DIR`
/// override before probing the platform default locations.
fn resolve_db_path() -> Result<PathBuf, FetchError> {
    if let Ok(dir) = std::env::var("CURSOR_DATA_DIR") {
        let path = PathBuf::from(dir).join(DB_SUFFIX);
        if path.exists() {
            return Ok(path);
        }
        return Err(FetchError::AuthNotFound(format!(
            "CURSOR_DATA_DIR points to a missing database: {}",
            path.display()
        )));
    }

    let candidates = candidate_paths();
    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or_else(|| {
            FetchError::AuthNotFound(format!(
                "Cursor database not found; searched: {}",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

fn candidate_paths() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    let mut paths = Vec::new();
    if cfg!(target_os = "macos") {
        paths.push(home.join("Library/Application Support/Cursor").join(DB_SUFFIX));
    } else if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            paths.push(PathBuf::from(appdata).join("Cursor").join(DB_SUFFIX));
        }
    } else {
        paths.push(home.join(".config/Cursor").join(DB_SUFFIX));
    }
    paths
}

#[derive(Debug)]
struct Credentials {
    user_id: String,
    access_token: String,
    email: Option<String>,
    membership: Option<String>,
}

/// Read session credentials from the editor's state database (read-only).
fn read_credentials(db_path: &Path) -> Result<Credentials, FetchError> {
    let conn = rusqlite::Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|e| FetchError::AuthNotFound(format!("cannot open Cursor database: {}", e)))?;

    let query = |key: &str| -> Option<String> {
        conn.query_row("SELECT value FROM ItemTable WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .ok()
    };

    let access_token = query("cursorAuth/accessToken").ok_or_else(|| {
        FetchError::AuthNotFound("accessToken not found — is Cursor signed in?".into())
    })?;
    let user_id = extract_user_id(&query)?;
    let email = query("cursorAuth/cachedEmail");
    let membership = query("cursorAuth/stripeMembershipType");

    Ok(Credentials {
        user_id,
        access_token,
        email,
        membership,
    })
}

fn extract_user_id(query: &dyn Fn(&str) -> Option<String>) -> Result<String, FetchError> {
    let blob = query("workbench.experiments.statsigBootstrap").ok_or_else(|| {
        FetchError::AuthNotFound("statsigBootstrap not found in Cursor database".into())
    })?;
    let parsed: serde_json::Value = serde_json::from_str(&blob)
        .map_err(|e| FetchError::InvalidBody(format!("statsigBootstrap: {}", e)))?;
    parsed["user"]["userID"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| FetchError::InvalidBody("userID missing from statsigBootstrap".into()))
}

fn auth_cookie(creds: &Credentials) -> String {
    let raw = format!("{}::{}", creds.user_id, creds.access_token);
    format!("WorkosCursorSessionToken={}", percent_encode(&raw))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    billing_cycle_end: Option<String>,
    individual_usage: Option<IndividualUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndividualUsage {
    plan: Option<PlanUsage>,
    on_demand: Option<OnDemandUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanUsage {
    used: Option<u64>,
    limit: Option<u64>,
    total_percent_used: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnDemandUsage {
    enabled: Option<bool>,
    used: Option<u64>,
    limit: Option<u64>,
}

fn ratio(used: Option<u64>, limit: Option<u64>) -> f64 {
    match (used, limit) {
        (Some(u), Some(l)) if l > 0 => u as f64 / l as f64,
        _ => 0.0,
    }
}

fn build_snapshot(creds: &Credentials, summary: SummaryResponse) -> UsageSnapshot {
    let cycle_end = summary
        .billing_cycle_end
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    let cycle_label = cycle_end.as_ref().map(|at| formatter::countdown(at));

    let plan = summary
        .individual_usage
        .as_ref()
        .and_then(|u| u.plan.as_ref());
    // Dashboard reports percent 0-100; kept unclamped so overage shows >1.0.
    let session_percent = plan
        .and_then(|p| p.total_percent_used)
        .map(|pct| pct / 100.0)
        .unwrap_or_else(|| ratio(plan.and_then(|p| p.used), plan.and_then(|p| p.limit)));

    let session_reset = match &cycle_label {
        Some(label) => label.clone(),
        None if session_percent == 0.0 => READY.to_string(),
        None => "unknown".to_string(),
    };

    let on_demand = summary
        .individual_usage
        .as_ref()
        .and_then(|u| u.on_demand.as_ref())
        .filter(|od| od.enabled == Some(true));
    let weekly_percent = on_demand
        .map(|od| ratio(od.used, od.limit))
        .unwrap_or(0.0);
    let weekly_reset = cycle_label.unwrap_or_else(|| "unknown".to_string());

    UsageSnapshot {
        session_percent,
        session_reset,
        weekly_percent,
        weekly_reset,
        tier: creds.membership.clone().unwrap_or_else(|| "free".to_string()),
        email: creds.email.clone(),
        session_used: plan.and_then(|p| p.used),
        session_limit: plan.and_then(|p| p.limit),
        weekly_used: on_demand.and_then(|od| od.used),
        weekly_limit: on_demand.and_then(|od| od.limit),
        ..UsageSnapshot::empty()
    }
}

/// Usage source backed by the local Cursor install: credentials come from
/// the editor database, the numbers from the cursor.com dashboard API.
pub struct CursorSource;

impl CursorSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CursorSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UsageSource for CursorSource {
    async fn fetch(&self) -> Result<UsageSnapshot, FetchError> {
        let db_path = resolve_db_path()?;
        // rusqlite is synchronous; keep it off the async workers.
        let creds = tokio::task::spawn_blocking(move || read_credentials(&db_path))
            .await
            .map_err(|e| FetchError::Network(e.to_string()))??;

        let client = http_client()?;
        let response = client
            .get(SUMMARY_URL)
            .header("Cookie", auth_cookie(&creds))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::AuthNotFound(
                "cursor.com rejected the session token".into(),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::BadResponse(status.as_u16()));
        }

        let summary: SummaryResponse = response.json().await?;
        Ok(build_snapshot(&creds, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            user_id: "user_01ABC".to_string(),
            access_token: "ey.token".to_string(),
            email: Some("dev@example.com".to_string()),
            membership: Some("pro".to_string()),
        }
    }

    #[test]
    fn percent_encode_leaves_unreserved() {
        assert_eq!(percent_encode("abc-XYZ_0.~"), "abc-XYZ_0.~");
        assert_eq!(percent_encode("a::b"), "a%3A%3Ab");
        assert_eq!(percent_encode("a b"), "a%20b");
    }

    #[test]
    fn auth_cookie_joins_user_and_token() {
        let cookie = auth_cookie(&creds());
        assert!(cookie.starts_with("WorkosCursorSessionToken="));
        assert!(cookie.contains("user_01ABC%3A%3Aey.token"));
    }

    #[test]
    fn build_snapshot_maps_plan_and_on_demand() {
        let future = (Utc::now() + chrono::Duration::days(12)).to_rfc3339();
        let json = format!(
            r#"{{
                "billingCycleEnd": "{}",
                "individualUsage": {{
                    "plan": {{ "used": 350, "limit": 500, "totalPercentUsed": 70.0 }},
                    "onDemand": {{ "enabled": true, "used": 20, "limit": 100 }}
                }}
            }}"#,
            future
        );
        let summary: SummaryResponse = serde_json::from_str(&json).unwrap();
        let snap = build_snapshot(&creds(), summary);

        assert!((snap.session_percent - 0.70).abs() < 1e-10);
        assert!((snap.weekly_percent - 0.20).abs() < 1e-10);
        assert!(snap.session_reset.starts_with("in "));
        assert_eq!(snap.tier, "pro");
        assert_eq!(snap.email.as_deref(), Some("dev@example.com"));
        assert_eq!(snap.session_used, Some(350));
        assert_eq!(snap.session_limit, Some(500));
    }

    #[test]
    fn build_snapshot_falls_back_to_ratio() {
        let json = r#"{
            "individualUsage": {
                "plan": { "used": 100, "limit": 400 }
            }
        }"#;
        let summary: SummaryResponse = serde_json::from_str(json).unwrap();
        let snap = build_snapshot(&creds(), summary);
        assert!((snap.session_percent - 0.25).abs() < 1e-10);
        assert_eq!(snap.session_reset, "unknown");
    }

    #[test]
    fn build_snapshot_overage_stays_unclamped() {
        let json = r#"{
            "individualUsage": {
                "plan": { "used": 560, "limit": 500, "totalPercentUsed": 112.0 }
            }
        }"#;
        let summary: SummaryResponse = serde_json::from_str(json).unwrap();
        let snap = build_snapshot(&creds(), summary);
        assert!((snap.session_percent - 1.12).abs() < 1e-10);
    }

    #[test]
    fn build_snapshot_empty_summary_is_ready() {
        let summary: SummaryResponse = serde_json::from_str("{}").unwrap();
        let snap = build_snapshot(&creds(), summary);
        assert_eq!(snap.session_percent, 0.0);
        assert_eq!(snap.session_reset, READY);
        assert_eq!(snap.weekly_percent, 0.0);
    }

    #[test]
    fn disabled_on_demand_is_ignored() {
        let json = r#"{
            "individualUsage": {
                "plan": { "used": 10, "limit": 100, "totalPercentUsed": 10.0 },
                "onDemand": { "enabled": false, "used": 99, "limit": 100 }
            }
        }"#;
        let summary: SummaryResponse = serde_json::from_str(json).unwrap();
        let snap = build_snapshot(&creds(), summary);
        assert_eq!(snap.weekly_percent, 0.0);
        assert_eq!(snap.weekly_used, None);
    }

    #[test]
    fn read_credentials_from_state_db() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.vscdb");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute("CREATE TABLE ItemTable (key TEXT PRIMARY KEY, value TEXT)", [])
            .unwrap();
        let rows = [
            ("cursorAuth/accessToken", "tok_123"),
            ("cursorAuth/cachedEmail", "dev@example.com"),
            ("cursorAuth/stripeMembershipType", "pro"),
            (
                "workbench.experiments.statsigBootstrap",
                r#"{"user":{"userID":"user_42"}}"#,
            ),
        ];
        for (k, v) in rows {
            conn.execute("INSERT INTO ItemTable (key, value) VALUES (?1, ?2)", [k, v])
                .unwrap();
        }
        drop(conn);

        let creds = read_credentials(&db_path).unwrap();
        assert_eq!(creds.access_token, "tok_123");
        assert_eq!(creds.user_id, "user_42");
        assert_eq!(creds.email.as_deref(), Some("dev@example.com"));
        assert_eq!(creds.membership.as_deref(), Some("pro"));
    }

    #[test]
    fn read_credentials_missing_token_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.vscdb");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute("CREATE TABLE ItemTable (key TEXT PRIMARY KEY, value TEXT)", [])
            .unwrap();
        drop(conn);

        let err = read_credentials(&db_path).unwrap_err();
        assert!(matches!(err, FetchError::AuthNotFound(_)));
    }

    #[test]
    fn candidate_paths_are_not_empty_on_unix() {
        if !cfg!(target_os = "windows") {
            assert!(!candidate_paths().is_empty());
        }
    }
}
