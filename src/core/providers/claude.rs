use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::core::formatter;
use crate::core::models::usage::{UsageSnapshot, READY};
use crate::core::providers::fetch::{http_client, FetchError};
use crate::core::providers::UsageSource;
use crate::core::secrets::SecureStore;

const BASE_URL: &str = "https://claude.ai";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) quotabar";

#[derive(Deserialize)]
struct OrgRaw {
    uuid: String,
    name: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    rate_limit_tier: Option<String>,
}

#[derive(Deserialize)]
struct WindowRaw {
    utilization: Option<f64>,
    resets_at: Option<String>,
}

#[derive(Deserialize)]
struct UsageResponse {
    five_hour: Option<WindowRaw>,
    seven_day: Option<WindowRaw>,
}

/// claude.ai may report utilization as a fraction (0.0-1.0) or a percentage
/// (0-100). Values above 1.0 are treated as percentages. The result is not
/// clamped; over-quota readings keep their >1.0 value.
fn fraction(utilization: f64) -> f64 {
    if utilization > 1.0 {
        utilization / 100.0
    } else {
        utilization
    }
}

/// Normalized (fraction, reset label) for one window. A window that is
/// absent or at zero with no pending reset is a ready session.
fn window_state(raw: Option<&WindowRaw>) -> (f64, String) {
    let Some(raw) = raw else {
        return (0.0, READY.to_string());
    };
    let pct = fraction(raw.utilization.unwrap_or(0.0));
    let resets_at = raw
        .resets_at
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    let label = match resets_at {
        Some(at) => formatter::countdown(&at),
        None if pct == 0.0 => READY.to_string(),
        None => "unknown".to_string(),
    };
    (pct, label)
}

/// Prefer an organization with chat capability; claude.ai lists API-only
/// workspaces alongside the consumer org.
fn pick_org(orgs: Vec<OrgRaw>) -> Option<OrgRaw> {
    let mut orgs = orgs;
    if let Some(pos) = orgs
        .iter()
        .position(|o| o.capabilities.iter().any(|c| c == "chat"))
    {
        return Some(orgs.swap_remove(pos));
    }
    orgs.into_iter().next()
}

/// Accept either a bare sessionKey value or a full cookie header string.
fn cookie_header(secret: &str) -> String {
    if secret.contains('=') {
        secret.to_string()
    } else {
        format!("sessionKey={}", secret)
    }
}

/// Cookie-authenticated usage source for claude.ai.
pub struct ClaudeSource {
    account_id: String,
    secrets: Arc<dyn SecureStore>,
}

impl ClaudeSource {
    pub fn new(account_id: &str, secrets: Arc<dyn SecureStore>) -> Self {
        Self {
            account_id: account_id.to_string(),
            secrets,
        }
    }

    fn cookie(&self) -> Result<String, FetchError> {
        let key = format!("claude_{}", self.account_id);
        let secret = self
            .secrets
            .load(&key)
            .map_err(|e| FetchError::AuthNotFound(e.to_string()))?
            .ok_or_else(|| FetchError::AuthNotFound("no claude.ai cookie stored".into()))?;
        if secret.trim().is_empty() {
            return Err(FetchError::AuthNotFound("stored claude.ai cookie is empty".into()));
        }
        Ok(cookie_header(&secret))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        url: &str,
        cookie: &str,
    ) -> Result<T, FetchError> {
        let response = client
            .get(url)
            .header("Cookie", cookie)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::AuthNotFound(
                "claude.ai rejected the session cookie".into(),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::BadResponse(status.as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn resolve_org(
        &self,
        client: &reqwest::Client,
        cookie: &str,
    ) -> Result<OrgRaw, FetchError> {
        let orgs: Vec<OrgRaw> = self
            .get_json(client, &format!("{}/api/organizations", BASE_URL), cookie)
            .await?;
        pick_org(orgs).ok_or_else(|| FetchError::InvalidBody("no organization in response".into()))
    }

    async fn try_ping(&self) -> Result<bool, FetchError> {
        let cookie = self.cookie()?;
        let client = http_client()?;
        let org = self.resolve_org(&client, &cookie).await?;

        // Opening (and immediately discarding) a conversation registers
        // activity, which starts a fresh session window.
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let create_url = format!("{}/api/organizations/{}/chat_conversations", BASE_URL, org.uuid);
        let response = client
            .post(&create_url)
            .header("Cookie", &cookie)
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "uuid": conversation_id, "name": "" }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let delete_url = format!("{}/{}", create_url, conversation_id);
        let _ = client
            .delete(&delete_url)
            .header("Cookie", &cookie)
            .header("User-Agent", USER_AGENT)
            .send()
            .await;

        Ok(true)
    }
}

#[async_trait::async_trait]
impl UsageSource for ClaudeSource {
    async fn fetch(&self) -> Result<UsageSnapshot, FetchError> {
        let cookie = self.cookie()?;
        let client = http_client()?;
        let org = self.resolve_org(&client, &cookie).await?;

        let usage: UsageResponse = self
            .get_json(
                &client,
                &format!("{}/api/organizations/{}/usage", BASE_URL, org.uuid),
                &cookie,
            )
            .await?;

        let (session_percent, session_reset) = window_state(usage.five_hour.as_ref());
        let (weekly_percent, weekly_reset) = window_state(usage.seven_day.as_ref());

        Ok(UsageSnapshot {
            session_percent,
            session_reset,
            weekly_percent,
            weekly_reset,
            tier: org.rate_limit_tier.clone().unwrap_or_else(|| "free".to_string()),
            organization: org.name,
            plan: org.rate_limit_tier,
            ..UsageSnapshot::empty()
        })
    }

    async fn ping_session(&self) -> bool {
        match self.try_ping().await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!(account = %self.account_id, error = %e, "claude wake ping failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_both_scales() {
        assert!((fraction(0.28) - 0.28).abs() < 1e-10);
        assert!((fraction(59.0) - 0.59).abs() < 1e-10);
        // Exactly 1.0 is a valid fraction, not a percentage.
        assert!((fraction(1.0) - 1.0).abs() < 1e-10);
        // Over-quota percentages stay over 1.0 after normalization.
        assert!((fraction(107.0) - 1.07).abs() < 1e-10);
    }

    #[test]
    fn window_state_ready_when_zero_without_reset() {
        let raw = WindowRaw {
            utilization: Some(0.0),
            resets_at: None,
        };
        let (pct, label) = window_state(Some(&raw));
        assert_eq!(pct, 0.0);
        assert_eq!(label, READY);
    }

    #[test]
    fn window_state_missing_window_is_ready() {
        let (pct, label) = window_state(None);
        assert_eq!(pct, 0.0);
        assert_eq!(label, READY);
    }

    #[test]
    fn window_state_counts_down_to_reset() {
        let future = (Utc::now() + chrono::Duration::minutes(90)).to_rfc3339();
        let raw = WindowRaw {
            utilization: Some(0.4),
            resets_at: Some(future),
        };
        let (pct, label) = window_state(Some(&raw));
        assert!((pct - 0.4).abs() < 1e-10);
        assert!(label.starts_with("in "));
    }

    #[test]
    fn window_state_active_without_reset_is_not_ready() {
        let raw = WindowRaw {
            utilization: Some(0.3),
            resets_at: None,
        };
        let (_, label) = window_state(Some(&raw));
        assert_ne!(label, READY);
    }

    #[test]
    fn pick_org_prefers_chat_capability() {
        let orgs = vec![
            OrgRaw {
                uuid: "api-only".into(),
                name: None,
                capabilities: vec!["api".into()],
                rate_limit_tier: None,
            },
            OrgRaw {
                uuid: "consumer".into(),
                name: Some("Personal".into()),
                capabilities: vec!["chat".into(), "api".into()],
                rate_limit_tier: Some("pro".into()),
            },
        ];
        assert_eq!(pick_org(orgs).unwrap().uuid, "consumer");
    }

    #[test]
    fn pick_org_falls_back_to_first() {
        let orgs = vec![OrgRaw {
            uuid: "only".into(),
            name: None,
            capabilities: vec![],
            rate_limit_tier: None,
        }];
        assert_eq!(pick_org(orgs).unwrap().uuid, "only");
        assert!(pick_org(vec![]).is_none());
    }

    #[test]
    fn cookie_header_wraps_bare_values() {
        assert_eq!(cookie_header("sk-ant-sid01-abc"), "sessionKey=sk-ant-sid01-abc");
        assert_eq!(
            cookie_header("sessionKey=sk-ant-sid01-abc; other=1"),
            "sessionKey=sk-ant-sid01-abc; other=1"
        );
    }

    #[test]
    fn deserialize_usage_response() {
        let json = r#"{
            "five_hour": { "utilization": 0.28, "resets_at": "2025-12-04T19:15:00Z" },
            "seven_day": { "utilization": 59, "resets_at": "2025-12-05T17:00:00Z" }
        }"#;
        let data: UsageResponse = serde_json::from_str(json).unwrap();
        assert!((data.five_hour.unwrap().utilization.unwrap() - 0.28).abs() < 1e-10);
        assert!((data.seven_day.unwrap().utilization.unwrap() - 59.0).abs() < 1e-10);
    }

    #[test]
    fn deserialize_partial_usage_response() {
        let data: UsageResponse = serde_json::from_str("{}").unwrap();
        assert!(data.five_hour.is_none());
        assert!(data.seven_day.is_none());
    }

    #[test]
    fn deserialize_organizations() {
        let json = r#"[
            { "uuid": "11111111-1111-1111-1111-111111111111",
              "name": "Personal",
              "capabilities": ["chat"],
              "rate_limit_tier": "default_claude_max_5x" }
        ]"#;
        let orgs: Vec<OrgRaw> = serde_json::from_str(json).unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].rate_limit_tier.as_deref(), Some("default_claude_max_5x"));
    }
}
