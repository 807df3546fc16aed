use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::formatter;
use crate::core::models::usage::{UsageSnapshot, READY};
use crate::core::providers::fetch::{http_client, validate_endpoint, FetchError};
use crate::core::providers::UsageSource;
use crate::core::secrets::SecureStore;

const DEFAULT_HOST: &str = "api.z.ai";
const FALLBACK_HOST: &str = "open.bigmodel.cn";
const PATH: &str = "/api/monitor/usage/quota/limit";

#[derive(Deserialize)]
struct LimitEntry {
    #[serde(rename = "limitType")]
    limit_type: Option<String>,
    used: Option<f64>,
    limit: Option<f64>,
    #[serde(rename = "resetTime")]
    reset_time: Option<String>,
}

#[derive(Deserialize)]
struct GlmData {
    limits: Option<Vec<LimitEntry>>,
}

#[derive(Deserialize)]
struct GlmResponse {
    data: Option<GlmData>,
}

fn resolve_url() -> String {
    let host = std::env::var("GLM_API_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    format!("https://{}{}", host, PATH)
}

fn fallback_url() -> String {
    format!("https://{}{}", FALLBACK_HOST, PATH)
}

/// Normalized (fraction, reset label, used, limit) for one quota entry.
/// The fraction is used/limit, left unclamped when usage exceeds the limit.
fn limit_state(entry: Option<&LimitEntry>) -> (f64, String, Option<u64>, Option<u64>) {
    let Some(entry) = entry else {
        return (0.0, READY.to_string(), None, None);
    };
    let used = entry.used.unwrap_or(0.0);
    let limit = entry.limit.unwrap_or(0.0);
    let pct = if limit > 0.0 { used / limit } else { 0.0 };

    let resets_at = entry
        .reset_time
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    let label = match resets_at {
        Some(at) => formatter::countdown(&at),
        None if pct == 0.0 => READY.to_string(),
        None => "unknown".to_string(),
    };

    (pct, label, Some(used as u64), Some(limit as u64))
}

fn find<'a>(limits: Option<&'a Vec<LimitEntry>>, kind: &str) -> Option<&'a LimitEntry> {
    limits.and_then(|l| l.iter().find(|e| e.limit_type.as_deref() == Some(kind)))
}

/// Token-authenticated usage source for the GLM quota API.
pub struct GlmSource {
    account_id: String,
    secrets: Arc<dyn SecureStore>,
}

impl GlmSource {
    pub fn new(account_id: &str, secrets: Arc<dyn SecureStore>) -> Self {
        Self {
            account_id: account_id.to_string(),
            secrets,
        }
    }

    fn api_key(&self) -> Result<String, FetchError> {
        let key = format!("glm_{}", self.account_id);
        let secret = self
            .secrets
            .load(&key)
            .map_err(|e| FetchError::AuthNotFound(e.to_string()))?
            .ok_or_else(|| FetchError::AuthNotFound("no GLM API key stored".into()))?;
        if secret.trim().is_empty() {
            return Err(FetchError::AuthNotFound("stored GLM API key is empty".into()));
        }
        Ok(secret)
    }

    async fn try_fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        api_key: &str,
    ) -> Result<GlmResponse, FetchError> {
        let response = client
            .get(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::AuthNotFound("GLM rejected the API key".into()));
        }
        if !status.is_success() {
            return Err(FetchError::BadResponse(status.as_u16()));
        }
        Ok(response.json::<GlmResponse>().await?)
    }
}

#[async_trait::async_trait]
impl UsageSource for GlmSource {
    async fn fetch(&self) -> Result<UsageSnapshot, FetchError> {
        let api_key = self.api_key()?;
        let client = http_client()?;

        let url = resolve_url();
        validate_endpoint(&url, "GLM")?;

        // The international host occasionally refuses mainland accounts;
        // retry once against the bigmodel host before giving up.
        let data = match self.try_fetch(&client, &url, &api_key).await {
            Ok(data) => data,
            Err(FetchError::AuthNotFound(e)) => return Err(FetchError::AuthNotFound(e)),
            Err(_) => {
                let fallback = fallback_url();
                validate_endpoint(&fallback, "GLM")?;
                self.try_fetch(&client, &fallback, &api_key).await?
            }
        };

        let limits = data.data.as_ref().and_then(|d| d.limits.as_ref());
        let (session_percent, session_reset, session_used, session_limit) =
            limit_state(find(limits, "TOKENS_LIMIT"));
        let (weekly_percent, weekly_reset, weekly_used, weekly_limit) =
            limit_state(find(limits, "TIME_LIMIT"));

        Ok(UsageSnapshot {
            session_percent,
            session_reset,
            weekly_percent,
            weekly_reset,
            tier: "glm".to_string(),
            session_used,
            session_limit,
            weekly_used,
            weekly_limit,
            ..UsageSnapshot::empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_response() {
        let json = r#"{
            "data": {
                "limits": [
                    {
                        "limitType": "TOKENS_LIMIT",
                        "used": 5000.0,
                        "limit": 10000.0,
                        "resetTime": "2099-12-10T00:00:00Z"
                    },
                    {
                        "limitType": "TIME_LIMIT",
                        "used": 30.0,
                        "limit": 60.0,
                        "resetTime": "2099-12-10T00:00:00Z"
                    }
                ]
            }
        }"#;
        let data: GlmResponse = serde_json::from_str(json).unwrap();
        let limits = data.data.unwrap().limits.unwrap();
        assert_eq!(limits.len(), 2);
        assert_eq!(limits[0].limit_type.as_deref(), Some("TOKENS_LIMIT"));
    }

    #[test]
    fn deserialize_empty_response() {
        let data: GlmResponse = serde_json::from_str("{}").unwrap();
        assert!(data.data.is_none());
    }

    #[test]
    fn limit_state_computes_fraction_and_countdown() {
        let entry = LimitEntry {
            limit_type: Some("TOKENS_LIMIT".to_string()),
            used: Some(5000.0),
            limit: Some(10000.0),
            reset_time: Some("2099-12-10T00:00:00Z".to_string()),
        };
        let (pct, label, used, limit) = limit_state(Some(&entry));
        assert!((pct - 0.5).abs() < 1e-10);
        assert!(label.starts_with("in "));
        assert_eq!(used, Some(5000));
        assert_eq!(limit, Some(10000));
    }

    #[test]
    fn limit_state_zero_limit_is_zero_percent() {
        let entry = LimitEntry {
            limit_type: Some("TOKENS_LIMIT".to_string()),
            used: Some(0.0),
            limit: Some(0.0),
            reset_time: None,
        };
        let (pct, label, _, _) = limit_state(Some(&entry));
        assert_eq!(pct, 0.0);
        assert_eq!(label, READY);
    }

    #[test]
    fn limit_state_missing_entry_is_ready() {
        let (pct, label, used, limit) = limit_state(None);
        assert_eq!(pct, 0.0);
        assert_eq!(label, READY);
        assert_eq!(used, None);
        assert_eq!(limit, None);
    }

    #[test]
    fn limit_state_over_quota_stays_unclamped() {
        let entry = LimitEntry {
            limit_type: Some("TOKENS_LIMIT".to_string()),
            used: Some(12000.0),
            limit: Some(10000.0),
            reset_time: Some("2099-12-10T00:00:00Z".to_string()),
        };
        let (pct, _, _, _) = limit_state(Some(&entry));
        assert!((pct - 1.2).abs() < 1e-10);
    }

    #[test]
    fn limit_state_invalid_datetime_is_unknown() {
        let entry = LimitEntry {
            limit_type: Some("TIME_LIMIT".to_string()),
            used: Some(10.0),
            limit: Some(100.0),
            reset_time: Some("invalid-date".to_string()),
        };
        let (_, label, _, _) = limit_state(Some(&entry));
        assert_eq!(label, "unknown");
    }

    #[test]
    fn find_selects_by_limit_type() {
        let limits = vec![
            LimitEntry {
                limit_type: Some("TIME_LIMIT".to_string()),
                used: None,
                limit: None,
                reset_time: None,
            },
            LimitEntry {
                limit_type: Some("TOKENS_LIMIT".to_string()),
                used: Some(1.0),
                limit: Some(2.0),
                reset_time: None,
            },
        ];
        let entry = find(Some(&limits), "TOKENS_LIMIT").unwrap();
        assert_eq!(entry.used, Some(1.0));
        assert!(find(Some(&limits), "OTHER").is_none());
        assert!(find(None, "TOKENS_LIMIT").is_none());
    }

    #[test]
    fn resolve_url_uses_default_host() {
        let url = format!("https://{}{}", DEFAULT_HOST, PATH);
        assert!(url.contains("api.z.ai"));
        assert!(url.ends_with(PATH));
    }

    #[test]
    fn fallback_url_uses_bigmodel() {
        assert!(fallback_url().contains("open.bigmodel.cn"));
    }
}
