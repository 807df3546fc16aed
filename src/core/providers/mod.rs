pub mod claude;
pub mod cursor;
pub mod fetch;
pub mod glm;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::fetch::FetchError;
use crate::core::secrets::SecureStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// claude.ai, authenticated with a browser session cookie.
    Claude,
    /// Cursor IDE, credentials read from the local editor database.
    Cursor,
    /// GLM quota API, authenticated with an API token.
    Glm,
}

impl ProviderKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "cursor" => Some(Self::Cursor),
            "glm" | "zai" => Some(Self::Glm),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Cursor => "cursor",
            Self::Glm => "glm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Cursor => "Cursor",
            Self::Glm => "GLM",
        }
    }

    /// Only providers whose session window restarts on explicit activity
    /// support a wake ping.
    pub fn supports_ping(&self) -> bool {
        matches!(self, Self::Claude)
    }

    pub fn auth_hint(&self) -> &'static str {
        match self {
            Self::Claude => "claude.ai session cookie",
            Self::Cursor => "auto-detected (Cursor editor database)",
            Self::Glm => "GLM API key",
        }
    }

    /// All provider variants in display order.
    pub fn all() -> &'static [ProviderKind] {
        &[ProviderKind::Claude, ProviderKind::Cursor, ProviderKind::Glm]
    }
}

/// Per-provider fetcher. One value is constructed per account when its
/// session starts; the account kind selects the implementation.
#[async_trait::async_trait]
pub trait UsageSource: Send + Sync {
    async fn fetch(&self) -> Result<UsageSnapshot, FetchError>;

    /// Request a session wake. Returns true when the provider accepted the
    /// request. Only meaningful when [`ProviderKind::supports_ping`] holds.
    async fn ping_session(&self) -> bool {
        false
    }
}

/// Select the usage source for an account kind.
pub fn source_for(
    kind: ProviderKind,
    account_id: &str,
    secrets: Arc<dyn SecureStore>,
) -> Arc<dyn UsageSource> {
    match kind {
        ProviderKind::Claude => Arc::new(claude::ClaudeSource::new(account_id, secrets)),
        ProviderKind::Cursor => Arc::new(cursor::CursorSource::new()),
        ProviderKind::Glm => Arc::new(glm::GlmSource::new(account_id, secrets)),
    }
}
