use serde::{Deserialize, Serialize};

use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::ProviderKind;

/// One watched account. Credential material is never stored on this record:
/// it lives in the secure store under [`Account::secret_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque stable identifier (UUID v4), assigned at creation.
    pub id: String,
    /// Human display name.
    pub name: String,
    pub kind: ProviderKind,
    /// Latest reading, cached for cold-start display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

impl Account {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            usage: None,
        }
    }

    /// Secure-store key for this account's credential material.
    pub fn secret_key(&self) -> String {
        secret_key(self.kind, &self.id)
    }
}

/// Secure-store key format shared by the account record and the registry's
/// credential migration.
pub fn secret_key(kind: ProviderKind, account_id: &str) -> String {
    format!("{}_{}", kind.id(), account_id)
}
