use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scope grantable to an `ApiKey`. `All` subsumes every other scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[serde(rename = "data:read")]
    DataRead,
    #[serde(rename = "data:write")]
    DataWrite,
    Retrieval,
    Chat,
    Reports,
    #[serde(rename = "*")]
    All,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::DataRead => "data:read",
            Scope::DataWrite => "data:write",
            Scope::Retrieval => "retrieval",
            Scope::Chat => "chat",
            Scope::Reports => "reports",
            Scope::All => "*",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "data:read" => Some(Scope::DataRead),
            "data:write" => Some(Scope::DataWrite),
            "retrieval" => Some(Scope::Retrieval),
            "chat" => Some(Scope::Chat),
            "reports" => Some(Scope::Reports),
            "*" => Some(Scope::All),
            _ => None,
        }
    }
}

/// A bearer credential scoped to an organization.
///
/// `hash` is `sha256(salt || pepper || token)`; only the hash and salt are
/// persisted, never the raw token.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub hash: String,
    pub salt: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn has_scope(&self, required: Scope) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == required.as_str())
    }
}
