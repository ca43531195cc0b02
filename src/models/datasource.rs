use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Gates summary and question-bank generation during indexing (sec 4.6
/// steps 4/6: "if knowledge depth ≠ shallow"). `Shallow` indexes chunks
/// only, skipping the extra LLM calls for small or low-value sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "knowledge_depth", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeDepth {
    Shallow,
    Standard,
    Deep,
}

impl Default for KnowledgeDepth {
    fn default() -> Self {
        Self::Standard
    }
}

/// A named collection of documents within an organization.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Datasource {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub purpose: Option<String>,
    pub knowledge_depth: KnowledgeDepth,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDatasourceRequest {
    #[validate(length(min = 1, max = 200))]
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub purpose: Option<String>,
    #[serde(default)]
    pub knowledge_depth: KnowledgeDepth,
}
