use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Text,
    Markdown,
    Html,
    Pdf,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Indexing,
    Indexed,
    Failed,
}

/// A source document within a datasource. Re-submission with a changed
/// `content_hash` returns the document to `Queued` for re-indexing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub datasource_id: Uuid,
    pub external_id: String,
    pub content: String,
    pub content_hash: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 200))]
    pub id: String,
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub metadata: Option<serde_json::Value>,
}

/// Compute a content hash used to decide whether a document needs
/// re-indexing. A fast cryptographic hash is adequate here — it is a
/// change-detector, not a security boundary.
pub fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
    }

    #[test]
    fn content_hash_differs_on_change() {
        assert_ne!(content_hash("hello"), content_hash("hello!"));
    }
}
