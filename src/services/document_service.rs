//! Thin CRUD over `documents`. Re-submission with an unchanged content
//! hash is a no-op; a changed hash reverts the document to `queued` so
//! the indexing pipeline re-processes it (sec 9).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{content_hash, CreateDocumentRequest, Document, DocumentStatus};

#[derive(Clone)]
pub struct DocumentService {
    pool: PgPool,
}

/// Whether a submit call created a new document, left an existing one
/// untouched (same content hash), or re-queued it for indexing.
pub enum SubmitOutcome {
    Created(Document),
    Unchanged(Document),
    Requeued(Document),
}

impl DocumentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn submit(
        &self,
        org: Uuid,
        datasource_id: Uuid,
        request: CreateDocumentRequest,
    ) -> AppResult<SubmitOutcome> {
        let hash = content_hash(&request.content);

        let existing = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE organization_id = $1 AND datasource_id = $2 AND external_id = $3",
        )
        .bind(org)
        .bind(datasource_id)
        .bind(&request.id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(document) = existing {
            if document.content_hash == hash {
                return Ok(SubmitOutcome::Unchanged(document));
            }
            let updated = sqlx::query_as::<_, Document>(
                r#"
                UPDATE documents
                SET content = $1, content_hash = $2, doc_type = $3, metadata = $4,
                    status = 'queued', updated_at = now()
                WHERE id = $5
                RETURNING *
                "#,
            )
            .bind(&request.content)
            .bind(&hash)
            .bind(request.doc_type)
            .bind(&request.metadata)
            .bind(document.id)
            .fetch_one(&self.pool)
            .await?;
            return Ok(SubmitOutcome::Requeued(updated));
        }

        let created = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents
                (id, organization_id, datasource_id, external_id, content, content_hash,
                 doc_type, status, metadata, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'queued', $7, now(), now())
            RETURNING *
            "#,
        )
        .bind(org)
        .bind(datasource_id)
        .bind(&request.id)
        .bind(&request.content)
        .bind(&hash)
        .bind(request.doc_type)
        .bind(&request.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(SubmitOutcome::Created(created))
    }

    pub async fn get(&self, org: Uuid, datasource_id: Uuid, external_id: &str) -> AppResult<Document> {
        sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE organization_id = $1 AND datasource_id = $2 AND external_id = $3",
        )
        .bind(org)
        .bind(datasource_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("document '{external_id}'")))
    }

    pub async fn list(&self, org: Uuid, datasource_id: Uuid) -> AppResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE organization_id = $1 AND datasource_id = $2 ORDER BY created_at DESC",
        )
        .bind(org)
        .bind(datasource_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete(&self, org: Uuid, datasource_id: Uuid, external_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE organization_id = $1 AND datasource_id = $2 AND external_id = $3",
        )
        .bind(org)
        .bind(datasource_id)
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("document '{external_id}'")));
        }
        Ok(())
    }

    pub async fn transition(&self, document_id: Uuid, status: DocumentStatus) -> AppResult<()> {
        sqlx::query("UPDATE documents SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
