//! Persistence for the three append-only transaction tables (sec 9):
//! `cost_logs`, `audit_logs`, and `rag_logs`. Every retrieve/chat/indexing
//! transaction writes at most one `RagLog` row; cost is broken out per
//! component so a single transaction can carry embedding + rerank + LLM
//! lines.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::reasoning_tree::ReasoningTree;

#[derive(Clone)]
pub struct LogService {
    pool: PgPool,
}

impl LogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_cost(
        &self,
        org: Uuid,
        api_key_id: Option<Uuid>,
        transaction_id: Uuid,
        component: &str,
        cost_usd: f64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cost_logs (id, organization_id, api_key_id, transaction_id, component, cost_usd, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(org)
        .bind(api_key_id)
        .bind(transaction_id)
        .bind(component)
        .bind(cost_usd)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_transaction(
        &self,
        org: Uuid,
        api_key_id: Option<Uuid>,
        transaction_id: Uuid,
        component: &str,
        query: &str,
        cost_usd: f64,
        tree: &ReasoningTree,
    ) -> AppResult<()> {
        self.record_cost(org, api_key_id, transaction_id, component, cost_usd).await?;
        sqlx::query(
            r#"
            INSERT INTO rag_logs (id, organization_id, api_key_id, transaction_id, query, payload, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(org)
        .bind(api_key_id)
        .bind(transaction_id)
        .bind(query)
        .bind(tree.compress())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_audit(
        &self,
        org: Uuid,
        api_key_id: Option<Uuid>,
        transaction_id: Uuid,
        action: &str,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, organization_id, api_key_id, transaction_id, action, payload, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(org)
        .bind(api_key_id)
        .bind(transaction_id)
        .bind(action)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches a transaction's decompressed reasoning tree for `GET
    /// /v1/transactions/{id}` (sec 6, sec 9).
    pub async fn get_transaction(&self, org: Uuid, transaction_id: Uuid) -> AppResult<Option<(String, ReasoningTree)>> {
        let row: Option<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT query, payload FROM rag_logs WHERE organization_id = $1 AND transaction_id = $2",
        )
        .bind(org)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((query, payload)) => {
                let tree = ReasoningTree::decompress(&payload)
                    .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!("corrupt rag log payload: {e}")))?;
                Ok(Some((query, tree)))
            }
            None => Ok(None),
        }
    }

    /// Deletes `rag_logs`/`cost_logs` rows older than the configured
    /// retention window (sec 5 daily retention cron).
    pub async fn clean_raglog(&self, retention_days: u32) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM rag_logs WHERE created_at < now() - ($1 || ' days')::interval",
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
