//! Thin CRUD over `agents` and their `agent_datasources` scope.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Agent, CreateAgentRequest};

#[derive(Clone)]
pub struct AgentService {
    pool: PgPool,
}

impl AgentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        org: Uuid,
        request: CreateAgentRequest,
        datasource_ids: Vec<Uuid>,
    ) -> AppResult<Agent> {
        let existing = sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE organization_id = $1 AND external_id = $2",
        )
        .bind(org)
        .bind(&request.id)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("agent '{}' already exists", request.id)));
        }

        let mut tx = self.pool.begin().await?;
        let agent = sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (id, organization_id, external_id, name, purpose, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
            RETURNING *
            "#,
        )
        .bind(org)
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.purpose)
        .fetch_one(&mut *tx)
        .await?;

        for datasource_id in &datasource_ids {
            sqlx::query(
                "INSERT INTO agent_datasources (agent_id, datasource_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(agent.id)
            .bind(datasource_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(agent)
    }

    pub async fn get(&self, org: Uuid, external_id: &str) -> AppResult<Agent> {
        sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE organization_id = $1 AND external_id = $2",
        )
        .bind(org)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent '{external_id}'")))
    }

    pub async fn list(&self, org: Uuid) -> AppResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete(&self, org: Uuid, external_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE organization_id = $1 AND external_id = $2")
            .bind(org)
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("agent '{external_id}'")));
        }
        Ok(())
    }

    /// Datasource ids bound to an agent — used by RESOLVE_SCOPE (sec 4.7).
    pub async fn datasource_ids(&self, agent_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT datasource_id FROM agent_datasources WHERE agent_id = $1")
                .bind(agent_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
