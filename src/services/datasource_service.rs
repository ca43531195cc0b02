//! Thin CRUD over `datasources` — external-id resolution is the one
//! behavior every other component depends on (RO, IP, CO all map caller
//! scope via this table).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateDatasourceRequest, Datasource};

#[derive(Clone)]
pub struct DatasourceService {
    pool: PgPool,
}

impl DatasourceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, org: Uuid, request: CreateDatasourceRequest) -> AppResult<Datasource> {
        let existing = sqlx::query_as::<_, Datasource>(
            "SELECT * FROM datasources WHERE organization_id = $1 AND external_id = $2",
        )
        .bind(org)
        .bind(&request.id)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("datasource '{}' already exists", request.id)));
        }

        let datasource = sqlx::query_as::<_, Datasource>(
            r#"
            INSERT INTO datasources (id, organization_id, external_id, name, purpose, knowledge_depth, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            RETURNING *
            "#,
        )
        .bind(org)
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.purpose)
        .bind(request.knowledge_depth)
        .fetch_one(&self.pool)
        .await?;
        Ok(datasource)
    }

    pub async fn get(&self, org: Uuid, external_id: &str) -> AppResult<Datasource> {
        sqlx::query_as::<_, Datasource>(
            "SELECT * FROM datasources WHERE organization_id = $1 AND external_id = $2",
        )
        .bind(org)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datasource '{external_id}'")))
    }

    pub async fn list(&self, org: Uuid) -> AppResult<Vec<Datasource>> {
        let rows = sqlx::query_as::<_, Datasource>(
            "SELECT * FROM datasources WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete(&self, org: Uuid, external_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "DELETE FROM datasources WHERE organization_id = $1 AND external_id = $2",
        )
        .bind(org)
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("datasource '{external_id}'")));
        }
        Ok(())
    }

    /// Resolves external datasource ids to internal uuids, dropping any
    /// that do not exist or do not belong to `org` (sec 4.5 step 8 and
    /// sec 4.7 RESOLVE_SCOPE both rely on this mapping).
    pub async fn resolve_ids(&self, org: Uuid, external_ids: &[String]) -> AppResult<Vec<Uuid>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM datasources WHERE organization_id = $1 AND external_id = ANY($2)",
        )
        .bind(org)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
