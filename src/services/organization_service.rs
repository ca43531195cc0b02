//! Thin CRUD over `organizations` — the root tenant every other entity is
//! scoped under.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateOrganizationRequest, Organization};

#[derive(Clone)]
pub struct OrganizationService {
    pool: PgPool,
}

impl OrganizationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: CreateOrganizationRequest) -> AppResult<Organization> {
        let existing = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE external_id = $1")
            .bind(&request.external_id)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("organization '{}' already exists", request.external_id)));
        }

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (id, external_id, name, created_at)
            VALUES (gen_random_uuid(), $1, $2, now())
            RETURNING *
            "#,
        )
        .bind(&request.external_id)
        .bind(&request.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(organization)
    }

    pub async fn get(&self, external_id: &str) -> AppResult<Organization> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("organization '{external_id}'")))
    }

    pub async fn list(&self) -> AppResult<Vec<Organization>> {
        let rows = sqlx::query_as::<_, Organization>("SELECT * FROM organizations ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
