//! Thin CRUD over `conversations` and `turns`, plus the pruning rules
//! from `chat:max:conversations` / `chat:max:turns` (sec 6 config table).

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::ChatBudgets;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Turn, TurnPayload};
use crate::services::tokenizer::count_tokens;

#[derive(Clone)]
pub struct ConversationService {
    pool: PgPool,
    budgets: ChatBudgets,
}

impl ConversationService {
    pub fn new(pool: PgPool, budgets: ChatBudgets) -> Self {
        Self { pool, budgets }
    }

    pub async fn get_or_create(
        &self,
        org: Uuid,
        api_key_id: Uuid,
        external_id: Option<&str>,
        agent_id: Option<Uuid>,
    ) -> AppResult<Conversation> {
        if let Some(external_id) = external_id {
            if let Some(existing) = sqlx::query_as::<_, Conversation>(
                "SELECT * FROM conversations WHERE organization_id = $1 AND external_id = $2",
            )
            .bind(org)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            {
                return Ok(existing);
            }
        }

        self.prune_conversations(org, api_key_id).await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, organization_id, api_key_id, external_id, title, agent_id, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, NULL, $4, now())
            RETURNING *
            "#,
        )
        .bind(org)
        .bind(api_key_id)
        .bind(external_id)
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    /// Evicts the oldest conversations for `api_key_id` once the count
    /// would exceed `chat:max:conversations`.
    async fn prune_conversations(&self, org: Uuid, api_key_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM conversations
            WHERE id IN (
                SELECT id FROM conversations
                WHERE organization_id = $1 AND api_key_id = $2
                ORDER BY created_at DESC
                OFFSET $3
            )
            "#,
        )
        .bind(org)
        .bind(api_key_id)
        .bind(self.budgets.max_conversations.saturating_sub(1) as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Turns ordered oldest-first, compacted to `chat:history:maxTokens`
    /// by dropping the oldest turns first (sec 4.7 LLM_RUN history input).
    pub async fn recent_turns(&self, conversation_id: Uuid) -> AppResult<Vec<Turn>> {
        let turns = sqlx::query_as::<_, Turn>(
            "SELECT * FROM turns WHERE conversation_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(self.budgets.max_turns as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut ordered: Vec<Turn> = turns.into_iter().rev().collect();
        let mut total: u32 = ordered.iter().map(|t| t.token_count.max(0) as u32).sum();
        while total > self.budgets.history_max_tokens && !ordered.is_empty() {
            let dropped = ordered.remove(0);
            total = total.saturating_sub(dropped.token_count.max(0) as u32);
        }
        Ok(ordered)
    }

    pub async fn persist_turn(&self, conversation_id: Uuid, payload: &TurnPayload) -> AppResult<Turn> {
        let payload_value = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        let token_count = count_tokens(&payload.query) + count_tokens(&payload.response);

        self.prune_turns(conversation_id).await?;

        let turn = sqlx::query_as::<_, Turn>(
            r#"
            INSERT INTO turns (id, conversation_id, payload, metadata, token_count, created_at)
            VALUES (gen_random_uuid(), $1, $2, NULL, $3, now())
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(payload_value)
        .bind(token_count as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(turn)
    }

    async fn prune_turns(&self, conversation_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM turns
            WHERE id IN (
                SELECT id FROM turns
                WHERE conversation_id = $1
                ORDER BY created_at DESC
                OFFSET $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(self.budgets.max_turns.saturating_sub(1) as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_title(&self, conversation_id: Uuid, title: &str) -> AppResult<()> {
        sqlx::query("UPDATE conversations SET title = $1 WHERE id = $2 AND title IS NULL")
            .bind(title)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
