use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use actiongate_core::context::{ConversationStore, DEFAULT_MAX_TURNS};
use actiongate_core::domain::action::ActionName;
use actiongate_core::domain::conversation::{
    Conversation, ConversationId, ConversationTurn, NewTurn, TurnRole,
};
use actiongate_core::domain::run::{Actor, RunId};
use actiongate_core::errors::StoreError;

use super::{actor_columns, column, db_error, encode_ts, ts_column, u64_column, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStore {
    pool: DbPool,
    max_turns: usize,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_max_turns(pool, DEFAULT_MAX_TURNS)
    }

    pub fn with_max_turns(pool: DbPool, max_turns: usize) -> Self {
        Self { pool, max_turns: max_turns.max(1) }
    }
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        conversation_id: ConversationId(column(row, "conversation_id")?),
        actor: actor_columns(row)?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn row_to_turn(row: &SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let role: String = column(row, "role")?;
    Ok(ConversationTurn {
        conversation_id: ConversationId(column(row, "conversation_id")?),
        sequence: u64_column(row, "sequence")?,
        role: TurnRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown turn role `{role}`")))?,
        content: column(row, "content")?,
        action: column::<Option<String>>(row, "action")?.map(ActionName),
        run_id: column::<Option<String>>(row, "run_id")?.map(RunId),
        created_at: ts_column(row, "created_at")?,
    })
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn create_conversation(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation {
            conversation_id: ConversationId::generate(),
            actor: actor.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO conversations (conversation_id, actor_id, actor_role, next_sequence,
                                        created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(&conversation.conversation_id.0)
        .bind(&actor.id)
        .bind(actor.role.as_str())
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            "SELECT conversation_id, actor_id, actor_role, created_at, updated_at
             FROM conversations WHERE conversation_id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.as_ref().map(row_to_conversation).transpose()?)
    }

    async fn add_turn(
        &self,
        conversation_id: &ConversationId,
        turn: NewTurn,
        now: DateTime<Utc>,
    ) -> Result<ConversationTurn, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let claimed = sqlx::query(
            "UPDATE conversations
             SET next_sequence = next_sequence + 1, updated_at = ?
             WHERE conversation_id = ?
             RETURNING next_sequence - 1 AS sequence",
        )
        .bind(encode_ts(now))
        .bind(&conversation_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some(claimed) = claimed else {
            return Err(StoreError::ConversationNotFound(conversation_id.clone()));
        };
        let sequence: i64 = claimed.try_get("sequence").map_err(db_error)?;

        sqlx::query(
            "INSERT INTO conversation_turns (conversation_id, sequence, role, content, action,
                                             run_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation_id.0)
        .bind(sequence)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.action.as_ref().map(|action| action.0.clone()))
        .bind(turn.run_id.as_ref().map(|run_id| run_id.0.clone()))
        .bind(encode_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let keep_from = sequence - i64::try_from(self.max_turns).unwrap_or(i64::MAX) + 1;
        sqlx::query("DELETE FROM conversation_turns WHERE conversation_id = ? AND sequence < ?")
            .bind(&conversation_id.0)
            .bind(keep_from)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(ConversationTurn {
            conversation_id: conversation_id.clone(),
            sequence: u64::try_from(sequence).unwrap_or_default(),
            role: turn.role,
            content: turn.content,
            action: turn.action,
            run_id: turn.run_id,
            created_at: now,
        })
    }

    async fn recent_context(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        if self.get_conversation(conversation_id).await?.is_none() {
            return Err(StoreError::ConversationNotFound(conversation_id.clone()));
        }

        let rows = sqlx::query(
            "SELECT conversation_id, sequence, role, content, action, run_id, created_at
             FROM conversation_turns
             WHERE conversation_id = ?
             ORDER BY sequence DESC
             LIMIT ?",
        )
        .bind(&conversation_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut turns = rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use actiongate_core::context::ConversationStore;
    use actiongate_core::domain::action::{ActionName, ActorRole};
    use actiongate_core::domain::conversation::{ConversationId, NewTurn, TurnRole};
    use actiongate_core::domain::run::{Actor, RunId};
    use actiongate_core::errors::StoreError;

    use super::SqlConversationStore;
    use crate::repositories::test_support::setup;

    #[tokio::test]
    async fn turns_are_bounded_and_returned_oldest_first() {
        let store = SqlConversationStore::with_max_turns(setup().await, 3);
        let start = Utc::now();
        let conversation = store
            .create_conversation(&Actor::new("driver-1", ActorRole::Driver), start)
            .await
            .expect("create");

        for index in 0..5 {
            store
                .add_turn(
                    &conversation.conversation_id,
                    NewTurn::user(format!("message {index}")),
                    start + Duration::seconds(index),
                )
                .await
                .expect("add turn");
        }
        store
            .add_turn(
                &conversation.conversation_id,
                NewTurn::tool(ActionName("searchJobs".to_string()), "3 jobs")
                    .in_run(RunId("run-1".to_string())),
                start + Duration::seconds(10),
            )
            .await
            .expect("tool turn");

        let recent = store.recent_context(&conversation.conversation_id, 10).await.expect("recent");
        let sequences: Vec<u64> = recent.iter().map(|turn| turn.sequence).collect();
        assert_eq!(sequences, vec![4, 5, 6]);
        assert_eq!(recent[2].role, TurnRole::Tool);
        assert_eq!(recent[2].action.as_ref().map(|action| action.0.as_str()), Some("searchJobs"));
        assert_eq!(recent[2].run_id.as_ref().map(|run| run.0.as_str()), Some("run-1"));

        let last_two = store.recent_context(&conversation.conversation_id, 2).await.expect("two");
        assert_eq!(last_two[0].content, "message 4");

        let stored = store
            .get_conversation(&conversation.conversation_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.actor.id.as_deref(), Some("driver-1"));
    }

    #[tokio::test]
    async fn unknown_conversation_is_reported() {
        let store = SqlConversationStore::new(setup().await);
        let missing = ConversationId("conv-missing".to_string());

        let error =
            store.add_turn(&missing, NewTurn::user("hi"), Utc::now()).await.expect_err("missing");
        assert!(matches!(error, StoreError::ConversationNotFound(_)));

        let error = store.recent_context(&missing, 5).await.expect_err("missing");
        assert!(matches!(error, StoreError::ConversationNotFound(_)));
    }
}
