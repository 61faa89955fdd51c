//! Rolling per-conversation turn history used to build prompts.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::conversation::{Conversation, ConversationId, ConversationTurn, NewTurn};
use crate::domain::run::Actor;
use crate::errors::StoreError;

pub const DEFAULT_MAX_TURNS: usize = 40;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Conversation, StoreError>;

    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Appends a turn; the oldest turns are dropped once the bound is exceeded.
    async fn add_turn(
        &self,
        conversation_id: &ConversationId,
        turn: NewTurn,
        now: DateTime<Utc>,
    ) -> Result<ConversationTurn, StoreError>;

    /// Most recent `limit` turns in chronological order.
    async fn recent_context(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}

struct ConversationLog {
    conversation: Conversation,
    next_sequence: u64,
    turns: VecDeque<ConversationTurn>,
}

pub struct InMemoryConversationStore {
    max_turns: usize,
    conversations: RwLock<HashMap<ConversationId, ConversationLog>>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl InMemoryConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns: max_turns.max(1), conversations: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
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
        let mut conversations = self.conversations.write().await;
        conversations.insert(
            conversation.conversation_id.clone(),
            ConversationLog {
                conversation: conversation.clone(),
                next_sequence: 1,
                turns: VecDeque::new(),
            },
        );
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).map(|log| log.conversation.clone()))
    }

    async fn add_turn(
        &self,
        conversation_id: &ConversationId,
        turn: NewTurn,
        now: DateTime<Utc>,
    ) -> Result<ConversationTurn, StoreError> {
        let mut conversations = self.conversations.write().await;
        let log = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.clone()))?;

        let stored = ConversationTurn {
            conversation_id: conversation_id.clone(),
            sequence: log.next_sequence,
            role: turn.role,
            content: turn.content,
            action: turn.action,
            run_id: turn.run_id,
            created_at: now,
        };
        log.next_sequence += 1;
        log.conversation.updated_at = now;
        log.turns.push_back(stored.clone());
        while log.turns.len() > self.max_turns {
            log.turns.pop_front();
        }
        Ok(stored)
    }

    async fn recent_context(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let conversations = self.conversations.read().await;
        let log = conversations
            .get(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.clone()))?;
        let skip = log.turns.len().saturating_sub(limit);
        Ok(log.turns.iter().skip(skip).cloned().collect())
    }
}
