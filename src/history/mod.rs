use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{ Mutex, OwnedMutexGuard, RwLock };

use crate::models::chat::{ ChatMessage, Conversation, Role };

/// Messages retained per conversation after each completed turn.
pub const HISTORY_LIMIT: usize = 10;

/// One conversation: the turn lock is held for a whole turn, the messages
/// lock only long enough to copy or append.
struct Slot {
    turn: Arc<Mutex<()>>,
    messages: Mutex<Vec<ChatMessage>>,
}

impl Slot {
    fn new() -> Self {
        Self { turn: Arc::new(Mutex::new(())), messages: Mutex::new(Vec::new()) }
    }
}

/// In-memory conversation histories keyed by conversation id.
///
/// A turn checks out the conversation with [`ConversationStore::checkout`]
/// and keeps the guard until it either records the exchange or is abandoned,
/// so two turns on the same id never interleave. Snapshots and clears do not
/// wait for a running turn, and distinct ids never contend beyond the brief
/// map lookup.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Arc<Slot>>>,
    limit: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { conversations: RwLock::new(HashMap::new()), limit }
    }

    async fn slot(&self, conversation_id: &str) -> Arc<Slot> {
        if let Some(slot) = self.conversations.read().await.get(conversation_id) {
            return Arc::clone(slot);
        }
        let mut map = self.conversations.write().await;
        Arc::clone(
            map.entry(conversation_id.to_string()).or_insert_with(|| {
                debug!("Created history for conversation {}", conversation_id);
                Arc::new(Slot::new())
            })
        )
    }

    /// Locks the conversation for one turn, creating an empty history on first use.
    pub async fn checkout(&self, conversation_id: &str) -> ConversationGuard {
        let slot = self.slot(conversation_id).await;
        let turn = Arc::clone(&slot.turn).lock_owned().await;
        ConversationGuard {
            conversation_id: conversation_id.to_string(),
            slot,
            _turn: turn,
            limit: self.limit,
        }
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        let slot = self.conversations.read().await.get(conversation_id).cloned()?;
        let messages = slot.messages.lock().await.clone();
        Some(Conversation { id: conversation_id.to_string(), messages })
    }

    /// Drops a conversation. A turn already holding it finishes against the detached history.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        self.conversations.write().await.remove(conversation_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConversationGuard {
    conversation_id: String,
    slot: Arc<Slot>,
    _turn: OwnedMutexGuard<()>,
    limit: usize,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Copy of the history as it stood when the turn started.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.slot.messages.lock().await.clone()
    }

    /// Appends a completed user/assistant exchange and trims to the newest `limit` messages.
    pub async fn record_turn(self, user: ChatMessage, assistant: ChatMessage) {
        debug_assert_eq!(user.role, Role::User);
        debug_assert_eq!(assistant.role, Role::Assistant);
        let mut messages = self.slot.messages.lock().await;
        messages.push(user);
        messages.push(assistant);
        if messages.len() > self.limit {
            let excess = messages.len() - self.limit;
            messages.drain(..excess);
        }
        debug!("Conversation {} now holds {} messages", self.conversation_id, messages.len());
    }
}

/// Plain-text transcript used for exports.
pub fn format_transcript(conversation: &Conversation) -> String {
    let mut result = format!("Conversation {}\n\n", conversation.id);
    for msg in &conversation.messages {
        let role_display = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        result.push_str(
            &format!("[{}] {}: {}\n", msg.timestamp.format("%Y-%m-%d %H:%M:%S"), role_display, msg.content)
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn complete_turn(store: &ConversationStore, id: &str, n: usize) {
        let guard = store.checkout(id).await;
        guard.record_turn(
            ChatMessage::user(format!("question {}", n)),
            ChatMessage::assistant(format!("answer {}", n))
        ).await;
    }

    #[tokio::test]
    async fn checkout_creates_empty_history() {
        let store = ConversationStore::new();
        let guard = store.checkout("fresh").await;
        assert!(guard.messages().await.is_empty());
        assert_eq!(guard.conversation_id(), "fresh");
        drop(guard);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn history_is_bounded_and_keeps_latest_pair() {
        let store = ConversationStore::new();
        for n in 1..=7 {
            complete_turn(&store, "c1", n).await;
            let conversation = store.get_conversation("c1").await.unwrap();
            assert_eq!(conversation.messages.len(), (2 * n).min(HISTORY_LIMIT));
            let last = &conversation.messages[conversation.messages.len() - 2..];
            assert_eq!(last[0].role, Role::User);
            assert_eq!(last[0].content, format!("question {}", n));
            assert_eq!(last[1].role, Role::Assistant);
            assert_eq!(last[1].content, format!("answer {}", n));
        }
        let conversation = store.get_conversation("c1").await.unwrap();
        assert_eq!(conversation.messages[0].content, "question 3");
    }

    #[tokio::test]
    async fn abandoned_checkout_leaves_history_untouched() {
        let store = ConversationStore::new();
        complete_turn(&store, "c1", 1).await;
        drop(store.checkout("c1").await);
        assert_eq!(store.get_conversation("c1").await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let store = Arc::new(ConversationStore::new());
        let first = store.checkout("c1").await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let guard = store.checkout("c1").await;
                guard.messages().await.len()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.record_turn(ChatMessage::user("a"), ChatMessage::assistant("b")).await;
        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn other_conversations_do_not_wait() {
        let store = ConversationStore::new();
        let _held = store.checkout("c1").await;
        let other = tokio::time::timeout(Duration::from_millis(100), store.checkout("c2")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn snapshot_does_not_wait_for_running_turn() {
        let store = ConversationStore::new();
        complete_turn(&store, "c1", 1).await;
        let held = store.checkout("c1").await;

        let snapshot = tokio::time::timeout(Duration::from_millis(100), store.get_conversation("c1")).await;
        assert_eq!(snapshot.unwrap().unwrap().messages.len(), 2);

        held.record_turn(ChatMessage::user("q"), ChatMessage::assistant("a")).await;
        assert_eq!(store.get_conversation("c1").await.unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn clear_removes_conversation() {
        let store = ConversationStore::new();
        complete_turn(&store, "c1", 1).await;
        assert!(store.clear("c1").await);
        assert!(!store.clear("c1").await);
        assert!(store.get_conversation("c1").await.is_none());
    }

    #[test]
    fn transcript_lists_messages_in_order() {
        let conversation = Conversation {
            id: "c1".into(),
            messages: vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi there")],
        };
        let transcript = format_transcript(&conversation);
        let user_at = transcript.find("User: Hello").unwrap();
        let assistant_at = transcript.find("Assistant: Hi there").unwrap();
        assert!(transcript.starts_with("Conversation c1"));
        assert!(user_at < assistant_at);
    }
}
