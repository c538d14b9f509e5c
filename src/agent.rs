use crate::cli::Args;
use crate::config::{ self, prompt, AgentConfig };
use crate::history::{ format_transcript, ConversationGuard, ConversationStore };
use crate::llm::LlmError;
use crate::llm::chat::{ new_client as new_chat_client, ByteStream, ChatClient, ChatRequest, WireMessage };
use crate::llm::chat::stream::{ parse_event_line, LineDecoder, StreamEvent };
use crate::models::chat::{ AgentState, AgentStatus, ChatMessage, Role };

use chrono::{ DateTime, Utc };
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{ AtomicI64, Ordering };
use std::task::{ Context, Poll };
use uuid::Uuid;

const OFFLINE_REASON: &str = "agent is offline: no OpenRouter API key is configured";

/// One item of a chat reply stream.
///
/// `Error` is always the last item of its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Delta(String),
    Error(String),
}

impl Fragment {
    pub fn as_str(&self) -> &str {
        match self {
            Fragment::Delta(text) | Fragment::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Fragment::Error(_))
    }

    pub fn into_text(self) -> String {
        match self {
            Fragment::Delta(text) | Fragment::Error(text) => text,
        }
    }
}

/// Lazy, single-pass stream of reply fragments for one chat turn.
///
/// Nothing happens until the first poll. History is only updated when the
/// stream is driven to its end; dropping it earlier releases the conversation
/// and closes the upstream response without touching history.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Fragment> + Send>>,
}

impl Stream for ChatStream {
    type Item = Fragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Fragment>> {
        self.inner.as_mut().poll_next(cx)
    }
}

pub struct ConversationAgent {
    chat_client: Arc<dyn ChatClient>,
    history: Arc<ConversationStore>,
    config: AgentConfig,
    started_at: DateTime<Utc>,
    // Unix millis of the last upstream call, 0 before the first one.
    last_used_ms: Arc<AtomicI64>,
}

impl ConversationAgent {
    pub fn new(config: AgentConfig, chat_client: Arc<dyn ChatClient>, history: Arc<ConversationStore>) -> Self {
        Self {
            chat_client,
            history,
            config,
            started_at: Utc::now(),
            last_used_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, LlmError> {
        let agent_config = AgentConfig::from_args(args);
        let chat_client = new_chat_client(&config::llm_config(args))?;
        info!(
            "Chat client configured: Model={}, BaseURL={}, Key={}",
            agent_config.model,
            agent_config.base_url,
            if agent_config.has_api_key() { "set" } else { "missing" }
        );
        Ok(Self::new(agent_config, chat_client, Arc::new(ConversationStore::new())))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn new_conversation_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Relays one chat turn to the provider, yielding reply text as it arrives.
    ///
    /// An empty `file_content` is treated as no file.
    pub fn chat_stream(
        &self,
        message: impl Into<String>,
        conversation_id: impl Into<String>,
        file_content: Option<String>
    ) -> ChatStream {
        let file_content = file_content.filter(|c| !c.is_empty());
        let turn = PendingTurn {
            client: Arc::clone(&self.chat_client),
            history: Arc::clone(&self.history),
            system_prompt: prompt::chat_system_prompt(&self.config, file_content.is_some()),
            message: message.into(),
            conversation_id: conversation_id.into(),
            file_content,
            online: self.config.has_api_key(),
            last_used_ms: Arc::clone(&self.last_used_ms),
        };
        ChatStream {
            inner: Box::pin(futures::stream::unfold(TurnState::Pending(turn), next_fragment)),
        }
    }

    /// One-shot analysis of a whole file. Failures come back as a readable error string.
    pub async fn process_file_content(&self, content: &str, instructions: Option<&str>) -> String {
        if !self.config.has_api_key() {
            warn!("File processing requested while offline");
            return format!("Error in agent processing: {}", OFFLINE_REASON);
        }

        let request = ChatRequest::new(self.chat_client.model(), vec![
            WireMessage::new(Role::System, prompt::analysis_system_prompt(&self.config)),
            WireMessage::new(Role::User, prompt::analysis_user_prompt(content, instructions))
        ]);

        mark_used(&self.last_used_ms);
        match self.chat_client.complete(&request).await {
            Ok(text) => text,
            Err(LlmError::Status { status, body }) => {
                error!("File processing rejected by upstream ({})", status);
                format!("Error processing content: {}", body)
            }
            Err(e) => {
                error!("File processing failed: {}", e);
                format!("Error in agent processing: {}", e)
            }
        }
    }

    pub fn status(&self) -> AgentStatus {
        let online = self.config.has_api_key();
        AgentStatus {
            agent_name: self.config.name.clone(),
            status: if online { AgentState::Online } else { AgentState::Offline },
            model: self.config.model.clone(),
            available: online,
            last_used: if online { Some(self.last_used().unwrap_or(self.started_at)) } else { None },
        }
    }

    /// Time of the most recent upstream call, if any.
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        match self.last_used_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub async fn history(&self, conversation_id: &str) -> Option<Vec<ChatMessage>> {
        self.history.get_conversation(conversation_id).await.map(|c| c.messages)
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> bool {
        let removed = self.history.clear(conversation_id).await;
        if removed {
            info!("Cleared conversation {}", conversation_id);
        }
        removed
    }

    pub async fn export_transcript(&self, conversation_id: &str) -> Option<(String, usize)> {
        let conversation = self.history.get_conversation(conversation_id).await?;
        Some((format_transcript(&conversation), conversation.messages.len()))
    }
}

fn mark_used(last_used_ms: &AtomicI64) {
    last_used_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
}

enum TurnState {
    Pending(PendingTurn),
    Streaming(Box<ActiveTurn>),
    Finished,
}

async fn next_fragment(state: TurnState) -> Option<(Fragment, TurnState)> {
    match state {
        TurnState::Pending(turn) =>
            match turn.start().await {
                Ok(active) => active.advance().await,
                Err(fragment) => Some((fragment, TurnState::Finished)),
            }
        TurnState::Streaming(active) => active.advance().await,
        TurnState::Finished => None,
    }
}

struct PendingTurn {
    client: Arc<dyn ChatClient>,
    history: Arc<ConversationStore>,
    system_prompt: String,
    message: String,
    conversation_id: String,
    file_content: Option<String>,
    online: bool,
    last_used_ms: Arc<AtomicI64>,
}

impl PendingTurn {
    async fn start(self) -> Result<Box<ActiveTurn>, Fragment> {
        if !self.online {
            warn!("Chat on conversation {} refused: {}", self.conversation_id, OFFLINE_REASON);
            return Err(Fragment::Error(format!("Error: {}", OFFLINE_REASON)));
        }

        let guard = self.history.checkout(&self.conversation_id).await;
        let prior = guard.messages().await;
        info!(
            "Chat turn on {} ({} prior messages, file context: {})",
            self.conversation_id,
            prior.len(),
            self.file_content.is_some()
        );

        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(WireMessage::new(Role::System, self.system_prompt));
        messages.extend(prior.iter().map(WireMessage::from));
        messages.push(
            WireMessage::new(Role::User, prompt::chat_user_message(&self.message, self.file_content.as_deref()))
        );
        let request = ChatRequest::new(self.client.model(), messages).streaming();

        mark_used(&self.last_used_ms);
        match self.client.open_stream(&request).await {
            Ok(body) =>
                Ok(
                    Box::new(ActiveTurn {
                        guard: Some(guard),
                        body,
                        decoder: LineDecoder::new(),
                        pending: VecDeque::new(),
                        reply: String::new(),
                        message: self.message,
                        conversation_id: self.conversation_id,
                        ended: false,
                    })
                ),
            Err(LlmError::Status { status, body }) => {
                error!("Upstream rejected chat on {} ({}): {}", self.conversation_id, status, body);
                Err(Fragment::Error(format!("Error: {}", body)))
            }
            Err(e) => {
                error!("Chat request on {} failed: {}", self.conversation_id, e);
                Err(Fragment::Error(format!("Error in chat: {}", e)))
            }
        }
    }
}

struct ActiveTurn {
    // Present until the turn is recorded or fails.
    guard: Option<ConversationGuard>,
    body: ByteStream,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    reply: String,
    message: String,
    conversation_id: String,
    ended: bool,
}

impl ActiveTurn {
    async fn advance(mut self: Box<Self>) -> Option<(Fragment, TurnState)> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Some((Fragment::Delta(delta), TurnState::Streaming(self)));
            }
            if self.ended {
                self.finalize().await;
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = self.decoder.push(&chunk);
                    self.consume(lines);
                }
                Some(Err(e)) => {
                    error!("Upstream stream for {} broke off: {}", self.conversation_id, e);
                    drop(self.guard.take());
                    return Some((Fragment::Error(format!("Error in chat: {}", e)), TurnState::Finished));
                }
                None => {
                    let tail: Vec<String> = self.decoder.finish().into_iter().collect();
                    self.consume(tail);
                    self.ended = true;
                }
            }
        }
    }

    fn consume(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.ended {
                break;
            }
            match parse_event_line(&line) {
                StreamEvent::Delta(delta) => {
                    self.reply.push_str(&delta);
                    self.pending.push_back(delta);
                }
                StreamEvent::Done => {
                    self.ended = true;
                }
                StreamEvent::Skip => {}
            }
        }
    }

    async fn finalize(&mut self) {
        if let Some(guard) = self.guard.take() {
            info!("Chat turn on {} completed ({} chars)", self.conversation_id, self.reply.len());
            guard.record_turn(
                ChatMessage::user(std::mem::take(&mut self.message)),
                ChatMessage::assistant(std::mem::take(&mut self.reply))
            ).await;
        }
    }
}

impl Drop for ActiveTurn {
    fn drop(&mut self) {
        if self.guard.is_some() {
            debug!("Chat turn on {} cancelled by the caller; history unchanged", self.conversation_id);
        }
    }
}
