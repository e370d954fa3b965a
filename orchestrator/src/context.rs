use chrono::{DateTime, Utc};
use reachy_core::{ChatMessage, Role};
use uuid::Uuid;

pub const DEFAULT_CONTEXT_TURNS: usize = 20;

/// Conversation history for one interactive session
#[derive(Debug, Clone)]
pub struct ConversationContext {
    /// Unique session identifier
    pub session_id: Uuid,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// System prompt, always sent first
    system: Option<ChatMessage>,
    /// Alternating user/assistant turns, oldest first
    turns: Vec<ChatMessage>,
    /// Number of most recent turns sent with each request
    window: usize,
}

impl ConversationContext {
    pub fn new(system_prompt: Option<&str>, window: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            system: system_prompt
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ChatMessage::system),
            turns: Vec::new(),
            window: window.max(1),
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(ChatMessage::user(content));
    }

    /// Only called for turns that produced a real answer
    pub fn push_assistant(&mut self, content: &str) {
        self.turns.push(ChatMessage::assistant(content));
    }

    /// Messages for the next request: system prompt plus the most recent turns
    pub fn window(&self) -> Vec<ChatMessage> {
        let start = self.turns.len().saturating_sub(self.window);
        self.system
            .iter()
            .chain(self.turns[start..].iter())
            .cloned()
            .collect()
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn assistant_turns(&self) -> usize {
        self.turns.iter().filter(|m| m.role == Role::Assistant).count()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
