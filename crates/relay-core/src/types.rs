//! Core types for Relay: conversation messages, token accounting, sessions.
//!
//! Messages use the role/content shape expected by conversational completion
//! APIs, so a session's history can be sent upstream as-is.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool definitions
// ─────────────────────────────────────────────

/// A tool the model may call, forwarded verbatim to the provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's input.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ─────────────────────────────────────────────
// Token usage
// ─────────────────────────────────────────────

/// Token usage reported by the provider for one completion.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Usage {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Cumulative token counters for a session.
///
/// `total` is always `input + output`: it is recomputed on every update and
/// cannot be set from outside.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    input: u64,
    output: u64,
    total: u64,
}

impl TokenUsage {
    pub fn input(&self) -> u64 {
        self.input
    }

    pub fn output(&self) -> u64 {
        self.output
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Fold one provider report into the counters.
    pub fn add(&mut self, usage: &Usage) {
        self.input += usage.input_tokens;
        self.output += usage.output_tokens;
        self.total = self.input + self.output;
    }
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        let mut counters = TokenUsage::default();
        counters.add(&usage);
        counters
    }
}

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

/// Per-conversation state: message log, usage counters, activity timestamps.
///
/// The message log is append-only; entries are never reordered or edited.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    id: String,
    owner_id: String,
    system_prompt: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: Vec<Message>,
    usage: TokenUsage,
}

impl Session {
    /// Create an empty session.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Session {
            id: id.into(),
            owner_id: owner_id.into(),
            system_prompt,
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Refresh the last-activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Append a message and refresh activity.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Fold provider-reported usage into the session counters.
    pub fn record_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }

    /// Whether the session has been idle for longer than `timeout` at `now`.
    ///
    /// A `now` earlier than the last activity never counts as idle.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.last_activity).to_std() {
            Ok(idle) => idle > timeout,
            Err(_) => false,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
