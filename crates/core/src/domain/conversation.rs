use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unsupported turn role `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::User, content: content.into(), recorded_at }
    }

    pub fn assistant(content: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into(), recorded_at }
    }
}

/// Recent turns for one caller, oldest first.
///
/// The router receives this by value and hands back the updated copy; there is
/// no process-wide history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_exchange(
        &mut self,
        message: impl Into<String>,
        response: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.turns.push(ConversationTurn::user(message, at));
        self.turns.push(ConversationTurn::assistant(response, at));
    }

    pub fn recent(&self, count: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(count);
        &self.turns[start..]
    }

    /// Keeps only the newest `max_turns` entries.
    pub fn truncate_to(&mut self, max_turns: usize) {
        let excess = self.turns.len().saturating_sub(max_turns);
        if excess > 0 {
            self.turns.drain(..excess);
        }
    }

    pub fn render_recent(&self, count: usize) -> String {
        self.recent(count)
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
