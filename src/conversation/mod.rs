//! Conversation types and state management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snippets::CodeSnippet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

/// One finalized turn. Never mutated once it is in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippets: Option<Vec<CodeSnippet>>,
}

impl ConversationMessage {
    fn new(role: Role, content: &str, snippets: Option<Vec<CodeSnippet>>) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            code_snippets: snippets,
        }
    }
}

/// Append-only conversation log. Insertion order is display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn append_user(&mut self, content: &str) -> &ConversationMessage {
        self.push(ConversationMessage::new(Role::User, content, None))
    }

    /// Snippets are attached only when there is at least one.
    pub fn append_assistant(
        &mut self,
        content: &str,
        snippets: Vec<CodeSnippet>,
    ) -> &ConversationMessage {
        let snippets = if snippets.is_empty() {
            None
        } else {
            Some(snippets)
        };
        self.push(ConversationMessage::new(Role::Assistant, content, snippets))
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Commit the user turn and hold the log for the rest of the request cycle.
    pub fn begin_turn(&mut self, content: &str) -> PendingTurn<'_> {
        self.append_user(content);
        PendingTurn {
            conversation: Some(self),
        }
    }

    fn push(&mut self, message: ConversationMessage) -> &ConversationMessage {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight request cycle.
///
/// The user turn is already in the log. Calling [`PendingTurn::commit`] appends the
/// assistant turn; dropping the guard instead leaves the user turn with no reply.
/// The exclusive borrow rules out a second submission on the same log meanwhile.
pub struct PendingTurn<'a> {
    // `None` only after commit
    conversation: Option<&'a mut Conversation>,
}

impl<'a> PendingTurn<'a> {
    /// Messages before the pending user turn, limited to the most recent `window`
    /// entries (`0` means no limit). Order is preserved.
    pub fn prior_history(&self, window: usize) -> &[ConversationMessage] {
        let Some(conversation) = self.conversation.as_deref() else {
            return &[];
        };
        let prior = &conversation.messages[..conversation.messages.len().saturating_sub(1)];
        if window == 0 || prior.len() <= window {
            prior
        } else {
            &prior[prior.len() - window..]
        }
    }

    pub fn commit(mut self, content: &str, snippets: Vec<CodeSnippet>) -> &'a ConversationMessage {
        match self.conversation.take() {
            Some(conversation) => conversation.append_assistant(content, snippets),
            None => unreachable!("pending turn holds the conversation until commit"),
        }
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if let Some(conversation) = &self.conversation {
            tracing::warn!(
                conversation_id = %conversation.id,
                "Turn failed; user message kept without a reply"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippets::extract;

    #[test]
    fn test_user_then_assistant_order() {
        let mut conversation = Conversation::new();
        conversation.append_user("How do I log in JS?");

        let reply = "Here:\n```js\nconsole.log(\"hi\")\n```\nDone";
        conversation.append_assistant(reply, extract(reply));

        let history = conversation.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].code_snippets, Some(extract(reply)));
        assert!(history[0].code_snippets.is_none());
    }

    #[test]
    fn test_assistant_without_code_has_no_snippets() {
        let mut conversation = Conversation::new();
        let message = conversation.append_assistant("Plain prose.", Vec::new());
        assert!(message.code_snippets.is_none());
    }

    #[test]
    fn test_timestamps_are_non_decreasing() {
        let mut conversation = Conversation::new();
        conversation.append_user("one");
        conversation.append_assistant("two", Vec::new());
        conversation.append_user("three");

        let history = conversation.history();
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_clear_twice_equals_once() {
        let mut conversation = Conversation::new();
        conversation.append_user("a");
        conversation.append_assistant("b", Vec::new());

        conversation.clear();
        assert!(conversation.history().is_empty());
        conversation.clear();
        assert!(conversation.history().is_empty());
    }

    #[test]
    fn test_commit_appends_assistant_turn() {
        let mut conversation = Conversation::new();
        let pending = conversation.begin_turn("question");
        assert!(pending.prior_history(0).is_empty());

        let reply = pending.commit("answer", Vec::new());
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(conversation.history().len(), 2);
    }

    #[test]
    fn test_dropped_turn_keeps_user_message() {
        let mut conversation = Conversation::new();
        {
            let _pending = conversation.begin_turn("will fail");
        }

        let last = conversation.history().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "will fail");
        assert_eq!(conversation.history().len(), 1);
    }

    #[test]
    fn test_prior_history_window_keeps_most_recent() {
        let mut conversation = Conversation::new();
        for i in 0..5 {
            conversation.append_user(&format!("q{}", i));
            conversation.append_assistant(&format!("a{}", i), Vec::new());
        }

        let pending = conversation.begin_turn("latest");
        let window: Vec<_> = pending
            .prior_history(3)
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(window, vec!["a3", "q4", "a4"]);

        assert_eq!(pending.prior_history(0).len(), 10);
        assert_eq!(pending.prior_history(100).len(), 10);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.as_str(), "user");
    }
}
