//! Chat session
//!
//! The Session is the context object behind the HTTP API. It:
//! 1. Resolves the API key (stored, or acquired through the credential prompt)
//! 2. Commits the user turn to the conversation
//! 3. Sends the recent history plus the new turn to the completion endpoint
//! 4. Extracts code snippets from the reply
//! 5. Commits the assistant turn, or leaves the user turn unanswered on failure

use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionClient, CompletionError};
use crate::config::prompts::PromptError;
use crate::config::{PromptManager, SessionConfig};
use crate::conversation::{Conversation, ConversationMessage};
use crate::credentials::{CredentialError, CredentialPrompt, CredentialStore};
use crate::snippets::{extract, CodeSnippet};

use super::project::{load_project, ProjectError, ProjectLimits};
use super::tasks::{TaskInput, TaskKind, TaskOutput};

const CHAT_PROMPT: &str = "chat";

/// Errors from the chat session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("Nothing to send: input is empty")]
    EmptyInput,

    #[error("No snippet {snippet} in message {message}")]
    SnippetNotFound { message: usize, snippet: usize },
}

pub struct Session {
    client: Arc<dyn CompletionClient>,
    credentials: CredentialStore,
    credential_prompt: Box<dyn CredentialPrompt>,
    prompts: PromptManager,
    conversation: Conversation,
    settings: SessionConfig,
}

impl Session {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        credential_prompt: Box<dyn CredentialPrompt>,
        settings: SessionConfig,
    ) -> Self {
        Self {
            client,
            credentials: CredentialStore::new(),
            credential_prompt,
            prompts: PromptManager::new(settings.prompts_dir.clone()),
            conversation: Conversation::new(),
            settings,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn history(&self) -> &[ConversationMessage] {
        self.conversation.history()
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        tracing::info!(conversation_id = %self.conversation.id, "Conversation cleared");
    }

    pub fn set_credential(&mut self, key: &str) -> Result<(), CredentialError> {
        self.credentials.set(key)
    }

    pub fn clear_credential(&mut self) {
        self.credentials.clear();
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.get().is_some()
    }

    /// Run one request cycle and return the assistant turn.
    ///
    /// On failure the user turn stays in the log with no reply and the error is
    /// returned unchanged. A credential failure happens before anything is logged.
    pub async fn submit(&mut self, text: &str) -> Result<&ConversationMessage, SessionError> {
        reject_blank(text)?;
        let credential = self.credentials.ensure(self.credential_prompt.as_ref())?;
        let system_prompt = self.prompts.system_prompt(CHAT_PROMPT).await?;

        let pending = self.conversation.begin_turn(text);
        let history = pending.prior_history(self.settings.history_window);
        tracing::debug!(history = history.len(), "Submitting turn");

        let reply = self
            .client
            .complete(&credential, history, text, &system_prompt)
            .await?;

        let snippets = extract(&reply);
        tracing::info!(snippets = snippets.len(), "Assistant turn received");
        Ok(pending.commit(&reply, snippets))
    }

    /// Like [`Session::submit`], forwarding each text delta as it arrives.
    pub async fn submit_streaming<F>(
        &mut self,
        text: &str,
        mut on_delta: F,
    ) -> Result<&ConversationMessage, SessionError>
    where
        F: FnMut(&str) + Send,
    {
        reject_blank(text)?;
        let credential = self.credentials.ensure(self.credential_prompt.as_ref())?;
        let system_prompt = self.prompts.system_prompt(CHAT_PROMPT).await?;

        let pending = self.conversation.begin_turn(text);
        let history = pending.prior_history(self.settings.history_window);

        let mut deltas = self
            .client
            .complete_stream(&credential, history, text, &system_prompt)
            .await?;

        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            on_delta(&delta);
            reply.push_str(&delta);
        }

        if reply.is_empty() {
            return Err(CompletionError::MalformedResponse(
                "stream ended without any text".to_string(),
            )
            .into());
        }

        let snippets = extract(&reply);
        tracing::info!(snippets = snippets.len(), "Streamed assistant turn received");
        Ok(pending.commit(&reply, snippets))
    }

    /// Snippet `snippet` of logged message `message`.
    pub fn snippet(&self, message: usize, snippet: usize) -> Result<&CodeSnippet, SessionError> {
        self.conversation
            .history()
            .get(message)
            .and_then(|m| m.code_snippets.as_ref())
            .and_then(|s| s.get(snippet))
            .ok_or(SessionError::SnippetNotFound { message, snippet })
    }

    /// Pause applied by [`crate::snippets::run`] for logged snippets
    pub fn simulate_delay(&self) -> Duration {
        Duration::from_millis(self.settings.simulate_delay_ms)
    }

    /// One-shot explain/document/review completion. The conversation is untouched.
    pub async fn run_task(
        &mut self,
        kind: TaskKind,
        input: TaskInput,
    ) -> Result<TaskOutput, SessionError> {
        let user_prompt = kind.user_prompt(&input).ok_or(SessionError::EmptyInput)?;
        let credential = self.credentials.ensure(self.credential_prompt.as_ref())?;
        let system_prompt = self.prompts.system_prompt(kind.prompt_name()).await?;

        tracing::info!(task = kind.prompt_name(), "Running task");
        let content = self
            .client
            .complete(&credential, &[], &user_prompt, &system_prompt)
            .await?;

        let snippets = extract(&content);
        Ok(TaskOutput {
            kind,
            content,
            snippets,
        })
    }

    /// Load a project folder and run `kind` over all of it.
    pub async fn run_project_task(
        &mut self,
        kind: TaskKind,
        root: &Path,
        limits: &ProjectLimits,
    ) -> Result<TaskOutput, SessionError> {
        let files = load_project(root, limits).await?;
        self.run_task(kind, TaskInput::Project(files)).await
    }
}

/// The turn itself is logged and sent as given, whitespace included.
fn reject_blank(text: &str) -> Result<(), SessionError> {
    if text.trim().is_empty() {
        Err(SessionError::EmptyInput)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::DeltaStream;
    use crate::conversation::Role;
    use crate::credentials::NoPrompt;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the scripted client saw on one call
    #[derive(Debug, Clone)]
    struct Call {
        credential: String,
        history: Vec<String>,
        new_turn: String,
        system_prompt: String,
    }

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedClient {
        fn with_replies(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            credential: &str,
            history: &[ConversationMessage],
            new_turn: &str,
            system_prompt: &str,
        ) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push(Call {
                credential: credential.to_string(),
                history: history.iter().map(|m| m.content.clone()).collect(),
                new_turn: new_turn.to_string(),
                system_prompt: system_prompt.to_string(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    /// Streams fixed deltas
    struct StreamingClient {
        deltas: Vec<Result<String, CompletionError>>,
    }

    #[async_trait]
    impl CompletionClient for StreamingClient {
        async fn complete(
            &self,
            _credential: &str,
            _history: &[ConversationMessage],
            _new_turn: &str,
            _system_prompt: &str,
        ) -> Result<String, CompletionError> {
            unreachable!("streaming tests only use complete_stream")
        }

        async fn complete_stream(
            &self,
            _credential: &str,
            _history: &[ConversationMessage],
            _new_turn: &str,
            _system_prompt: &str,
        ) -> Result<DeltaStream, CompletionError> {
            let deltas: Vec<_> = self
                .deltas
                .iter()
                .map(|d| match d {
                    Ok(text) => Ok(text.clone()),
                    Err(_) => Err(CompletionError::MalformedResponse("bad chunk".to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(deltas)))
        }
    }

    struct FixedPrompt(&'static str);

    impl CredentialPrompt for FixedPrompt {
        fn request_key(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn settings() -> SessionConfig {
        SessionConfig {
            simulate_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn session_with(client: Arc<dyn CompletionClient>) -> Session {
        let mut session = Session::new(client, Box::new(NoPrompt), settings());
        session.set_credential("sk-test").unwrap();
        session
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_assistant() {
        let reply = "Here:\n```js\nconsole.log(\"hi\")\n```\nDone";
        let client = ScriptedClient::with_replies(vec![Ok(reply.to_string())]);
        let mut session = session_with(client.clone());

        let message = session.submit("How do I print in JS?").await.unwrap();
        assert_eq!(message.role, Role::Assistant);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].code_snippets, Some(extract(reply)));

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].credential, "sk-test");
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[0].new_turn, "How do I print in JS?");
        assert_eq!(calls[0].system_prompt, crate::config::prompts::builtin::CHAT);
    }

    #[tokio::test]
    async fn test_history_sent_in_order() {
        let client = ScriptedClient::with_replies(vec![
            Ok("first answer".to_string()),
            Ok("second answer".to_string()),
        ]);
        let mut session = session_with(client.clone());

        session.submit("first question").await.unwrap();
        session.submit("second question").await.unwrap();

        let calls = client.calls();
        assert_eq!(calls[1].history, vec!["first question", "first answer"]);
        assert_eq!(calls[1].new_turn, "second question");
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_user_turn() {
        let client = ScriptedClient::with_replies(vec![Err(CompletionError::RequestFailed {
            status: 500,
        })]);
        let mut session = session_with(client);

        let err = session.submit("will this work?").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Completion(CompletionError::RequestFailed { status: 500 })
        ));

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "will this work?");
    }

    #[tokio::test]
    async fn test_next_submit_after_failure_includes_unanswered_turn() {
        let client = ScriptedClient::with_replies(vec![
            Err(CompletionError::MalformedResponse("empty".to_string())),
            Ok("answer".to_string()),
        ]);
        let mut session = session_with(client.clone());

        assert!(session.submit("lost").await.is_err());
        session.submit("retry").await.unwrap();

        assert_eq!(client.calls()[1].history, vec!["lost"]);
        assert_eq!(session.history().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_credential_leaves_log_untouched() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = Session::new(client.clone(), Box::new(NoPrompt), settings());

        let err = session.submit("hello").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Credential(CredentialError::CredentialUnavailable)
        ));
        assert!(session.history().is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_credential_acquired_through_prompt() {
        let client = ScriptedClient::with_replies(vec![Ok("hi".to_string())]);
        let mut session = Session::new(client.clone(), Box::new(FixedPrompt("sk-env")), settings());
        assert!(!session.has_credential());

        session.submit("hello").await.unwrap();
        assert!(session.has_credential());
        assert_eq!(client.calls()[0].credential, "sk-env");
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = session_with(client.clone());

        assert!(matches!(
            session.submit("   ").await,
            Err(SessionError::EmptyInput)
        ));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_window_limits_what_is_sent() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = Session::new(
            client.clone(),
            Box::new(NoPrompt),
            SessionConfig {
                history_window: 2,
                ..settings()
            },
        );
        session.set_credential("sk-test").unwrap();

        for i in 0..3 {
            session.submit(&format!("q{}", i)).await.unwrap();
        }

        let last = client.calls().pop().unwrap();
        assert_eq!(last.history, vec!["q1", "default reply"]);
        // The log itself is never truncated
        assert_eq!(session.history().len(), 6);
    }

    #[tokio::test]
    async fn test_clear_twice() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = session_with(client);
        session.submit("hi").await.unwrap();

        session.clear();
        session.clear();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_accumulates_deltas() {
        let client = Arc::new(StreamingClient {
            deltas: vec![
                Ok("```py\nprint('hi')".to_string()),
                Ok("\n```".to_string()),
            ],
        });
        let mut session = session_with(client);

        let mut seen = Vec::new();
        let message = session
            .submit_streaming("show me", |delta| seen.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(message.content, "```py\nprint('hi')\n```");
        assert_eq!(message.code_snippets.as_ref().unwrap()[0].language, "py");
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_streaming_error_keeps_user_turn() {
        let client = Arc::new(StreamingClient {
            deltas: vec![
                Ok("partial".to_string()),
                Err(CompletionError::MalformedResponse(String::new())),
            ],
        });
        let mut session = session_with(client);

        let result = session.submit_streaming("hi", |_| {}).await;
        assert!(matches!(
            result,
            Err(SessionError::Completion(CompletionError::MalformedResponse(_)))
        ));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_without_text_is_malformed() {
        let client = Arc::new(StreamingClient { deltas: vec![] });
        let mut session = session_with(client);

        let result = session.submit_streaming("anyone there?", |_| {}).await;
        assert!(matches!(
            result,
            Err(SessionError::Completion(CompletionError::MalformedResponse(_)))
        ));

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_user_turn_is_logged_verbatim() {
        let client = ScriptedClient::with_replies(vec![Ok("ok".to_string())]);
        let mut session = session_with(client.clone());

        session.submit("  indented question\n").await.unwrap();
        assert_eq!(session.history()[0].content, "  indented question\n");
        assert_eq!(client.calls()[0].new_turn, "  indented question\n");
    }

    #[tokio::test]
    async fn test_streaming_falls_back_to_single_delta() {
        let client = ScriptedClient::with_replies(vec![Ok("whole reply".to_string())]);
        let mut session = session_with(client);

        let mut seen = Vec::new();
        session
            .submit_streaming("hi", |delta| seen.push(delta.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["whole reply"]);
    }

    async fn run_logged(
        session: &Session,
        message: usize,
        snippet: usize,
    ) -> Result<String, SessionError> {
        let found = session.snippet(message, snippet)?;
        Ok(crate::snippets::run(&found.code, &found.language, session.simulate_delay()).await)
    }

    #[tokio::test]
    async fn test_run_snippet() {
        let client = ScriptedClient::with_replies(vec![Ok(
            "```python\ndef f(): pass\n```\n```js\nconsole.log('x')\n```".to_string(),
        )]);
        let mut session = session_with(client);
        session.submit("two snippets please").await.unwrap();

        assert!(run_logged(&session, 1, 0).await.unwrap().starts_with(">>> "));
        assert_eq!(run_logged(&session, 1, 1).await.unwrap(), "> x");
        assert!(matches!(
            run_logged(&session, 0, 0).await,
            Err(SessionError::SnippetNotFound { message: 0, snippet: 0 })
        ));
        assert!(matches!(
            run_logged(&session, 1, 5).await,
            Err(SessionError::SnippetNotFound { .. })
        ));
        assert_eq!(session.snippet(1, 1).unwrap().language, "js");
    }

    #[tokio::test]
    async fn test_run_task_leaves_conversation_alone() {
        let client = ScriptedClient::with_replies(vec![Ok(
            "Ownership means...\n```rust\nlet s = String::new();\n```".to_string(),
        )]);
        let mut session = session_with(client.clone());

        let output = session
            .run_task(TaskKind::Explain, TaskInput::Topic("ownership".to_string()))
            .await
            .unwrap();

        assert_eq!(output.kind, TaskKind::Explain);
        assert_eq!(output.snippets.len(), 1);
        assert!(session.history().is_empty());

        let calls = client.calls();
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[0].system_prompt, crate::config::prompts::builtin::EXPLAIN);
        assert!(calls[0].new_turn.ends_with("ownership"));
    }

    #[tokio::test]
    async fn test_run_task_empty_input() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = session_with(client.clone());

        let result = session
            .run_task(TaskKind::Explain, TaskInput::Topic(String::new()))
            .await;
        assert!(matches!(result, Err(SessionError::EmptyInput)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_project_task_missing_folder() {
        let client = ScriptedClient::with_replies(vec![]);
        let mut session = session_with(client);

        let result = session
            .run_project_task(
                TaskKind::Review,
                Path::new("/no/such/learnomatic/project"),
                &ProjectLimits::default(),
            )
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Project(ProjectError::NotFound(_)))
        ));
    }
}
