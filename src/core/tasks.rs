//! One-shot learning tasks
//!
//! Explain a topic, document code, or review code. Tasks run outside the chat
//! conversation: no history is sent and nothing is appended to the log.

use serde::{Deserialize, Serialize};

use crate::snippets::{CodeSnippet, PLAINTEXT};

use super::project::{render_project, ProjectFile};
use super::results::ResultKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Explain,
    Document,
    Review,
}

impl TaskKind {
    /// Prompt template name, see [`crate::config::prompts`]
    pub fn prompt_name(&self) -> &'static str {
        match self {
            TaskKind::Explain => "explain",
            TaskKind::Document => "document",
            TaskKind::Review => "review",
        }
    }

    pub fn result_kind(&self) -> ResultKind {
        match self {
            TaskKind::Explain => ResultKind::Explanation,
            TaskKind::Document => ResultKind::Documentation,
            TaskKind::Review => ResultKind::Review,
        }
    }

    /// The user turn for `input`, or `None` if there is nothing to work on.
    pub fn user_prompt(&self, input: &TaskInput) -> Option<String> {
        let body = match input {
            TaskInput::Topic(topic) => {
                let topic = topic.trim();
                if topic.is_empty() {
                    return None;
                }
                topic.to_string()
            }
            TaskInput::Code { code, language } => {
                let code = code.trim();
                if code.is_empty() {
                    return None;
                }
                let tag = language
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .unwrap_or(PLAINTEXT)
                    .to_lowercase();
                format!("```{}\n{}\n```", tag, code)
            }
            TaskInput::Project(files) => {
                if files.is_empty() {
                    return None;
                }
                format!(
                    "The project has {} file(s):\n\n{}",
                    files.len(),
                    render_project(files)
                )
            }
        };

        let lead = match (self, input) {
            (TaskKind::Explain, TaskInput::Topic(_)) => "Explain the following topic:",
            (TaskKind::Explain, _) => "Explain how the following code works:",
            (TaskKind::Document, _) => "Write documentation for the following code:",
            (TaskKind::Review, _) => "Review the following code:",
        };

        Some(format!("{}\n\n{}", lead, body))
    }
}

#[derive(Debug, Clone)]
pub enum TaskInput {
    Topic(String),
    Code {
        code: String,
        language: Option<String>,
    },
    Project(Vec<ProjectFile>),
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub kind: TaskKind,
    pub content: String,
    pub snippets: Vec<CodeSnippet>,
}
