//! Prompt templates
//!
//! Each learning mode and the chat assistant have a builtin system prompt. A
//! prompts directory may override any of them with a TOML file named after the
//! mode (`explain.toml`, `document.toml`, `review.toml`, `chat.toml`).
//!
//! # Example Prompt File
//!
//! ```toml
//! [persona]
//! name = "Patient Tutor"
//! description = "Explains things slowly, with analogies"
//!
//! [system_prompt]
//! content = """
//! You are a patient programming tutor...
//! """
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A persona/prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The system prompt
    pub system_prompt: SystemPrompt,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

/// System prompt content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// The full system prompt content
    pub content: String,
}

/// Resolves system prompts by name, preferring templates on disk
#[derive(Debug, Default)]
pub struct PromptManager {
    /// Directory containing prompt templates
    prompts_dir: Option<PathBuf>,

    /// Cached templates by name
    cache: HashMap<String, PromptTemplate>,
}

impl PromptManager {
    /// Create a new prompt manager
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self {
            prompts_dir,
            cache: HashMap::new(),
        }
    }

    /// System prompt for `name`: the template file if one exists, else the builtin.
    pub async fn system_prompt(&mut self, name: &str) -> Result<String, PromptError> {
        if let Some(template) = self.load(name).await? {
            return Ok(template.system_prompt.content.clone());
        }

        builtin::for_name(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Load a template by name (file name without extension); `None` if no file
    async fn load(&mut self, name: &str) -> Result<Option<&PromptTemplate>, PromptError> {
        let Some(dir) = &self.prompts_dir else {
            return Ok(None);
        };

        if !self.cache.contains_key(name) {
            let path = dir.join(format!("{}.toml", name));
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(None);
            }
            let template = Self::load_from_file(&path).await?;
            tracing::info!("Loaded prompt template '{}' from {}", name, path.display());
            self.cache.insert(name.to_string(), template);
        }

        Ok(self.cache.get(name))
    }

    /// Load a template directly from a file path
    pub async fn load_from_file(path: &Path) -> Result<PromptTemplate, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| PromptError::ParseError(e.to_string()))
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Prompt not found: {0}")]
    NotFound(String),
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Conversational assistant used by the chat session
    pub const CHAT: &str = "You are LearnOmatic, a friendly programming tutor. Answer questions about software concepts and code clearly and concisely. When you show code, put it in fenced code blocks tagged with the language.";

    /// Explain a technical topic
    pub const EXPLAIN: &str = r#"You are LearnOmatic, an expert technical educator. Explain the topic the user gives you.

Structure your answer as:
1. **Overview** - What it is, in two or three sentences
2. **Key Concepts** - The ideas a learner must understand
3. **Example** - A short, runnable code example in a fenced block
4. **Common Pitfalls** - Mistakes beginners make
5. **Next Steps** - What to learn after this

Keep the language simple and define jargon the first time it appears."#;

    /// Generate documentation for code
    pub const DOCUMENT: &str = r#"You are LearnOmatic, a technical writer. Write documentation for the code the user gives you.

Include:
1. **Purpose** - What the code does
2. **API** - Each public function, type or class with its parameters and return values
3. **Usage** - At least one example in a fenced code block
4. **Notes** - Assumptions, side effects and error behavior

Document only what the code actually does."#;

    /// Review code
    pub const REVIEW: &str = r#"You are LearnOmatic, a senior engineer doing a code review. Review the code the user gives you.

Report:
1. **Summary** - One paragraph on overall quality
2. **Issues** - Bugs, security problems and performance concerns, most severe first, each with the line or construct it refers to
3. **Style** - Readability and naming suggestions
4. **Improved Version** - Corrected code in a fenced block when changes are needed

Be specific and constructive."#;

    /// Builtin prompt by template name
    pub fn for_name(name: &str) -> Option<&'static str> {
        match name.to_lowercase().as_str() {
            "chat" => Some(CHAT),
            "explain" => Some(EXPLAIN),
            "document" => Some(DOCUMENT),
            "review" => Some(REVIEW),
            _ => None,
        }
    }
}
