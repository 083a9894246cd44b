//! Fenced code block extraction
//!
//! Completion text is scanned for triple-backtick fences. Each closed fence
//! becomes a [`CodeSnippet`] in order of appearance; a trailing fence that is
//! never closed is dropped.

pub mod simulate;

use serde::{Deserialize, Serialize};

pub use simulate::run;

/// Language recorded when the opening fence carries no usable tag.
pub const PLAINTEXT: &str = "plaintext";

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub language: String,
    pub code: String,
}

impl CodeSnippet {
    fn new(language: impl Into<String>, code: &str) -> Self {
        Self {
            language: language.into(),
            code: code.trim().to_string(),
        }
    }
}

enum ScanState {
    Outside { cursor: usize },
    Inside { language: String, body_start: usize },
}

/// Extract every closed fenced block from `text`, in source order.
pub fn extract(text: &str) -> Vec<CodeSnippet> {
    let mut snippets = Vec::new();
    let mut state = ScanState::Outside { cursor: 0 };

    loop {
        state = match state {
            ScanState::Outside { cursor } => {
                let Some(offset) = text[cursor..].find(FENCE) else {
                    break;
                };
                let info_start = cursor + offset + FENCE.len();
                let line_end = text[info_start..].find('\n').map(|i| info_start + i);
                let info = &text[info_start..line_end.unwrap_or(text.len())];

                // ```inline``` on a single line
                if let Some(close) = info.find(FENCE) {
                    snippets.push(CodeSnippet::new(PLAINTEXT, &info[..close]));
                    ScanState::Outside {
                        cursor: info_start + close + FENCE.len(),
                    }
                } else if let Some(line_end) = line_end {
                    ScanState::Inside {
                        language: language_tag(info),
                        body_start: line_end + 1,
                    }
                } else {
                    // opening fence on the last line with nothing after it
                    break;
                }
            }
            ScanState::Inside {
                language,
                body_start,
            } => {
                let Some(close) = text[body_start..].find(FENCE) else {
                    tracing::trace!(language = %language, "Dropping unterminated code fence");
                    break;
                };
                snippets.push(CodeSnippet::new(
                    language,
                    &text[body_start..body_start + close],
                ));
                ScanState::Outside {
                    cursor: body_start + close + FENCE.len(),
                }
            }
        };
    }

    snippets
}

fn language_tag(info: &str) -> String {
    let info = info.trim();
    if info.is_empty() || info.contains(char::is_whitespace) {
        PLAINTEXT.to_string()
    } else {
        info.to_lowercase()
    }
}
