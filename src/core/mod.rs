//! Core LearnOmatic components
//!
//! The chat session that orchestrates a request cycle, the one-shot learning
//! tasks, project loading and the saved results store.

mod chat;
mod project;
mod results;
mod tasks;

pub use chat::{Session, SessionError};
pub use project::{ProjectError, ProjectLimits};
pub use results::{ResultKind, ResultStore, SavedResult};
pub use tasks::{TaskInput, TaskKind, TaskOutput};
