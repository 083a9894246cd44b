//! API routes

use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post, put},
    Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, MutexGuard};

use crate::conversation::{Conversation, ConversationMessage};
use crate::core::{
    ProjectError, ResultKind, SavedResult, Session, SessionError, TaskInput, TaskKind,
    TaskOutput,
};
use crate::credentials::CredentialError;
use crate::snippets::{self, CodeSnippet};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;

/// Errors surfaced by the HTTP API as `{ "error": "..." }`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("A request is already in flight for this conversation")]
    Busy,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Credential(e) | ApiError::Session(SessionError::Credential(e)) => match e {
                CredentialError::InvalidCredential => StatusCode::BAD_REQUEST,
                CredentialError::CredentialUnavailable => StatusCode::UNAUTHORIZED,
            },
            ApiError::Session(SessionError::Completion(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Session(SessionError::EmptyInput) => StatusCode::BAD_REQUEST,
            ApiError::Session(SessionError::SnippetNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::Project(e)) => match e {
                ProjectError::NotFound(_) => StatusCode::NOT_FOUND,
                ProjectError::Forbidden(_) => StatusCode::FORBIDDEN,
                ProjectError::NotADirectory(_) | ProjectError::Empty(_) => StatusCode::BAD_REQUEST,
                ProjectError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Session(SessionError::Prompt(_)) | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// One request cycle at a time; a second one is refused instead of queued.
fn lock_session(state: &AppState) -> Result<MutexGuard<'_, Session>, ApiError> {
    state.session.try_lock().map_err(|_| ApiError::Busy)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CredentialStatus {
    pub present: bool,
}

async fn set_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<StatusCode, ApiError> {
    lock_session(&state)?.set_credential(&request.api_key)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_credential(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    lock_session(&state)?.clear_credential();
    Ok(StatusCode::NO_CONTENT)
}

async fn credential_status(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, ApiError> {
    let present = lock_session(&state)?.has_credential();
    Ok(Json(CredentialStatus { present }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ConversationMessage>, ApiError> {
    let mut session = lock_session(&state)?;
    let message = session.submit(&request.message).await?;
    Ok(Json(message.clone()))
}

fn sse_event(name: &str, data: impl AsRef<str>) -> Result<Event, Infallible> {
    Ok(Event::default().event(name).data(data))
}

enum StreamStep {
    Delta(String),
    Finished(Result<ConversationMessage, SessionError>),
}

/// Server-sent events: `delta` for each text fragment, then `done` with the
/// assistant message or `error`. A client disconnect abandons the turn.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut session = state
        .session
        .clone()
        .try_lock_owned()
        .map_err(|_| ApiError::Busy)?;

    let events = async_stream::stream! {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let submit = session.submit_streaming(&request.message, move |delta: &str| {
            let _ = tx.send(delta.to_string());
        });
        tokio::pin!(submit);

        let outcome = loop {
            let step = tokio::select! {
                biased;
                Some(delta) = rx.recv() => StreamStep::Delta(delta),
                outcome = &mut submit => StreamStep::Finished(outcome.map(|m| m.clone())),
            };
            match step {
                StreamStep::Delta(delta) => {
                    yield sse_event("delta", delta);
                }
                StreamStep::Finished(outcome) => break outcome,
            }
        };

        while let Ok(delta) = rx.try_recv() {
            yield sse_event("delta", delta);
        }

        match outcome.map(|message| serde_json::to_string(&message)) {
            Ok(Ok(message)) => {
                yield sse_event("done", message);
            }
            Ok(Err(e)) => {
                yield sse_event("error", e.to_string());
            }
            Err(e) => {
                tracing::warn!("Streamed turn failed: {}", e);
                yield sse_event("error", e.to_string());
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn get_conversation(State(state): State<AppState>) -> Result<Json<Conversation>, ApiError> {
    let session = lock_session(&state)?;
    Ok(Json(session.conversation().clone()))
}

async fn clear_conversation(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    lock_session(&state)?.clear();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SimulationResponse {
    pub output: String,
}

async fn run_logged_snippet(
    State(state): State<AppState>,
    Path((message, snippet)): Path<(usize, usize)>,
) -> Result<Json<SimulationResponse>, ApiError> {
    let (found, delay) = {
        let session = lock_session(&state)?;
        (session.snippet(message, snippet)?.clone(), session.simulate_delay())
    };
    let output = snippets::run(&found.code, &found.language, delay).await;
    Ok(Json(SimulationResponse { output }))
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub snippets: Vec<CodeSnippet>,
}

async fn extract_snippets(Json(request): Json<ExtractRequest>) -> Json<ExtractResponse> {
    Json(ExtractResponse {
        snippets: snippets::extract(&request.text),
    })
}

async fn simulate_snippet(
    State(state): State<AppState>,
    Json(snippet): Json<CodeSnippet>,
) -> Json<SimulationResponse> {
    let output = snippets::run(&snippet.code, &snippet.language, state.simulate_delay).await;
    Json(SimulationResponse { output })
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub input: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Keep the output in the results store
    #[serde(default)]
    pub save: bool,
}

impl TaskRequest {
    /// Explain without a language is a topic; everything else is code.
    fn into_input(self, kind: TaskKind) -> TaskInput {
        match (kind, self.language) {
            (TaskKind::Explain, None) => TaskInput::Topic(self.input),
            (_, language) => TaskInput::Code {
                code: self.input,
                language,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub output: TaskOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<SavedResult>,
}

const TITLE_MAX_CHARS: usize = 60;

/// First non-blank line of the input, shortened.
fn result_title(input: &str) -> String {
    let line = input
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");
    if line.chars().count() > TITLE_MAX_CHARS {
        let short: String = line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", short)
    } else {
        line.to_string()
    }
}

async fn finish_task(
    state: &AppState,
    output: TaskOutput,
    save_as: Option<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let saved = match save_as {
        Some(title) => Some(
            state
                .results
                .save(output.kind.result_kind(), &title, &output.content)
                .await?,
        ),
        None => None,
    };
    Ok(Json(TaskResponse { output, saved }))
}

async fn run_task(
    kind: TaskKind,
    state: AppState,
    request: TaskRequest,
) -> Result<Json<TaskResponse>, ApiError> {
    let save_as = request.save.then(|| result_title(&request.input));
    let output = {
        let mut session = lock_session(&state)?;
        session.run_task(kind, request.into_input(kind)).await?
    };
    finish_task(&state, output, save_as).await
}

async fn explain(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    run_task(TaskKind::Explain, state, request).await
}

async fn document(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    run_task(TaskKind::Document, state, request).await
}

async fn review(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    run_task(TaskKind::Review, state, request).await
}

#[derive(Debug, Deserialize)]
pub struct ProjectTaskRequest {
    pub path: PathBuf,
    pub kind: TaskKind,
    #[serde(default)]
    pub save: bool,
}

async fn project_task(
    State(state): State<AppState>,
    Json(request): Json<ProjectTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let save_as = request
        .save
        .then(|| format!("Project {}", request.path.display()));
    let output = {
        let mut session = lock_session(&state)?;
        session
            .run_project_task(request.kind, &request.path, &state.project_limits)
            .await?
    };
    finish_task(&state, output, save_as).await
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub kind: Option<ResultKind>,
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SaveResultRequest {
    pub kind: ResultKind,
    pub title: String,
    pub content: String,
}

async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<SavedResult>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let results = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.results.search(q, limit).await?,
        None => state.results.list(query.kind, limit).await?,
    };
    Ok(Json(results))
}

async fn save_result(
    State(state): State<AppState>,
    Json(request): Json<SaveResultRequest>,
) -> Result<(StatusCode, Json<SavedResult>), ApiError> {
    let saved = state
        .results
        .save(request.kind, &request.title, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedResult>, ApiError> {
    state
        .results
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Result {}", id)))
}

async fn delete_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.results.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Result {}", id)))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/credential",
            put(set_credential)
                .delete(clear_credential)
                .get(credential_status),
        )
        .route("/v1/chat", post(chat))
        .route("/v1/chat/stream", post(chat_stream))
        .route(
            "/v1/conversation",
            get(get_conversation).delete(clear_conversation),
        )
        .route(
            "/v1/conversation/:message/snippets/:snippet/run",
            post(run_logged_snippet),
        )
        .route("/v1/snippets/extract", post(extract_snippets))
        .route("/v1/snippets/simulate", post(simulate_snippet))
        .route("/v1/tasks/explain", post(explain))
        .route("/v1/tasks/document", post(document))
        .route("/v1/tasks/review", post(review))
        .route("/v1/tasks/project", post(project_task))
        .route("/v1/results", get(list_results).post(save_result))
        .route("/v1/results/:id", get(get_result).delete(delete_result))
}
