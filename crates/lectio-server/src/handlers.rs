use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use lectio_pipeline::analyzer::{Analyzer, AnalyzerError};
use lectio_pipeline::consolidator::{self, ConsolidateError};
use lectio_pipeline::linker;
use lectio_pipeline::projector::TextTreeRenderer;
use lectio_store::{LexiconStore, StoreError};
use lectio_types::{EntryId, EntryStatus, Pos, SyntaxRole, TextId};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<LexiconStore>>,
    pub analyzer: Arc<dyn Analyzer>,
    /// Snapshot location; `None` disables persistence.
    pub store_path: Option<PathBuf>,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    pub level: Option<u8>,
}

#[derive(Deserialize)]
pub struct ForceMergeRequest {
    pub survivor: u64,
    pub victim: u64,
    #[serde(default)]
    pub allow_pos_mismatch: bool,
}

#[derive(Serialize)]
struct EntryInfo {
    id: EntryId,
    lemma: String,
    gloss: String,
    pos: Pos,
    status: EntryStatus,
}

#[derive(Serialize)]
struct TokenInfo {
    surface: String,
    role: SyntaxRole,
    needs_review: bool,
    entry: Option<EntryInfo>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/texts", post(ingest_text))
        .route("/v1/texts/{id}/reanalyze", post(reanalyze_text))
        .route(
            "/v1/texts/{id}/tokens/{sentence}/{position}",
            get(token_lookup),
        )
        .route("/v1/texts/{id}/sentences/{sentence}/roles", get(sentence_roles))
        .route("/v1/texts/{id}/sentences/{sentence}/tree", get(sentence_tree))
        .route("/v1/reconcile", post(reconcile))
        .route("/v1/reconcile/force", post(force_merge))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

/// Ingest (or re-import by title) one text: analyze, link, annotate.
///
/// The analyzer call happens before any lock is taken; an analyzer failure
/// aborts this text only and leaves the store untouched.
async fn ingest_text(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Response, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    let level = req.level.unwrap_or(1);

    let analyzed = state.analyzer.analyze(&req.content).await?;

    let report = {
        let mut store = state.store.write().map_err(|_| ApiError::Internal)?;
        let text = match store.find_text_by_title(&title).map(|t| t.id) {
            Some(id) => {
                store.update_text(id, &req.content, level)?;
                id
            }
            None => store.insert_text(&title, &req.content, level),
        };
        linker::ingest(&mut store, text, &analyzed, Some(&TextTreeRenderer))?
    };

    persist(&state);
    Ok(Json(report).into_response())
}

/// Re-run analysis over a stored text's current content.
async fn reanalyze_text(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let text = TextId(id);
    let content = {
        let store = state.store.read().map_err(|_| ApiError::Internal)?;
        store
            .text(text)
            .ok_or_else(|| ApiError::not_found(format!("no text {id}")))?
            .content
            .clone()
    };

    let analyzed = state.analyzer.analyze(&content).await?;

    let report = {
        let mut store = state.store.write().map_err(|_| ApiError::Internal)?;
        linker::ingest(&mut store, text, &analyzed, Some(&TextTreeRenderer))?
    };

    persist(&state);
    Ok(Json(report).into_response())
}

/// Tooltip lookup: what does the token at (text, sentence, position) mean?
async fn token_lookup(
    State(state): State<AppState>,
    Path((id, sentence, position)): Path<(u64, u32, u32)>,
) -> Result<Response, ApiError> {
    let store = state.store.read().map_err(|_| ApiError::Internal)?;
    let link = store
        .link_at(TextId(id), sentence, position)
        .ok_or_else(|| {
            ApiError::not_found(format!("no token at text {id}, sentence {sentence}, position {position}"))
        })?;
    let entry = link
        .entry
        .and_then(|entry_id| store.entry(entry_id))
        .map(|entry| EntryInfo {
            id: entry.id,
            lemma: entry.lemma.clone(),
            gloss: entry.gloss.clone(),
            pos: entry.pos,
            status: entry.status,
        });
    Ok(Json(TokenInfo {
        surface: link.surface.clone(),
        role: link.role,
        needs_review: link.needs_review,
        entry,
    })
    .into_response())
}

/// Role groups for one sentence, for syntax highlighting.
async fn sentence_roles(
    State(state): State<AppState>,
    Path((id, sentence)): Path<(u64, u32)>,
) -> Result<Response, ApiError> {
    let store = state.store.read().map_err(|_| ApiError::Internal)?;
    let annotation = store.annotation(TextId(id), sentence).ok_or_else(|| {
        ApiError::not_found(format!("no annotation for text {id}, sentence {sentence}"))
    })?;
    Ok(Json(json!({
        "text": annotation.text,
        "sentence": annotation.sentence,
        "roles": annotation.roles,
    }))
    .into_response())
}

/// Rendered dependency tree for one sentence, when one exists.
async fn sentence_tree(
    State(state): State<AppState>,
    Path((id, sentence)): Path<(u64, u32)>,
) -> Result<Response, ApiError> {
    let store = state.store.read().map_err(|_| ApiError::Internal)?;
    let annotation = store.annotation(TextId(id), sentence).ok_or_else(|| {
        ApiError::not_found(format!("no annotation for text {id}, sentence {sentence}"))
    })?;
    let tree = annotation
        .tree
        .clone()
        .ok_or_else(|| ApiError::not_found("no rendered tree for this sentence"))?;
    Ok(Json(json!({ "tree": tree })).into_response())
}

/// Run one consolidation pass under the global store lock.
async fn reconcile(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = {
        let mut store = state.store.write().map_err(|_| ApiError::Internal)?;
        consolidator::reconcile(&mut store)?
    };
    persist(&state);
    Ok(Json(report).into_response())
}

/// Merge one specific pair (the manual fix-up path).
async fn force_merge(
    State(state): State<AppState>,
    Json(req): Json<ForceMergeRequest>,
) -> Result<Response, ApiError> {
    let report = {
        let mut store = state.store.write().map_err(|_| ApiError::Internal)?;
        consolidator::force_merge(
            &mut store,
            EntryId(req.survivor),
            EntryId(req.victim),
            req.allow_pos_mismatch,
        )?
    };
    persist(&state);
    Ok(Json(report).into_response())
}

/// Best-effort snapshot write after a successful mutation.
fn persist(state: &AppState) {
    let Some(path) = &state.store_path else {
        return;
    };
    match state.store.read() {
        Ok(store) => {
            if let Err(err) = store.save(path) {
                warn!("failed to persist store snapshot: {err}");
            }
        }
        Err(_) => warn!("store lock poisoned; snapshot skipped"),
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("analyzer failure: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }

    fn not_found<T: Into<String>>(msg: T) -> Self {
        ApiError::NotFound(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownEntry(id) => ApiError::not_found(format!("no entry {id}")),
            StoreError::UnknownText(id) => ApiError::not_found(format!("no text {id}")),
            other => {
                warn!("store error surfaced to API: {other}");
                ApiError::Internal
            }
        }
    }
}

impl From<ConsolidateError> for ApiError {
    fn from(err: ConsolidateError) -> Self {
        match err {
            ConsolidateError::Store(inner) => inner.into(),
            other @ (ConsolidateError::SameEntry(_) | ConsolidateError::PosMismatch { .. }) => {
                ApiError::bad_request(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Analyzer(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
