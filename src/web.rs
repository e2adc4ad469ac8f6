use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    config::ServeConfig,
    db::{Database, Round, StoredPerson},
    error::{DbError, MatchError},
    history::{HistoryIndex, HistoryRecord},
    notify,
    output::MatchRecord,
    participant::Participant,
    workflow,
};

#[derive(Clone)]
pub struct Webhook {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct AppState {
    db: Database,
    webhook: Option<Webhook>,
    http: reqwest::Client,
    /// Held while a round is generated or approved so history is never read
    /// and written at the same time.
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: Database, webhook: Option<Webhook>) -> AppState {
        AppState {
            db,
            webhook,
            http: reqwest::Client::new(),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(db: Database, config: &ServeConfig) -> AppState {
        let webhook = config.webhook_url.clone().map(|url| Webhook {
            url,
            timeout: config.webhook_timeout(),
        });
        AppState::new(db, webhook)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("At least two included participants are needed, found {0}")]
    NotEnoughParticipants(usize),

    #[error("No participant with email {0}")]
    UnknownPerson(String),

    #[error("A participant needs a non-blank email")]
    InvalidPerson,

    #[error("No matching round has been generated yet")]
    NoRound,

    #[error("No webhook URL is configured")]
    WebhookNotConfigured,

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Matching(#[from] MatchError),

    #[error("Webhook push failed: {0}")]
    Push(#[from] reqwest::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotEnoughParticipants(_) | AppError::InvalidPerson => {
                StatusCode::BAD_REQUEST
            }
            AppError::UnknownPerson(_) | AppError::NoRound => StatusCode::NOT_FOUND,
            AppError::WebhookNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Push(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Matching(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/people", get(all_people).post(upsert_person))
        .route("/people/import", post(import_people))
        .route("/people/:email/include", post(set_included))
        .route("/history", get(history))
        .route("/history/import", post(import_history))
        .route("/matches", get(latest_matches).post(trigger_matching))
        .route("/matches/push", post(push_matches))
        .with_state(state)
}

pub async fn all_people(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredPerson>>, AppError> {
    Ok(Json(state.db.all_people()?))
}

/// Takes one sheet-style row. An `include` key sets the review flag instead of
/// being stored as an attribute.
pub async fn upsert_person(
    State(state): State<AppState>,
    Json(row): Json<Map<String, Value>>,
) -> Result<Json<StoredPerson>, AppError> {
    let (person, include) = Participant::parse_record(row).ok_or(AppError::InvalidPerson)?;
    state.db.upsert_person(&person)?;
    if let Some(include) = include {
        state.db.set_included(&person.email, include)?;
    }
    state
        .db
        .find_person(&person.email)?
        .map(Json)
        .ok_or(AppError::UnknownPerson(person.email))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Takes sheet-style rows. Rows without an email, or marked as excluded,
/// are skipped.
pub async fn import_people(
    State(state): State<AppState>,
    Json(rows): Json<Vec<Map<String, Value>>>,
) -> Result<Json<ImportSummary>, AppError> {
    let total = rows.len();
    let mut imported = 0;
    for row in rows {
        if let Some(person) = Participant::from_record(row) {
            state.db.upsert_person(&person)?;
            imported += 1;
        }
    }
    tracing::info!(imported, total, "imported participants");
    Ok(Json(ImportSummary {
        imported,
        skipped: total - imported,
    }))
}

#[derive(Debug, Deserialize)]
pub struct Include {
    include: bool,
}

pub async fn set_included(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(body): Json<Include>,
) -> Result<Json<StoredPerson>, AppError> {
    if !state.db.set_included(&email, body.include)? {
        return Err(AppError::UnknownPerson(email));
    }
    state
        .db
        .find_person(&email)?
        .map(Json)
        .ok_or(AppError::UnknownPerson(email))
}

pub async fn history(State(state): State<AppState>) -> Result<Json<HistoryIndex>, AppError> {
    Ok(Json(state.db.history_index()?))
}

pub async fn import_history(
    State(state): State<AppState>,
    Json(records): Json<Vec<HistoryRecord>>,
) -> Result<Json<ImportSummary>, AppError> {
    let imported = state.db.import_history(&records)?;
    Ok(Json(ImportSummary {
        imported,
        skipped: records.len() - imported,
    }))
}

#[derive(Debug, Serialize)]
pub struct RoundResponse {
    pub generation: i64,
    pub records: Vec<MatchRecord>,
    pub unmatched: Vec<Participant>,
    pub triad_fallback: bool,
}

/// Generates and stores a pending round. History only changes once the round
/// is approved by a successful push.
pub async fn trigger_matching(
    State(state): State<AppState>,
) -> Result<Json<RoundResponse>, AppError> {
    let _round = state.run_lock.lock().await;
    tracing::info!("start matching");

    let participants = state.db.included_people()?;
    if participants.len() < 2 {
        return Err(AppError::NotEnoughParticipants(participants.len()));
    }
    let history = state.db.history_index()?;

    let outcome = workflow::run(&participants, &history)?;
    let generation = state.db.save_round(&outcome)?;

    Ok(Json(RoundResponse {
        generation,
        records: outcome.records,
        unmatched: outcome.unmatched,
        triad_fallback: outcome.triad_fallback,
    }))
}

pub async fn latest_matches(State(state): State<AppState>) -> Result<Json<Round>, AppError> {
    state.db.latest_round()?.map(Json).ok_or(AppError::NoRound)
}

/// Pushes the latest round to the webhook and approves it, which is when its
/// pairings are written to history. A failed push leaves the round pending.
pub async fn push_matches(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let webhook = state.webhook.as_ref().ok_or(AppError::WebhookNotConfigured)?;
    let _round = state.run_lock.lock().await;
    let round = state.db.latest_round()?.ok_or(AppError::NoRound)?;

    notify::push_records(&state.http, &webhook.url, webhook.timeout, &round.records).await?;
    let newly_approved = state.db.approve_round(round.generation)?;

    Ok(Json(json!({
        "generation": round.generation,
        "pushed": round.records.len(),
        "history_updated": newly_approved,
    })))
}
