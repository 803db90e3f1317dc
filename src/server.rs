// 🌐 JSON API - wizard sessions over HTTP
//
// Sessions live in memory; the lock is never held across the lookup await.
// Idle sessions are evicted once they outlive the session TTL.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Local;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::ChatbotError;
use crate::matcher::RecordSource;
use crate::purchase::ContactInfo;
use crate::questions::Answers;
use crate::records::{BondRecord, RecordSet};
use crate::validation::ValidationError;
use crate::wizard::{DeliveryChannel, Message, Phase, Wizard};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

struct Session {
    wizard: Wizard,
    touched: Instant,
}

impl Session {
    fn new(wizard: Wizard) -> Self {
        Session {
            wizard,
            touched: Instant::now(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    source: Arc<Mutex<RecordSource>>,
    db: Option<Arc<Mutex<Connection>>>,
    session_ttl: Duration,
}

impl AppState {
    pub fn new(source: RecordSource, db: Option<Connection>) -> Self {
        AppState {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            source: Arc::new(Mutex::new(source)),
            db: db.map(|conn| Arc::new(Mutex::new(conn))),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("{0}")]
    Invalid(ValidationError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChatbotError> for ApiError {
    fn from(err: ChatbotError) -> Self {
        match err {
            ChatbotError::Validation(v) => ApiError::Invalid(v),
            other @ (ChatbotError::WrongPhase(_) | ChatbotError::MissingAnswer(_)) => {
                ApiError::Conflict(other.to_string())
            }
            other @ (ChatbotError::Csv(_) | ChatbotError::InvalidRecord { .. }) => {
                ApiError::MalformedPayload(other.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) | ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{}", self);
        }

        let field = match &self {
            ApiError::Invalid(v) => Some(v.field.clone()),
            _ => None,
        };

        (
            status,
            Json(ApiResponse::<Option<()>> {
                success: false,
                data: None,
                error: Some(self.to_string()),
                field,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// `Json` whose rejection is an `ApiError`, so bad bodies get the JSON envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::from(rejection)),
        }
    }
}

/// `Path` whose rejection is an `ApiError`
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(ApiError::from(rejection)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
            field: None,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Session snapshot sent to clients
#[derive(Serialize)]
pub struct SessionView {
    id: Uuid,
    phase: Phase,
    step: usize,
    prompt: String,
    input: String,
    editing: bool,
    answers: Answers,
    summary: Vec<SummaryLine>,
    contact: ContactInfo,
    record: Option<BondRecord>,
    error: Option<ValidationError>,
    notice: Option<String>,
    reference: Option<Uuid>,
    transcript: Vec<Message>,
}

#[derive(Serialize)]
struct SummaryLine {
    step: usize,
    label: &'static str,
    value: String,
}

impl SessionView {
    fn new(id: Uuid, wizard: &Wizard) -> Self {
        SessionView {
            id,
            phase: wizard.phase(),
            step: wizard.step(),
            prompt: wizard.prompt(),
            input: wizard.input().to_string(),
            editing: wizard.is_editing(),
            answers: wizard.answers().clone(),
            summary: wizard
                .summary()
                .into_iter()
                .enumerate()
                .map(|(step, (label, value))| SummaryLine { step, label, value })
                .collect(),
            contact: wizard.contact().clone(),
            record: wizard.record().cloned(),
            error: wizard.error().cloned(),
            notice: wizard.notice().map(str::to_string),
            reference: wizard
                .request()
                .map(|r| r.reference)
                .or_else(|| wizard.inquiry().map(|i| i.reference)),
            transcript: wizard.transcript().to_vec(),
        }
    }
}

#[derive(Serialize)]
pub struct RecordsLoaded {
    records: usize,
}

#[derive(Deserialize)]
pub struct AnswerBody {
    input: String,
}

#[derive(Deserialize)]
pub struct ConsentBody {
    accept: bool,
}

#[derive(Deserialize)]
pub struct DeliveryBody {
    channel: DeliveryChannel,
}

// ============================================================================
// Session helpers
// ============================================================================

/// Run `action` against a session and return its new view
fn with_session<F>(state: &AppState, id: Uuid, action: F) -> ApiResult<SessionView>
where
    F: FnOnce(&mut Wizard) -> Result<(), ChatbotError>,
{
    let mut sessions = lock(&state.sessions)?;
    let session = sessions.get_mut(&id).ok_or(ApiError::SessionNotFound)?;
    session.touched = Instant::now();
    action(&mut session.wizard)?;
    Ok(Json(ApiResponse::ok(SessionView::new(id, &session.wizard))))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, ApiError> {
    mutex
        .lock()
        .map_err(|_| ApiError::Internal("state lock poisoned".to_string()))
}

fn today() -> chrono::NaiveDate {
    Local::now().date_naive()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/records - Replace the record set with an uploaded CSV body
async fn upload_records(State(state): State<AppState>, body: String) -> ApiResult<RecordsLoaded> {
    let set = RecordSet::from_reader(body.as_bytes())?;
    let count = set.len();

    if let Some(db) = &state.db {
        let conn = lock(db)?;
        db::insert_records(&conn, set.records())?;
    }

    *lock(&state.source)? = RecordSource::Local(set);
    info!("Record set replaced by upload ({} rows)", count);

    Ok(Json(ApiResponse::ok(RecordsLoaded { records: count })))
}

/// POST /api/sessions - Start a new conversation
async fn create_session(State(state): State<AppState>) -> ApiResult<SessionView> {
    let id = Uuid::new_v4();
    let wizard = Wizard::new();
    let view = SessionView::new(id, &wizard);

    let mut sessions = lock(&state.sessions)?;
    let before = sessions.len();
    sessions.retain(|_, session| session.touched.elapsed() <= state.session_ttl);
    if sessions.len() < before {
        info!("Evicted {} idle sessions", before - sessions.len());
    }
    sessions.insert(id, Session::new(wizard));
    info!("Session {} started", id);

    Ok(Json(ApiResponse::ok(view)))
}

/// GET /api/sessions/:id
async fn get_session(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<SessionView> {
    with_session(&state, id, |_| Ok(()))
}

/// POST /api/sessions/:id/answer
async fn answer(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AnswerBody>,
) -> ApiResult<SessionView> {
    let response = with_session(&state, id, |wizard| {
        wizard.submit(&body.input, today()).map(|_| ())
    })?;
    persist_request(&state, id)?;
    Ok(response)
}

/// POST /api/sessions/:id/back
async fn back(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<SessionView> {
    with_session(&state, id, |wizard| {
        wizard.back();
        Ok(())
    })
}

/// POST /api/sessions/:id/edit/:step
async fn edit(
    State(state): State<AppState>,
    ApiPath((id, step)): ApiPath<(Uuid, usize)>,
) -> ApiResult<SessionView> {
    with_session(&state, id, |wizard| wizard.edit(step))
}

/// POST /api/sessions/:id/confirm - Run the single lookup from the summary
async fn confirm(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<SessionView> {
    let query = {
        let sessions = lock(&state.sessions)?;
        let session = sessions.get(&id).ok_or(ApiError::SessionNotFound)?;
        session.wizard.lookup_query()?
    };

    let source = lock(&state.source)?.clone();
    let result = source.lookup(&query).await;

    // Answers may have been edited while the lookup was in flight
    let response = with_session(&state, id, |wizard| {
        wizard.resolve_lookup(&query, result);
        Ok(())
    })?;

    persist_inquiry(&state, id)?;
    Ok(response)
}

/// POST /api/sessions/:id/consent
async fn consent(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ConsentBody>,
) -> ApiResult<SessionView> {
    with_session(&state, id, |wizard| wizard.consent(body.accept))
}

/// POST /api/sessions/:id/delivery
async fn delivery(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<DeliveryBody>,
) -> ApiResult<SessionView> {
    let response = with_session(&state, id, |wizard| {
        wizard.choose_delivery(body.channel).map(|_| ())
    })?;
    persist_request(&state, id)?;
    Ok(response)
}

/// POST /api/sessions/:id/restart
async fn restart(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<SessionView> {
    with_session(&state, id, |wizard| {
        wizard.restart();
        Ok(())
    })
}

// ============================================================================
// Persistence
// ============================================================================

fn persist_request(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let Some(db) = &state.db else { return Ok(()) };

    let sessions = lock(&state.sessions)?;
    if let Some(request) = sessions.get(&id).and_then(|s| s.wizard.request()) {
        let conn = lock(db)?;
        if !db::insert_payment_link_request(&conn, request)? {
            warn!("Payment link request {} was already stored", request.reference);
        }
    }
    Ok(())
}

fn persist_inquiry(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let Some(db) = &state.db else { return Ok(()) };

    let sessions = lock(&state.sessions)?;
    if let Some(inquiry) = sessions.get(&id).and_then(|s| s.wizard.inquiry()) {
        let conn = lock(db)?;
        db::insert_inquiry(&conn, inquiry)?;
    }
    Ok(())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", post(upload_records))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/answer", post(answer))
        .route("/sessions/:id/back", post(back))
        .route("/sessions/:id/edit/:step", post(edit))
        .route("/sessions/:id/confirm", post(confirm))
        .route("/sessions/:id/consent", post(consent))
        .route("/sessions/:id/delivery", post(delivery))
        .route("/sessions/:id/restart", post(restart))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================
