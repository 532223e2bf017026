//! # REST API
//!
//! Builds the axum router that exposes sessions, transactions and
//! verifiable reads over HTTP. Every handler shares [`AppState`] through
//! axum's `State` extractor.
//!
//! Sessions and transactions are addressed through request headers, not
//! paths: `sessionid` names the session and `transactionid` the transaction
//! inside it. A missing header is a protocol error (400); a present but
//! unknown id is a 404.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Headers                       | Description                       |
//! |--------|----------------------------|-------------------------------|-----------------------------------|
//! | GET    | `/health`                  |                               | Liveness check                    |
//! | GET    | `/status`                  |                               | Server status summary             |
//! | POST   | `/sessions`                |                               | Open a session                    |
//! | POST   | `/sessions/keepalive`      | `sessionid`                   | Heartbeat                         |
//! | DELETE | `/sessions`                | `sessionid`                   | Close a session                   |
//! | POST   | `/transactions`            | `sessionid`                   | Open a transaction                |
//! | POST   | `/transactions/exec`       | `sessionid`, `transactionid`  | Run one operation                 |
//! | POST   | `/transactions/commit`     | `sessionid`, `transactionid`  | Commit                            |
//! | POST   | `/transactions/rollback`   | `sessionid`, `transactionid`  | Roll back                         |
//! | GET    | `/state`                   |                               | Current (signed) state            |
//! | GET    | `/verifiable/:key`         |                               | Entry with dual proof (`?since=`) |
//! | GET    | `/proof/:source/:target`   |                               | Dual proof between two txs        |
//! | GET    | `/tx/:id`                  |                               | Header and entries of one tx      |
//! | GET    | `/collections`             |                               | Collection names                  |
//! | POST   | `/collections`             |                               | Create a collection               |
//! | GET    | `/collections/:name`       |                               | Collection and its index keys     |
//! | POST   | `/collections/:name/documents` |                           | Insert a document                 |
//! | POST   | `/collections/:name/search`    |                           | Paged field search                |
//! | GET    | `/collections/:name/documents/:id`       |                 | Current document                  |
//! | GET    | `/collections/:name/documents/:id/proof` |                 | Document with proof (`?since=`)   |
//!
//! The document routes write through their own engine transactions, not a
//! session. They share the served database, so their commits show up in
//! `/state`, `/tx/:id` and `/proof`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use veritas_core::document::{
    CollectionInfo, DocumentError, DocumentProof, DocumentStore, FieldQuery, IndexType,
    InsertedDocument,
};
use veritas_core::engine::{EngineError, ExecOutcome, MemoryDatabase, Operation, TxMode};
use veritas_core::ledger::{DualProof, Entry, LedgerError, ProofSource, TxHeader, VerifiableEntry};
use veritas_core::session::{
    session_id_from_metadata, transaction_id_from_metadata, RequestMetadata, Session,
    SessionError, SessionManager, User,
};
use veritas_core::{Database, ImmutableState, StateSigner};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub manager: Arc<SessionManager>,
    pub db: Arc<MemoryDatabase>,
    /// Collections over `db`.
    pub documents: Arc<DocumentStore>,
    /// Signs served states. `None` serves unsigned states.
    pub signer: Option<Arc<StateSigner>>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// State over `db` with a document store on the same database.
    pub fn new(
        version: impl Into<String>,
        manager: Arc<SessionManager>,
        db: Arc<MemoryDatabase>,
        signer: Option<Arc<StateSigner>>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            version: version.into(),
            manager,
            documents: Arc::new(DocumentStore::new(Arc::clone(&db))),
            db,
            signer,
            metrics,
        }
    }

    fn sign_entry(&self, entry: VerifiableEntry) -> VerifiableEntry {
        match &self.signer {
            Some(signer) => signer.sign_entry_proof(entry),
            None => entry,
        }
    }

    fn sign(&self, state: ImmutableState) -> ImmutableState {
        match &self.signer {
            Some(signer) => signer.sign_state(state),
            None => state,
        }
    }

    fn refresh_session_gauge(&self) {
        self.metrics
            .sessions_active
            .set(self.manager.count() as i64);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/sessions",
            post(open_session_handler).delete(close_session_handler),
        )
        .route("/sessions/keepalive", post(keepalive_handler))
        .route("/transactions", post(new_transaction_handler))
        .route("/transactions/exec", post(exec_handler))
        .route("/transactions/commit", post(commit_handler))
        .route("/transactions/rollback", post(rollback_handler))
        .route("/state", get(state_handler))
        .route("/verifiable/:key", get(verifiable_handler))
        .route("/proof/:source/:target", get(proof_handler))
        .route("/tx/:id", get(tx_handler))
        .route(
            "/collections",
            get(list_collections_handler).post(create_collection_handler),
        )
        .route("/collections/:name", get(get_collection_handler))
        .route("/collections/:name/documents", post(insert_document_handler))
        .route("/collections/:name/search", post(search_handler))
        .route("/collections/:name/documents/:id", get(get_document_handler))
        .route(
            "/collections/:name/documents/:id/proof",
            get(document_proof_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub user: String,
    /// Must name the served database when given.
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub database: String,
    /// Hex-encoded key that signs served states, if any.
    pub server_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewTransactionRequest {
    pub mode: TxMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewTransactionResponse {
    pub transaction_id: String,
    pub mode: TxMode,
}

/// One operation, with UTF-8 keys and values.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ExecRequest {
    Set { key: String, value: String },
    Get { key: String },
}

impl From<ExecRequest> for Operation {
    fn from(req: ExecRequest) -> Self {
        match req {
            ExecRequest::Set { key, value } => Operation::Set {
                key: key.into_bytes(),
                value: value.into_bytes(),
            },
            ExecRequest::Get { key } => Operation::Get {
                key: key.into_bytes(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl From<ExecOutcome> for ExecResponse {
    fn from(outcome: ExecOutcome) -> Self {
        match outcome {
            ExecOutcome::Written => ExecResponse {
                outcome: "written".into(),
                value: None,
            },
            ExecOutcome::Value(bytes) => ExecResponse {
                outcome: "value".into(),
                value: Some(String::from_utf8_lossy(&bytes).into_owned()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    /// `None` for read-only transactions.
    pub header: Option<TxHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub database: String,
    pub sessions: usize,
    pub evicted_total: u64,
    pub tx_id: u64,
    pub root_hash: String,
    pub signed: bool,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifiableParams {
    pub since: Option<u64>,
}

/// A committed transaction as stored in the log.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    pub header: TxHeader,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub index_keys: BTreeMap<String, IndexType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub queries: Vec<FieldQuery>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    100
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub page: usize,
    pub per_page: usize,
    pub documents: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error, mapped to an HTTP status in [`IntoResponse`].
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    Ledger(LedgerError),
    Document(DocumentError),
    UnknownDatabase(String),
}

impl From<DocumentError> for ApiError {
    fn from(e: DocumentError) -> Self {
        ApiError::Document(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(e) if e.is_protocol_error() => StatusCode::BAD_REQUEST,
            ApiError::Session(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::OngoingReadWriteTx) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::CapacityExhausted { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Session(SessionError::Engine(e)) => engine_status(e),
            ApiError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(e) => ledger_status(e),
            ApiError::Document(e) => document_status(e),
            ApiError::UnknownDatabase(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Session(e) => e.to_string(),
            ApiError::Ledger(e) => e.to_string(),
            ApiError::Document(e) => e.to_string(),
            ApiError::UnknownDatabase(name) => format!("database not found: {name}"),
        }
    }
}

fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::KeyNotFound => StatusCode::NOT_FOUND,
        EngineError::ReadOnly => StatusCode::CONFLICT,
        EngineError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Ledger(inner) => ledger_status(inner),
        EngineError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::KeyNotFound | LedgerError::TxNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidRange { .. } | LedgerError::EmptyTransaction => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Tree(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn document_status(e: &DocumentError) -> StatusCode {
    match e {
        DocumentError::CollectionNotFound(_) | DocumentError::DocumentNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        DocumentError::CollectionExists(_) => StatusCode::CONFLICT,
        DocumentError::InvalidDocument(_) | DocumentError::InvalidQuery(_) => {
            StatusCode::BAD_REQUEST
        }
        DocumentError::Engine(inner) => engine_status(inner),
        DocumentError::Ledger(inner) => ledger_status(inner),
        DocumentError::Json(_) | DocumentError::Verification(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.message(), "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Header helpers
// ---------------------------------------------------------------------------

/// Request headers as session metadata. Non-UTF-8 values are dropped.
fn metadata(headers: &HeaderMap) -> RequestMetadata {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

fn session_for(state: &AppState, md: &RequestMetadata) -> Result<Arc<Session>, ApiError> {
    let id = session_id_from_metadata(md)?;
    Ok(state.manager.get_session(&id)?)
}

fn transaction_for(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Session>, String), ApiError> {
    let md = metadata(headers);
    let session = session_for(state, &md)?;
    let tx_id = transaction_id_from_metadata(&md)?;
    Ok((session, tx_id))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the server is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: session count and the current state of the log.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.db.current_state();
    Json(StatusResponse {
        version: state.version.clone(),
        database: state.db.name().to_string(),
        sessions: state.manager.count(),
        evicted_total: state.manager.evicted_total(),
        tx_id: current.tx_id,
        root_hash: current.root_hex(),
        signed: state.signer.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /sessions`: opens a session bound to the served database.
async fn open_session_handler(
    State(state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<OpenSessionResponse>), ApiError> {
    if let Some(name) = req.database.as_deref() {
        if name != state.db.name() {
            return Err(ApiError::UnknownDatabase(name.to_string()));
        }
    }

    let session = state
        .manager
        .create_session(User::new(req.user), state.db.clone())?;
    state.refresh_session_gauge();

    Ok((
        StatusCode::CREATED,
        Json(OpenSessionResponse {
            session_id: session.id().to_string(),
            database: state.db.name().to_string(),
            server_public_key: state
                .signer
                .as_ref()
                .map(|s| hex::encode(s.public_key_bytes())),
        }),
    ))
}

/// `POST /sessions/keepalive`: heartbeat; revives an idle session.
async fn keepalive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = session_id_from_metadata(&metadata(&headers))?;
    state.manager.update_heartbeat(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /sessions`: closes the session, rolling back what it holds.
///
/// The session is gone even when some rollbacks failed; that case is
/// reported as a 500 with the combined failure list.
async fn close_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = session_id_from_metadata(&metadata(&headers))?;
    let result = state.manager.close_session(&id);
    state.refresh_session_gauge();
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /transactions`: opens a transaction in the caller's session.
async fn new_transaction_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewTransactionRequest>,
) -> Result<(StatusCode, Json<NewTransactionResponse>), ApiError> {
    let session = session_for(&state, &metadata(&headers))?;
    let tx = session.new_transaction(req.mode)?;
    state.metrics.transactions_opened_total.inc();

    Ok((
        StatusCode::CREATED,
        Json(NewTransactionResponse {
            transaction_id: tx.id().to_string(),
            mode: tx.mode(),
        }),
    ))
}

/// `POST /transactions/exec`: runs one `set` or `get`.
async fn exec_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExecRequest>,
) -> ApiResult<ExecResponse> {
    let (session, tx_id) = transaction_for(&state, &headers)?;
    let outcome = session.exec(&tx_id, req.into())?;
    Ok(Json(outcome.into()))
}

/// `POST /transactions/commit`
async fn commit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CommitResponse> {
    let (session, tx_id) = transaction_for(&state, &headers)?;

    let timer = state.metrics.commit_latency_seconds.start_timer();
    let header = session.commit_transaction(&tx_id)?;
    timer.observe_duration();
    state.metrics.transactions_committed_total.inc();

    if let Some(h) = &header {
        tracing::debug!(tx_id = h.id, entries = h.entry_count, "transaction committed");
    }
    Ok(Json(CommitResponse { header }))
}

/// `POST /transactions/rollback`
async fn rollback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (session, tx_id) = transaction_for(&state, &headers)?;
    session.rollback_transaction(&tx_id)?;
    state.metrics.transactions_rolled_back_total.inc();
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /state`: the log's current state, signed when a key is loaded.
async fn state_handler(State(state): State<AppState>) -> Json<ImmutableState> {
    Json(state.sign(state.db.current_state()))
}

/// `GET /verifiable/:key?since=N`: latest value of `key` with a dual proof
/// from transaction `N` (or from the current state) to the current state.
async fn verifiable_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<VerifiableParams>,
) -> ApiResult<VerifiableEntry> {
    let entry = state.db.verifiable_entry(key.as_bytes(), params.since)?;
    let entry = state.sign_entry(entry);
    state.metrics.verified_reads_total.inc();
    Ok(Json(entry))
}

/// `GET /proof/:source/:target`: dual proof linking two transactions.
async fn proof_handler(
    State(state): State<AppState>,
    Path((source, target)): Path<(u64, u64)>,
) -> ApiResult<DualProof> {
    Ok(Json(state.db.proof_between(source, target)?))
}

/// `GET /tx/:id`: header and entries of a committed transaction.
async fn tx_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<TxResponse> {
    let header = state.db.tx_header(id)?;
    let entries = state.db.log().tx_entries(id)?;
    Ok(Json(TxResponse { header, entries }))
}

/// `GET /collections`
async fn list_collections_handler(State(state): State<AppState>) -> Json<CollectionsResponse> {
    Json(CollectionsResponse {
        collections: state.documents.collections(),
    })
}

/// `POST /collections`: `_id` is indexed without being asked for.
async fn create_collection_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionInfo>), ApiError> {
    let info = state.documents.create_collection(&req.name, req.index_keys)?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// `GET /collections/:name`
async fn get_collection_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CollectionInfo> {
    Ok(Json(state.documents.get_collection(&name)?))
}

/// `POST /collections/:name/documents`: body is the document object.
async fn insert_document_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(document): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<InsertedDocument>), ApiError> {
    let inserted = state.documents.insert_document(&name, document)?;
    state.metrics.transactions_committed_total.inc();
    Ok((StatusCode::CREATED, Json(inserted)))
}

/// `POST /collections/:name/search`
async fn search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let documents = state
        .documents
        .search_documents(&name, &req.queries, req.page, req.per_page)?;
    Ok(Json(SearchResponse {
        page: req.page,
        per_page: req.per_page,
        documents,
    }))
}

/// `GET /collections/:name/documents/:id`
async fn get_document_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Map<String, Value>> {
    Ok(Json(state.documents.get_document(&name, &id)?))
}

/// `GET /collections/:name/documents/:id/proof?since=N`
async fn document_proof_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<VerifiableParams>,
) -> ApiResult<DocumentProof> {
    let mut proof = state.documents.document_proof(&name, &id, params.since)?;
    proof.verifiable = state.sign_entry(proof.verifiable);
    state.metrics.verified_reads_total.inc();
    Ok(Json(proof))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
