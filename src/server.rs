//! DeBounty HTTP server
//!
//! JSON endpoints over the ledger. The caller is taken from the
//! `x-actor-id` header on every request that acts on behalf of an actor.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::auth::caller_from_headers;
use crate::error::LedgerError;
use crate::issues::NewIssue;
use crate::ledger::Ledger;
use crate::types::{
    Amount, Company, Escrow, Hunter, Issue, IssueId, LedgerEvent, LedgerStats, ProposalId,
    SolutionProposal,
};

pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events", get(events_handler))
        .route("/companies", post(register_company_handler))
        .route("/companies/me", get(my_company_handler))
        .route("/companies/me/issues", get(my_issues_handler))
        .route("/hunters", post(register_hunter_handler))
        .route("/hunters/me", get(my_hunter_handler))
        .route("/hunters/me/proposals", get(my_proposals_handler))
        .route("/issues", get(unsolved_issues_handler).post(post_issue_handler))
        .route("/issues/:id", get(issue_handler))
        .route("/issues/:id/escrow", get(escrow_handler))
        .route(
            "/issues/:id/proposals",
            get(proposals_handler).post(post_proposal_handler),
        )
        .route(
            "/issues/:id/proposals/:proposal_id/accept",
            post(accept_proposal_handler),
        )
        .route(
            "/issues/:id/proposals/:proposal_id/reject",
            post(reject_proposal_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Failure rendered as an HTTP response with an [`ErrorBody`]
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    /// Body, path or query string that could not be decoded
    Rejected { status: StatusCode, message: String },
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::NotFound(_)
        | LedgerError::IssueNotFound(_)
        | LedgerError::ProposalNotFound { .. }
        | LedgerError::EscrowNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::AlreadyRegistered(_)
        | LedgerError::DuplicateProposal { .. }
        | LedgerError::IssueClosed(_)
        | LedgerError::AlreadyResolved(_)
        | LedgerError::AlreadyReleased(_)
        | LedgerError::ProposalNotPending(_) => StatusCode::CONFLICT,
        LedgerError::NotRegistered(_) | LedgerError::NotIssueOwner { .. } => {
            StatusCode::FORBIDDEN
        }
        LedgerError::InvalidActorId(_) => StatusCode::UNAUTHORIZED,
        LedgerError::RewardMismatch { .. }
        | LedgerError::RewardBelowMinimum { .. }
        | LedgerError::RewardTooLarge { .. }
        | LedgerError::FieldTooLong { .. } => StatusCode::BAD_REQUEST,
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(e) => ledger_status(e),
            Self::Rejected { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Rejected { .. } => "invalid_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.kind();
        let message = match self {
            Self::Ledger(e) => e.to_string(),
            Self::Rejected { message, .. } => message,
        };
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

// Extractors whose rejections share the ledger's error body

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// REQUESTS / RESPONSES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub name: String,
    #[serde(default)]
    pub metadata_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterHunterRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PostIssueRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub attachment_hash: String,
    pub reward_amount: Amount,
    /// Funds sent along with the request; must equal `reward_amount`
    pub payment: Amount,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<LedgerStats> {
    Json(state.ledger.stats())
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> Json<Vec<LedgerEvent>> {
    Json(state.ledger.events(query.since.unwrap_or(0)))
}

async fn register_company_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterCompanyRequest>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    let caller = caller_from_headers(&headers)?;
    let company = state
        .ledger
        .register_company(&caller, &request.name, &request.metadata_ref)?;
    Ok((StatusCode::CREATED, Json(company)))
}

async fn my_company_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Company>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.get_company(&caller)?))
}

async fn my_issues_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Issue>>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.issues_by_company(&caller)))
}

async fn register_hunter_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterHunterRequest>,
) -> ApiResult<(StatusCode, Json<Hunter>)> {
    let caller = caller_from_headers(&headers)?;
    let hunter = state.ledger.register_hunter(&caller, &request.name)?;
    Ok((StatusCode::CREATED, Json(hunter)))
}

async fn my_hunter_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Hunter>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.get_hunter(&caller)?))
}

async fn my_proposals_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<SolutionProposal>>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.proposals_by_hunter(&caller)))
}

async fn unsolved_issues_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Issue>> {
    Json(state.ledger.get_all_unsolved_issues())
}

async fn post_issue_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<PostIssueRequest>,
) -> ApiResult<(StatusCode, Json<Issue>)> {
    let caller = caller_from_headers(&headers)?;
    let new = NewIssue {
        title: request.title,
        description: request.description,
        attachment_hash: request.attachment_hash,
        reward_amount: request.reward_amount,
    };
    let issue = state.ledger.post_issue(&caller, new, request.payment)?;
    Ok((StatusCode::CREATED, Json(issue)))
}

async fn issue_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<IssueId>,
) -> ApiResult<Json<Issue>> {
    Ok(Json(state.ledger.get_issue(id)?))
}

async fn escrow_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<IssueId>,
) -> ApiResult<Json<Escrow>> {
    Ok(Json(state.ledger.get_escrow(id)?))
}

async fn proposals_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<IssueId>,
) -> ApiResult<Json<Vec<SolutionProposal>>> {
    Ok(Json(state.ledger.get_all_proposed_solution(id)?))
}

async fn post_proposal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<IssueId>,
) -> ApiResult<(StatusCode, Json<SolutionProposal>)> {
    let caller = caller_from_headers(&headers)?;
    let proposal = state.ledger.post_solution_proposal(&caller, id)?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn accept_proposal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiPath((id, proposal_id)): ApiPath<(IssueId, ProposalId)>,
) -> ApiResult<Json<SolutionProposal>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.accept_proposal(&caller, id, proposal_id)?))
}

async fn reject_proposal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiPath((id, proposal_id)): ApiPath<(IssueId, ProposalId)>,
) -> ApiResult<Json<SolutionProposal>> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.ledger.reject_proposal(&caller, id, proposal_id)?))
}

/// Run the server
pub async fn run_server(host: &str, port: u16, ledger: Arc<Ledger>) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        ledger,
        started_at: std::time::Instant::now(),
    });

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting DeBounty server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
