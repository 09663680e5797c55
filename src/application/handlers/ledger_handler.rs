//! HTTP API for the ledger
//!
//! Thin axum layer over [`LedgerService`], the sweep actor, and the signal
//! store. Every failure is rendered as an [`ErrorResponse`] with a status code
//! chosen from the error kind.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::actors::sweep_actor::{SweepHandle, SweepHandleError};
use crate::application::services::ledger_service::LedgerService;
use crate::application::services::order_sweeper::SweepReport;
use crate::domain::entities::account::{Account, AccountSnapshot};
use crate::domain::entities::order::{validate_symbol, Fill, Order, OrderSide};
use crate::domain::entities::signal::Signal;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::{ReconcileError, StoreError, ValidationError};
use crate::domain::repositories::signal_store::SignalStore;
use crate::rate_limit::{rate_limit_middleware, SharedRateLimiter};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    pub sweeps: SweepHandle,
    pub signals: Arc<dyn SignalStore>,
}

/// Build the API router; `api_limiter` guards every route when set
pub fn create_router(state: AppState, api_limiter: Option<SharedRateLimiter>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/accounts", post(open_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/trades", post(record_trade))
        .route("/orders", post(submit_order))
        .route("/sweep", post(run_sweep))
        .route("/signals", get(get_signal).put(put_signal))
        .route("/signals/:id", delete(delete_signal))
        .with_state(state);

    if let Some(limiter) = api_limiter {
        router = router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(ReconcileError),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
}

impl From<ReconcileError> for ApiError {
    fn from(error: ReconcileError) -> Self {
        ApiError::Ledger(error)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::Ledger(error.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Ledger(error.into())
    }
}

impl From<SweepHandleError> for ApiError {
    fn from(error: SweepHandleError) -> Self {
        match error {
            SweepHandleError::ActorStopped => {
                ApiError::Unavailable("sweep actor is not running".to_string())
            }
            SweepHandleError::Sweep(e) => ApiError::Ledger(e),
        }
    }
}

fn ledger_status(error: &ReconcileError) -> StatusCode {
    match error {
        ReconcileError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
        ReconcileError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        ReconcileError::NoOffsettingPosition { .. }
        | ReconcileError::OverClose { .. }
        | ReconcileError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ReconcileError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        ReconcileError::Store(_) | ReconcileError::PartialWriteFailure { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            ApiError::Ledger(e) => (ledger_status(&e), e.error_code(), e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "ERR_CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "ERR_UNAVAILABLE", msg),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    pub sweeper: bool,
    pub last_sweep: Option<DateTime<Utc>>,
}

/// Liveness of the store and the sweep actor
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = state.ledger.store().is_healthy().await;
    let stats = state.sweeps.stats().await.ok();
    let sweeper = stats.is_some();
    let healthy = database && sweeper;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            database,
            sweeper,
            last_sweep: stats.and_then(|s| s.last_sweep),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub id: String,
    pub balance: Decimal,
    #[serde(default)]
    pub bitcoin: Decimal,
}

pub async fn open_account(
    State(state): State<AppState>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    if request.id.trim().is_empty() {
        return Err(ApiError::BadRequest("account id must not be empty".to_string()));
    }
    if request.balance.is_sign_negative() || request.bitcoin.is_sign_negative() {
        return Err(ApiError::BadRequest(
            "opening balances must not be negative".to_string(),
        ));
    }

    let account = Account::new(&request.id, request.balance, request.bitcoin);
    if !state.ledger.open_account(account.clone()).await? {
        return Err(ApiError::Conflict(format!(
            "account {} already exists",
            request.id
        )));
    }
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountSnapshot>, ApiError> {
    Ok(Json(state.ledger.snapshot(&account_id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub backtest: bool,
}

/// Reconcile an executed trade entered directly
pub async fn record_trade(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<TradeRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let fill = Fill::new(
        &account_id,
        &request.symbol,
        request.side,
        request.price,
        request.quantity,
        request.backtest,
    );
    let transaction = state.ledger.reconcile_fill(fill).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub backtest: bool,
    pub external_order_id: Option<String>,
}

/// Record a working order for the sweep to track
pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let mut order = Order::new(
        &request.account_id,
        &request.symbol,
        request.side,
        request.price,
        request.quantity,
        request.backtest,
    )?;
    if let Some(external_order_id) = &request.external_order_id {
        order = order.with_external_id(external_order_id);
    }

    let order = state.ledger.submit_order(order).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Run one order status sweep now
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    Ok(Json(state.sweeps.run_sweep().await?))
}

#[derive(Debug, Deserialize)]
pub struct SignalQuery {
    pub symbol: String,
    pub side: OrderSide,
}

pub async fn get_signal(
    State(state): State<AppState>,
    Query(query): Query<SignalQuery>,
) -> Result<Json<Signal>, ApiError> {
    state
        .signals
        .get(&query.symbol, query.side)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("no {} signal for {}", query.side, query.symbol))
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignalRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Option<Decimal>,
    pub timeframe: Option<String>,
    pub notes: Option<String>,
}

/// Store the latest signal for a symbol and side
pub async fn put_signal(
    State(state): State<AppState>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<Signal>, ApiError> {
    validate_symbol(&request.symbol)?;

    let mut signal = Signal::new(&request.symbol, request.side);
    if let Some(price) = request.price {
        if price <= Decimal::ZERO {
            return Err(ApiError::BadRequest(format!(
                "signal price must be positive, got {}",
                price
            )));
        }
        signal = signal.with_price(price);
    }
    if let Some(timeframe) = &request.timeframe {
        signal = signal.with_timeframe(timeframe);
    }
    if let Some(notes) = &request.notes {
        signal = signal.with_notes(notes);
    }

    state.signals.upsert(&signal).await?;
    Ok(Json(signal))
}

pub async fn delete_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.signals.remove(&signal_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("signal {} not found", signal_id)))
    }
}
