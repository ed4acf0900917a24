//! # REST API
//!
//! Builds the axum router that exposes the devnet vault over HTTP. Handlers
//! share state through axum's `State` extractor and call the vault
//! synchronously; every vault call is short and holds its lock only for
//! the duration of the call.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                         |
//! |--------|---------------------------------|-------------------------------------|
//! | GET    | `/health`                       | Liveness probe                      |
//! | GET    | `/status`                       | Node status summary                 |
//! | GET    | `/vault`                        | Vault summary: supply, TVL, price   |
//! | GET    | `/vault/balance/:account`       | Shares and withdraw cool-down       |
//! | GET    | `/vault/apr`                    | Weighted APR report                 |
//! | GET    | `/vault/events`                 | Drain the event journal             |
//! | GET    | `/vault/snapshot`               | Last persisted vault state          |
//! | GET    | `/vault/preview/withdraw/:shares` | Withdraw estimate                 |
//! | POST   | `/vault/preview/deposit`        | Deposit estimate                    |
//! | POST   | `/vault/deposit`                | Deposit assets, mint shares         |
//! | POST   | `/vault/withdraw`               | Burn shares, withdraw assets        |
//! | POST   | `/vault/transfer`               | Transfer shares                     |
//! | POST   | `/vault/hardwork`               | Run a harvest batch                 |
//! | POST   | `/vault/max-supply`             | Set the share supply cap            |
//! | POST   | `/vault/hardwork-on-deposit`    | Toggle harvest-before-deposit       |
//! | POST   | `/faucet`                       | Credit devnet test assets           |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use multivault_contracts::{
    AprReport, BatchReport, DepositPreview, DepositReceipt, HardWorkerError, VaultError,
    VaultEvent, VaultState, WithdrawPreview,
};
use multivault_protocol::{Address, Amount, AssetId};

use crate::devnet::Devnet;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub devnet: Arc<Devnet>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vault", get(vault_handler))
        .route("/vault/balance/:account", get(balance_handler))
        .route("/vault/apr", get(apr_handler))
        .route("/vault/events", get(events_handler))
        .route("/vault/snapshot", get(snapshot_handler))
        .route("/vault/preview/withdraw/:shares", get(preview_withdraw_handler))
        .route("/vault/preview/deposit", post(preview_deposit_handler))
        .route("/vault/deposit", post(deposit_handler))
        .route("/vault/withdraw", post(withdraw_handler))
        .route("/vault/transfer", post(transfer_handler))
        .route("/vault/hardwork", post(hard_work_handler))
        .route("/vault/max-supply", post(max_supply_handler))
        .route("/vault/hardwork-on-deposit", post(hard_work_on_deposit_handler))
        .route("/faucet", post(faucet_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /vault/deposit`. `assets` defaults to the strategy's own
/// asset list.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub caller: Address,
    #[serde(default)]
    pub assets: Option<Vec<AssetId>>,
    pub amounts: Vec<Amount>,
    #[serde(default)]
    pub min_shares_out: Amount,
    #[serde(default)]
    pub receiver: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewDepositRequest {
    #[serde(default)]
    pub assets: Option<Vec<AssetId>>,
    pub amounts: Vec<Amount>,
}

/// Body of `POST /vault/withdraw`. Omitting `shares` withdraws the
/// caller's whole balance.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub caller: Address,
    #[serde(default)]
    pub assets: Option<Vec<AssetId>>,
    #[serde(default)]
    pub shares: Option<Amount>,
    pub min_amounts: Vec<Amount>,
    #[serde(default)]
    pub receiver: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallerRequest {
    pub caller: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxSupplyRequest {
    pub caller: Address,
    /// Zero lifts the cap.
    pub max_supply: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HardWorkOnDepositRequest {
    pub caller: Address,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub account: Address,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    /// Current simulated block.
    pub block_height: u64,
    /// Block last recorded in the store.
    pub persisted_block: Option<u64>,
    pub vault: Address,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VaultInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub assets: Vec<AssetId>,
    pub underlying: Option<AssetId>,
    pub total_supply: Amount,
    pub max_supply: Amount,
    pub holders: usize,
    pub tvl: Amount,
    pub tvl_trusted: bool,
    /// USD per share, 18 decimals.
    pub share_price: Amount,
    pub price_trusted: bool,
    pub do_hard_work_on_deposit: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: Address,
    pub shares: Amount,
    pub last_activity: Option<u64>,
    /// First block at which the account may withdraw.
    pub withdrawable_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub assets: Vec<AssetId>,
    pub amounts: Vec<Amount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub account: Address,
    pub assets: Vec<AssetId>,
    pub amount: Amount,
}

/// Error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request: status code plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        Self::new(vault_error_status(&err), err.to_string())
    }
}

impl From<HardWorkerError> for ApiError {
    fn from(err: HardWorkerError) -> Self {
        let status = match &err {
            HardWorkerError::Unauthorized(_) => StatusCode::FORBIDDEN,
            HardWorkerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            HardWorkerError::VaultFailed { source, .. } => vault_error_status(source),
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn vault_error_status(err: &VaultError) -> StatusCode {
    use VaultError::*;
    match err {
        Unauthorized(_) => StatusCode::FORBIDDEN,
        ZeroAmount
        | LengthMismatch { .. }
        | AssetMismatch
        | ZeroInvestment
        | InsufficientInitialDeposit { .. }
        | InsufficientBalance { .. }
        | Bank(_) => StatusCode::BAD_REQUEST,
        SlippageExceeded { .. } | SharesSlippageExceeded { .. } | CapExceeded { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TooSoon { .. }
        | FuseTriggered
        | VaultNotActive(_)
        | InsufficientBalanceToPayHarvestCost { .. } => StatusCode::CONFLICT,
        Reentrancy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Call Bookkeeping
// ---------------------------------------------------------------------------

impl AppState {
    /// Times a vault call and counts reverts.
    fn call<T>(&self, op: impl FnOnce(&Devnet) -> Result<T, VaultError>) -> Result<T, ApiError> {
        let _timer = self.metrics.vault_call_latency_seconds.start_timer();
        op(self.devnet.as_ref()).map_err(|err| {
            self.metrics.reverted_calls_total.inc();
            tracing::debug!(error = %err, "vault call reverted");
            ApiError::from(err)
        })
    }

    /// Refreshes the TVL gauge and persists the ledger after a committed call.
    fn committed(&self) {
        if let Ok((tvl, _)) = self.devnet.vault.tvl() {
            self.metrics.set_tvl(tvl);
        }
        if let Err(e) = self.devnet.snapshot() {
            tracing::warn!(error = %e, "failed to persist vault snapshot");
        }
    }

    fn assets_or_default(&self, assets: Option<Vec<AssetId>>) -> Vec<AssetId> {
        assets.unwrap_or_else(|| self.devnet.assets().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; subsystem health belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let persisted_block = match state.devnet.store.last_block() {
        Ok(block) => block,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read persisted block");
            None
        }
    };
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        block_height: state.devnet.block_number(),
        persisted_block,
        vault: state.devnet.vault.address().clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn vault_handler(State(state): State<AppState>) -> ApiResult<VaultInfo> {
    let info = state.call(|net| {
        let vault = &net.vault;
        let snapshot = vault.state()?;
        let (tvl, tvl_trusted) = vault.tvl()?;
        let (share_price, price_trusted) = vault.price()?;
        Ok(VaultInfo {
            address: snapshot.address.clone(),
            name: snapshot.name.clone(),
            symbol: snapshot.symbol.clone(),
            assets: vault.assets()?,
            underlying: vault.underlying()?,
            total_supply: snapshot.ledger.total_supply(),
            max_supply: snapshot.ledger.max_supply(),
            holders: snapshot.ledger.holders().count(),
            tvl,
            tvl_trusted,
            share_price,
            price_trusted,
            do_hard_work_on_deposit: snapshot.do_hard_work_on_deposit,
        })
    })?;
    state.metrics.set_tvl(info.tvl);
    Ok(Json(info))
}

async fn balance_handler(
    Path(account): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<BalanceResponse> {
    let account = Address::new(account);
    let response = state.call(|net| {
        let snapshot = net.vault.state()?;
        Ok(BalanceResponse {
            shares: snapshot.ledger.balance_of(&account),
            last_activity: snapshot.guard.last_activity(&account),
            withdrawable_at: snapshot.guard.available_at(&account),
            account: account.clone(),
        })
    })?;
    Ok(Json(response))
}

async fn apr_handler(State(state): State<AppState>) -> ApiResult<AprReport> {
    Ok(Json(state.call(|net| net.vault.get_apr())?))
}

/// `GET /vault/events`. Drains the journal; each event is returned once.
async fn events_handler(State(state): State<AppState>) -> ApiResult<Vec<VaultEvent>> {
    Ok(Json(state.call(|net| net.vault.take_events())?))
}

async fn snapshot_handler(State(state): State<AppState>) -> ApiResult<VaultState> {
    let address = state.devnet.vault.address().clone();
    match state.devnet.store.get_vault::<VaultState>(&address) {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no snapshot stored for {address}"),
        )),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("store error: {e}"),
        )),
    }
}

async fn preview_withdraw_handler(
    Path(shares): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<WithdrawPreview> {
    let shares: Amount = shares.parse().map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, format!("invalid share amount: {shares}"))
    })?;
    Ok(Json(state.call(|net| net.vault.preview_withdraw(shares))?))
}

async fn preview_deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<PreviewDepositRequest>,
) -> ApiResult<DepositPreview> {
    let assets = state.assets_or_default(req.assets);
    Ok(Json(state.call(|net| {
        net.vault.preview_deposit_assets(&assets, &req.amounts)
    })?))
}

async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<DepositReceipt> {
    let assets = state.assets_or_default(req.assets);
    let receipt = state.call(|net| {
        net.vault.deposit_assets(
            &req.caller,
            &assets,
            &req.amounts,
            req.min_shares_out,
            req.receiver.as_ref(),
            net.env.as_ref(),
        )
    })?;
    state.metrics.deposits_total.inc();
    state.committed();
    Ok(Json(receipt))
}

async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<WithdrawResponse> {
    let assets = state.assets_or_default(req.assets);
    let amounts = state.call(|net| match req.shares {
        Some(shares) => net.vault.withdraw_assets(
            &req.caller,
            &assets,
            shares,
            &req.min_amounts,
            req.receiver.as_ref(),
            net.env.as_ref(),
        ),
        None => net
            .vault
            .withdraw_all(&req.caller, &assets, &req.min_amounts, net.env.as_ref()),
    })?;
    state.metrics.withdrawals_total.inc();
    state.committed();
    Ok(Json(WithdrawResponse { assets, amounts }))
}

async fn transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<StatusCode, ApiError> {
    state.call(|net| {
        net.vault
            .transfer(&req.from, &req.to, req.amount, net.env.as_ref())
    })?;
    state.committed();
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /vault/hardwork`. The caller must be one of the harvester's
/// dedicated servers or its relay.
async fn hard_work_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<BatchReport> {
    let report = {
        let _timer = state.metrics.vault_call_latency_seconds.start_timer();
        state.devnet.harvest(&req.caller)
    };
    match report {
        Ok(report) => {
            state.metrics.hard_works_total.inc_by(report.harvested.len() as u64);
            state.metrics.record_compensation(report.compensated_total);
            state.committed();
            Ok(Json(report))
        }
        Err(err) => {
            if matches!(err, HardWorkerError::VaultFailed { .. }) {
                state.metrics.hard_work_failures_total.inc();
            }
            Err(err.into())
        }
    }
}

async fn max_supply_handler(
    State(state): State<AppState>,
    Json(req): Json<MaxSupplyRequest>,
) -> Result<StatusCode, ApiError> {
    state.call(|net| net.vault.set_max_supply(&req.caller, req.max_supply))?;
    state.committed();
    Ok(StatusCode::NO_CONTENT)
}

async fn hard_work_on_deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<HardWorkOnDepositRequest>,
) -> Result<StatusCode, ApiError> {
    state.call(|net| {
        net.vault
            .set_do_hard_work_on_deposit(&req.caller, req.enabled)
    })?;
    state.committed();
    Ok(StatusCode::NO_CONTENT)
}

async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> ApiResult<FaucetResponse> {
    let amount = state.call(|net| net.faucet(&req.account))?;
    Ok(Json(FaucetResponse {
        account: req.account,
        assets: state.devnet.assets().to_vec(),
        amount,
    }))
}
