//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                 | Description                                  |
//! |--------|----------------------|----------------------------------------------|
//! | GET    | `/health`            | Liveness check                               |
//! | GET    | `/status`            | Owner, caps, reserves, counters              |
//! | GET    | `/accounts/:address` | Balance of one account                       |
//! | GET    | `/events`            | Event log page (`?since=N&limit=M`)          |
//! | POST   | `/deposit`           | Explicit deposit                             |
//! | POST   | `/withdraw`          | Withdrawal to an externally owned account    |
//! | POST   | `/`                  | Plain value transfer (receive / fallback)    |
//! | POST   | `/rpc`               | JSON-RPC 2.0 gateway (`kipu_<method>`)       |
//! | GET    | `/ws`                | WebSocket stream of vault events             |
//!
//! Amounts travel as decimal wei strings (`"50000000000000000"`) or with a
//! unit (`"0.05 ether"`); responses always use plain wei strings.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use kipu_contracts::{
    dispatch, CallData, CallOutput, DispatchError, ExternallyOwned, Message, PersonalVault,
    VaultCall, VaultError,
};
use kipu_protocol::config::MAX_EVENTS_PAGE;
use kipu_protocol::units::wei_string;
use kipu_protocol::{Address, VaultEvent, Wei};

use crate::metrics::SharedMetrics;

/// JSON-RPC methods are namespaced under this prefix.
pub const RPC_NAMESPACE: &str = "kipu_";

/// JSON-RPC error codes.
pub mod rpc_codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    /// The ledger refused the call.
    pub const LEDGER_REJECTED: i32 = -32000;
}

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted ledger. Never held across an `.await`.
    pub vault: Arc<Mutex<PersonalVault>>,
    /// Broadcast channel for committed vault events.
    pub event_tx: broadcast::Sender<VaultEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wraps a freshly deployed vault.
    pub fn new(
        version: String,
        vault: PersonalVault,
        event_tx: broadcast::Sender<VaultEvent>,
        metrics: SharedMetrics,
    ) -> Self {
        metrics.observe_ledger(vault.contract_balance(), vault.account_count());
        Self {
            version,
            vault: Arc::new(Mutex::new(vault)),
            event_tx,
            metrics,
        }
    }

    /// Runs one message against the ledger.
    ///
    /// Events committed by the call are published on `event_tx` and counted;
    /// refusals are counted by error name.
    pub fn execute(&self, message: Message) -> Result<CallOutput, DispatchError> {
        let timer = self.metrics.call_latency_seconds.start_timer();
        let (result, fresh, reserves, accounts) = {
            let mut vault = self.vault.lock();
            let cursor = vault.events().len();
            let result = dispatch(&mut vault, message, &mut ExternallyOwned);
            let fresh = vault.events_since(cursor).to_vec();
            (result, fresh, vault.contract_balance(), vault.account_count())
        };
        timer.observe_duration();

        for event in fresh {
            tracing::debug!(
                account = %event.account(),
                amount = %event.amount(),
                "publishing vault event"
            );
            match event {
                VaultEvent::DepositPerformed { .. } => self.metrics.deposits_total.inc(),
                VaultEvent::WithdrawalPerformed { .. } => self.metrics.withdrawals_total.inc(),
            }
            // No subscribers is fine.
            let _ = self.event_tx.send(event);
        }
        self.metrics.observe_ledger(reserves, accounts);

        if let Err(err) = &result {
            self.metrics
                .rejected_calls_total
                .with_label_values(&[error_name(err)])
                .inc();
            tracing::debug!(error = %err, "call rejected");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", post(receive_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/events", get(events_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named parameters: `from`, `value`, and the method's own arguments.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&DispatchError> for JsonRpcError {
    fn from(err: &DispatchError) -> Self {
        let code = match err {
            DispatchError::InvalidArguments { .. } => rpc_codes::INVALID_PARAMS,
            _ => rpc_codes::LEDGER_REJECTED,
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(error_details(err)),
        }
    }
}

/// Caller and value carried in every `kipu_*` call's params. `from` may
/// only be left out of read-only queries.
#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    from: Option<Address>,
    #[serde(default, with = "wei_string")]
    value: Wei,
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub from: Address,
    #[serde(with = "wei_string")]
    pub value: Wei,
}

/// Body of `POST /withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub from: Address,
    #[serde(with = "wei_string")]
    pub amount: Wei,
}

/// Body of `POST /`. `data` is optional hex call data.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub from: Address,
    #[serde(default, with = "wei_string")]
    pub value: Wei,
    #[serde(default)]
    pub data: Option<String>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    pub owner: Address,
    #[serde(with = "wei_string")]
    pub limit_per_tx: Wei,
    #[serde(with = "wei_string")]
    pub bank_cap: Wei,
    #[serde(with = "wei_string")]
    pub contract_balance: Wei,
    pub total_deposits: u64,
    pub total_withdrawals: u64,
    /// Accounts with a ledger entry.
    pub accounts: usize,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    #[serde(with = "wei_string")]
    pub balance: Wei,
}

/// Response payload for state-changing endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub account: Address,
    /// The account's balance after the call.
    #[serde(with = "wei_string")]
    pub balance: Wei,
    /// Vault reserves after the call.
    #[serde(with = "wei_string")]
    pub contract_balance: Wei,
    /// Data returned by the recipient of a withdrawal, `0x`-prefixed hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Query string of `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: usize,
    /// Page size, capped at [`MAX_EVENTS_PAGE`].
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Response payload for `GET /events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Cursor to pass as `since` on the next poll.
    pub next: usize,
    /// Whether events past `next` are already available.
    pub more: bool,
    pub events: Vec<VaultEvent>,
}

/// Error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error name, e.g. `BankCapExceeded`.
    pub error: String,
    pub message: String,
    /// Error fields, when the error has any.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// A REST failure: status code plus [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(error: &str, message: impl Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: error.to_string(),
                message: message.to_string(),
                details: Value::Null,
            },
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match &err {
            DispatchError::Vault(VaultError::InvalidAmount)
            | DispatchError::NonPayable(_)
            | DispatchError::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Vault(VaultError::Reentrancy) => StatusCode::CONFLICT,
            DispatchError::Vault(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            body: ErrorResponse {
                error: error_name(&err).to_string(),
                message: err.to_string(),
                details: error_details(&err),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Machine-readable name of a routing or ledger error.
fn error_name(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::Vault(e) => e.name(),
        DispatchError::NonPayable(_) => "NonPayable",
        DispatchError::InvalidArguments { .. } => "InvalidArguments",
    }
}

/// Error name plus its fields, amounts as decimal strings.
fn error_details(err: &DispatchError) -> Value {
    let name = error_name(err);
    match err {
        DispatchError::Vault(VaultError::BankCapExceeded { requested, cap }) => json!({
            "error": name,
            "requested": requested.to_string(),
            "cap": cap.to_string(),
        }),
        DispatchError::Vault(VaultError::ExceedsPerTxLimit { requested, limit }) => json!({
            "error": name,
            "requested": requested.to_string(),
            "limit": limit.to_string(),
        }),
        DispatchError::Vault(VaultError::InsufficientBalance { balance, requested }) => json!({
            "error": name,
            "balance": balance.to_string(),
            "requested": requested.to_string(),
        }),
        DispatchError::Vault(VaultError::TransactionFailed(data)) => json!({
            "error": name,
            "data": format!("0x{}", hex::encode(data)),
        }),
        DispatchError::NonPayable(method) => json!({ "error": name, "method": method }),
        DispatchError::InvalidArguments { method, reason } => json!({
            "error": name,
            "method": method,
            "reason": reason,
        }),
        _ => json!({ "error": name }),
    }
}

fn decode_call_data(raw: &str) -> Result<Vec<u8>, ApiError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex::decode(digits).map_err(|e| ApiError::bad_request("InvalidCallData", e))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /status` — ledger configuration and aggregates.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let vault = state.vault.lock();
    let config = vault.config();
    Json(StatusResponse {
        version: state.version.clone(),
        owner: config.owner,
        limit_per_tx: config.limit_per_tx,
        bank_cap: config.bank_cap,
        contract_balance: vault.contract_balance(),
        total_deposits: vault.total_deposits(),
        total_withdrawals: vault.total_withdrawals(),
        accounts: vault.account_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address` — balance of one account, zero if never seen.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::bad_request("InvalidAddress", e))?;
    let balance = state.vault.lock().balance_of(&address);
    Ok(Json(AccountResponse { address, balance }))
}

/// `GET /events?since=N&limit=M` — up to `M` committed events from
/// position `N` on.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<EventsResponse> {
    let limit = query.limit.unwrap_or(MAX_EVENTS_PAGE).min(MAX_EVENTS_PAGE);
    let vault = state.vault.lock();
    let pending = vault.events_since(query.since);
    let page = &pending[..limit.min(pending.len())];
    let next = vault.events().len() - pending.len() + page.len();
    Json(EventsResponse {
        next,
        more: page.len() < pending.len(),
        events: page.to_vec(),
    })
}

/// `POST /deposit` — the named `deposit` method.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    state.execute(Message::call(req.from, req.value, VaultCall::Deposit))?;
    Ok(Json(operation_response(&state, req.from, None)))
}

/// `POST /withdraw` — withdraw to the caller, an externally owned account.
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let output = state.execute(Message::call(
        req.from,
        0,
        VaultCall::Withdraw { amount: req.amount },
    ))?;
    let data = match output {
        CallOutput::Bytes(bytes) => Some(format!("0x{}", hex::encode(bytes))),
        _ => None,
    };
    Ok(Json(operation_response(&state, req.from, data)))
}

/// `POST /` — a value transfer with optional raw call data.
///
/// Empty data is a plain receive; anything else is a fallback call. Both
/// end in a deposit.
async fn receive_handler(
    State(state): State<AppState>,
    Json(req): Json<ReceiveRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let data = match req.data.as_deref().map(decode_call_data).transpose()? {
        Some(bytes) if !bytes.is_empty() => CallData::Unrecognized(bytes),
        _ => CallData::Empty,
    };
    state.execute(Message {
        sender: req.from,
        value: req.value,
        data,
    })?;
    Ok(Json(operation_response(&state, req.from, None)))
}

fn operation_response(state: &AppState, account: Address, data: Option<String>) -> OperationResponse {
    let vault = state.vault.lock();
    OperationResponse {
        account,
        balance: vault.balance_of(&account),
        contract_balance: vault.contract_balance(),
        data,
    }
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// `kipu_<method>` maps onto the vault's method names. Unknown names inside
/// the namespace are fallback calls; names outside it return -32601.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::failure(
            req.id,
            JsonRpcError::new(
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ),
        ));
    }

    let response = match rpc_call(&state, &req.method, req.params) {
        Ok(result) => JsonRpcResponse::success(req.id, result),
        Err(error) => JsonRpcResponse::failure(req.id, error),
    };
    Json(response)
}

fn rpc_call(state: &AppState, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let Some(name) = method.strip_prefix(RPC_NAMESPACE) else {
        return Err(JsonRpcError::new(
            rpc_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        ));
    };

    let params = match params {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(obj @ Value::Object(_)) => obj,
        Some(_) => {
            return Err(JsonRpcError::new(
                rpc_codes::INVALID_PARAMS,
                "Invalid params: expected an object",
            ))
        }
    };
    let envelope = RpcEnvelope::deserialize(&params).map_err(|e| {
        JsonRpcError::new(rpc_codes::INVALID_PARAMS, format!("Invalid params: {}", e))
    })?;

    let data = match VaultCall::from_method(name, &params) {
        Ok(Some(call)) => CallData::Call(call),
        Ok(None) => CallData::Unrecognized(name.as_bytes().to_vec()),
        Err(err) => return Err(JsonRpcError::from(&err)),
    };
    let sender = match envelope.from {
        Some(from) => from,
        None if moves_value(&data) => {
            return Err(JsonRpcError::new(
                rpc_codes::INVALID_PARAMS,
                format!("Invalid params: {} requires `from`", method),
            ))
        }
        // Queries ignore the caller.
        None => Address::ZERO,
    };

    state
        .execute(Message {
            sender,
            value: envelope.value,
            data,
        })
        .map(|output| output.to_json())
        .map_err(|err| JsonRpcError::from(&err))
}

/// Whether `data` can credit or debit the caller.
fn moves_value(data: &CallData) -> bool {
    match data {
        CallData::Call(call) => matches!(call, VaultCall::Deposit | VaultCall::Withdraw { .. }),
        CallData::Empty | CallData::Unrecognized(_) => true,
    }
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive one JSON-encoded [`VaultEvent`] per committed deposit or
/// withdrawal. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Forwards broadcast events until the client disconnects or the channel
/// is closed.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = state.event_tx.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
