// Toll Ledger - REST API Server
//
// Transport-shaped mirror of the reconciliation service. Validation and
// guard errors carry a specific, actionable message; store failures get a
// generic retry message with the detail kept in the server log. Clients
// poll /api/changes (long-poll with a configurable timeout) instead of the
// old hard-coded refetch loop.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use toll_ledger::{
    normalize_vehicle, round2, EventCandidate, LedgerError, LedgerFilter, ReconciliationService,
    SortOrder, VehiclePending,
};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<ReconciliationService>,
    changes: Arc<watch::Sender<u64>>,
    poll_timeout: Duration,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Map a service error to a status + user-visible message. Store internals
/// go to the log, never to the caller.
fn error_response(err: &LedgerError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::PendingNotAllowed { .. } => StatusCode::CONFLICT,
        LedgerError::Store(detail) => {
            eprintln!("Store error: {}", detail);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::err(err.to_string())))
}

// ============================================================================
// Request / Response shapes
// ============================================================================

#[derive(Deserialize)]
struct RecordRequest {
    #[serde(default)]
    worker: Option<String>,
    #[serde(default)]
    vehicle: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    payment_type: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Serialize)]
struct RecordResponse {
    event: toll_ledger::Event,
    pending_balance: f64,
}

#[derive(Deserialize)]
struct LedgerQuery {
    #[serde(default)]
    vehicle: Option<String>,
    #[serde(default)]
    payment_type: Option<toll_ledger::PaymentType>,
    #[serde(default)]
    worker: Option<String>,
    #[serde(default)]
    from: Option<NaiveDate>,
    #[serde(default)]
    to: Option<NaiveDate>,
    #[serde(default)]
    sort: Option<SortOrder>,
    #[serde(default)]
    starting_cash: Option<f64>,
}

#[derive(Serialize)]
struct PendingResponse {
    vehicle: String,
    pending_balance: f64,
}

#[derive(Deserialize)]
struct ChangesQuery {
    #[serde(default)]
    since: Option<u64>,
}

#[derive(Serialize)]
struct ChangesResponse {
    generation: u64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/transactions - Record an event and return the fresh balance
async fn record_transaction(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> impl IntoResponse {
    // Worker identity comes from the (external) shift service; here it
    // rides in the body and is trusted as given.
    let worker = match request.worker.as_deref().map(str::trim) {
        Some(w) if !w.is_empty() => w.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::err("missing required field: worker".to_string())),
            )
                .into_response()
        }
    };

    let candidate = EventCandidate {
        vehicle: request.vehicle,
        transaction_type: request.transaction_type,
        payment_type: request.payment_type,
        amount: request.amount,
    };

    match state.service.record_event(&candidate, &worker) {
        Ok(outcome) => {
            // Wake long-pollers
            let _ = state.changes.send(state.service.generation());

            let response = RecordResponse {
                event: outcome.event,
                pending_balance: round2(outcome.pending_balance),
            };
            (StatusCode::CREATED, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/transactions - Filtered ledger view with aggregates
async fn get_ledger(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> impl IntoResponse {
    let filter = LedgerFilter {
        vehicle: query.vehicle,
        payment_type: query.payment_type,
        worker: query.worker,
        from: query.from,
        to: query.to,
        sort: query.sort.unwrap_or_default(),
    };
    let starting_cash = query.starting_cash.unwrap_or(0.0);

    match state.service.ledger(&filter, starting_cash) {
        Ok(view) => (StatusCode::OK, Json(ApiResponse::ok(view))).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/transactions/pending/:vehicle - Signed pending balance
async fn get_pending(
    State(state): State<AppState>,
    Path(vehicle): Path<String>,
) -> impl IntoResponse {
    // Registrations may contain spaces; decode before normalizing
    let decoded = urlencoding::decode(&vehicle)
        .unwrap_or_else(|_| vehicle.clone().into())
        .into_owned();

    match state.service.pending_balance(&decoded) {
        Ok(balance) => {
            let response = PendingResponse {
                vehicle: normalize_vehicle(&decoded),
                // Signed: worker-facing clients clamp, owner-facing show as-is
                pending_balance: round2(balance),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/transactions/vehicles/pending - Settlement suggestion list
async fn get_pending_vehicles(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.pending_vehicles() {
        Ok(rows) => {
            let rows: Vec<VehiclePending> = rows
                .into_iter()
                .map(|row| VehiclePending {
                    pending: round2(row.pending),
                    ..row
                })
                .collect();
            (StatusCode::OK, Json(ApiResponse::ok(rows))).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/changes?since=N - Ledger change feed
///
/// With `since`, blocks until the generation moves past it or the poll
/// timeout elapses; without it, returns the current generation immediately
/// (plain polling still works).
async fn get_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> impl IntoResponse {
    if let Some(since) = query.since {
        if state.service.generation() <= since {
            let mut rx = state.changes.subscribe();
            let _ = tokio::time::timeout(state.poll_timeout, async {
                loop {
                    if *rx.borrow_and_update() > since {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        }
    }

    Json(ApiResponse::ok(ChangesResponse {
        generation: state.service.generation(),
    }))
}

// ============================================================================
// Main Server
// ============================================================================

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    println!("🌐 Toll Ledger - API Server v{}", toll_ledger::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = env_or("TOLL_LEDGER_DB", "toll-ledger.db");
    let addr = env_or("TOLL_LEDGER_ADDR", "0.0.0.0:3000");
    let poll_timeout_secs: u64 = env_or("TOLL_LEDGER_POLL_TIMEOUT_SECS", "25")
        .parse()
        .expect("TOLL_LEDGER_POLL_TIMEOUT_SECS must be a number");

    let service = ReconciliationService::open(std::path::Path::new(&db_path))
        .expect("Failed to open database");
    println!("✓ Database opened: {}", db_path);

    let (changes, _rx) = watch::channel(service.generation());

    let state = AppState {
        service: Arc::new(service),
        changes: Arc::new(changes),
        poll_timeout: Duration::from_secs(poll_timeout_secs),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", post(record_transaction).get(get_ledger))
        .route("/transactions/pending/:vehicle", get(get_pending))
        .route("/transactions/vehicles/pending", get(get_pending_vehicles))
        .route("/changes", get(get_changes))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", addr);
    println!("   POST /api/transactions");
    println!("   GET  /api/transactions");
    println!("   GET  /api/transactions/pending/:vehicle");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
