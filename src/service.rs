// 🧾 Reconciliation Service - The only writer of events
//
// Validate → guard → append → re-fold, as one logical unit. The settlement
// guard and the insert run inside the same SQLite transaction, so two
// near-simultaneous settlements cannot both pass against one remaining
// debt. Returned balances are always re-derived from the durable log,
// never incremented counters.

use crate::engine::{self, InstrumentTotals, LedgerFilter, VehiclePending};
use crate::event::{Event, EventCandidate, ValidationError};
use crate::store;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

#[derive(Debug)]
pub enum LedgerError {
    /// Bad input shape. User-correctable; surfaced verbatim.
    Validation(ValidationError),

    /// Settlement guard: you cannot settle a debt that does not exist.
    /// A rejected operation, not a crash.
    PendingNotAllowed { vehicle: String, pending: f64 },

    /// Transient store failure. Callers get a generic retry message; the
    /// detail stays in the server log.
    Store(rusqlite::Error),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Validation(e) => write!(f, "{}", e),
            LedgerError::PendingNotAllowed { vehicle, pending } => write!(
                f,
                "vehicle {} has no pending balance to settle (current: {:.2})",
                vehicle, pending
            ),
            LedgerError::Store(_) => write!(f, "ledger store unavailable, please try again"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Validation(e) => Some(e),
            LedgerError::PendingNotAllowed { .. } => None,
            LedgerError::Store(e) => Some(e),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(e: ValidationError) -> Self {
        LedgerError::Validation(e)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Store(e)
    }
}

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

/// Result of a successful append: the stored event plus the vehicle's fresh
/// pending balance, re-folded from the log inside the same transaction.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub event: Event,
    pub pending_balance: f64,
}

/// One ledger query's answer: the selected events plus the aggregates the
/// dashboards show alongside them.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub events: Vec<Event>,
    pub total_amount: f64,
    pub instrument_totals: InstrumentTotals,
}

/// Shift close-out summary (the CLI `report` command).
#[derive(Debug, Clone, Serialize)]
pub struct ShiftReport {
    pub event_count: usize,
    pub total_amount: f64,
    pub instrument_totals: InstrumentTotals,
    pub cash_drawer: f64,
    pub pending_vehicles: Vec<VehiclePending>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ReconciliationService {
    db: Arc<Mutex<Connection>>,
    /// Bumped on every append; read-side pollers use it for freshness
    /// instead of blind periodic refetching.
    generation: AtomicU64,
}

impl ReconciliationService {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            generation: AtomicU64::new(0),
        }
    }

    /// Open (or create) the database file and prepare the schema.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        store::setup_database(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        store::setup_database(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// Validate, guard, append, and return the vehicle's new pending
    /// balance. Fails fast on validation errors with nothing written.
    ///
    /// The guard: a settlement (PENDING through a real instrument) is
    /// rejected when the vehicle's current pending balance is ≤ 0. The
    /// balance is recomputed inside the same transaction that inserts, so
    /// the check and the append commit atomically.
    pub fn record_event(
        &self,
        candidate: &EventCandidate,
        acting_worker: &str,
    ) -> Result<RecordOutcome, LedgerError> {
        let validated = candidate.validate()?;

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        if validated.is_pending_settlement() {
            let events = store::events_for_vehicle(&tx, &validated.vehicle)?;
            let pending = engine::pending_balance(&events);
            if pending <= 0.0 {
                // Dropping the transaction rolls back; nothing was written
                return Err(LedgerError::PendingNotAllowed {
                    vehicle: validated.vehicle.clone(),
                    pending,
                });
            }
        }

        let event = store::append_event(&tx, &validated, acting_worker)?;

        // Re-derive from the log (including the new row), never increment
        let events = store::events_for_vehicle(&tx, &validated.vehicle)?;
        let pending_balance = engine::pending_balance(&events);

        tx.commit()?;
        self.generation.fetch_add(1, Ordering::SeqCst);

        Ok(RecordOutcome {
            event,
            pending_balance,
        })
    }

    /// Signed pending balance for one vehicle, freshly folded. Used by the
    /// settlement guard and by read-only display queries alike.
    pub fn pending_balance(&self, vehicle: &str) -> Result<f64, LedgerError> {
        let conn = self.db.lock().unwrap();
        let events = store::events_for_vehicle(&conn, vehicle)?;
        Ok(engine::pending_balance(&events))
    }

    /// Vehicles that still owe money (worker settlement suggestions).
    pub fn pending_vehicles(&self) -> Result<Vec<VehiclePending>, LedgerError> {
        let conn = self.db.lock().unwrap();
        let events = store::all_events(&conn)?;
        Ok(engine::pending_vehicles(&events))
    }

    /// Filtered ledger view with the aggregates computed over exactly the
    /// selected events.
    pub fn ledger(
        &self,
        filter: &LedgerFilter,
        starting_cash: f64,
    ) -> Result<LedgerView, LedgerError> {
        let conn = self.db.lock().unwrap();
        let events = store::all_events(&conn)?;
        drop(conn);

        let selected = engine::filter_events(&events, filter);
        Ok(LedgerView {
            total_amount: engine::total_amount(&selected),
            instrument_totals: engine::instrument_totals(&selected, starting_cash),
            events: selected,
        })
    }

    /// Whole-log shift summary for close-out.
    pub fn shift_report(&self, starting_cash: f64) -> Result<ShiftReport, LedgerError> {
        let conn = self.db.lock().unwrap();
        let events = store::all_events(&conn)?;
        drop(conn);

        Ok(ShiftReport {
            event_count: events.len(),
            total_amount: engine::total_amount(&events),
            instrument_totals: engine::instrument_totals(&events, starting_cash),
            cash_drawer: engine::cash_drawer_balance(&events, starting_cash),
            pending_vehicles: engine::pending_vehicles(&events),
        })
    }

    /// Monotone change counter. A client that saw generation N only needs
    /// to refetch once the value moves past N.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TESTS
// ============================================================================
