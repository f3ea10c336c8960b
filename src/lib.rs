// Toll Ledger - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod engine;
pub mod event;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use engine::{
    cash_drawer_balance, display_pending, filter_events, instrument_totals, pending_balance,
    pending_balances, pending_delta, pending_vehicles, round2, total_amount, Audience,
    InstrumentTotals, LedgerFilter, SortOrder, VehiclePending,
};
pub use event::{
    normalize_vehicle, Event, EventCandidate, PaymentType, TransactionType, ValidatedEvent,
    ValidationError,
};
pub use service::{LedgerError, LedgerView, RecordOutcome, ReconciliationService, ShiftReport};
pub use store::{
    all_events, append_event, count_events, events_for_vehicle, import_events, load_csv, read_csv,
    setup_database, CsvEventRow, ImportSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
