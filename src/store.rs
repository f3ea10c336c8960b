// 🗄️ Ledger Store - Append-only SQLite event log
//
// One durable table of immutable events, WAL mode for crash recovery, no
// derived-state tables. The store offers exactly the contract the engine
// needs: append, query-by-vehicle, query-all in insertion order. Each
// append is a single INSERT, so it either fully succeeds or records
// nothing.

use crate::event::{normalize_vehicle, Event, EventCandidate, PaymentType, TransactionType};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Events Table (append-only; rowid is the insertion order)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_uuid TEXT UNIQUE NOT NULL,
            vehicle TEXT NOT NULL,
            worker TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            payment_type TEXT NOT NULL,
            amount REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_vehicle ON events(vehicle)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// APPEND
// ============================================================================

/// Append a validated event, assigning identity and timestamp now.
pub fn append_event(
    conn: &Connection,
    validated: &crate::event::ValidatedEvent,
    worker: &str,
) -> rusqlite::Result<Event> {
    append_event_at(conn, validated, worker, Utc::now())
}

/// Append with an explicit timestamp (backfill path).
pub fn append_event_at(
    conn: &Connection,
    validated: &crate::event::ValidatedEvent,
    worker: &str,
    created_at: DateTime<Utc>,
) -> rusqlite::Result<Event> {
    let event = Event {
        id: uuid::Uuid::new_v4().to_string(),
        vehicle: validated.vehicle.clone(),
        worker: worker.to_string(),
        transaction_type: validated.transaction_type,
        payment_type: validated.payment_type,
        amount: validated.amount,
        created_at,
    };

    conn.execute(
        "INSERT INTO events (
            event_uuid, vehicle, worker, transaction_type, payment_type, amount, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id,
            event.vehicle,
            event.worker,
            event.transaction_type.as_str(),
            event.payment_type.as_str(),
            event.amount,
            event.created_at.to_rfc3339(),
        ],
    )?;

    Ok(event)
}

// ============================================================================
// QUERIES
// ============================================================================

const EVENT_COLUMNS: &str =
    "event_uuid, vehicle, worker, transaction_type, payment_type, amount, created_at";

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let tx_raw: String = row.get(3)?;
    let pay_raw: String = row.get(4)?;
    let created_raw: String = row.get(6)?;

    let transaction_type = TransactionType::parse(&tx_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            Box::new(crate::event::ValidationError::UnknownEnumValue {
                field: "transaction_type",
                value: tx_raw.clone(),
            }),
        )
    })?;

    let payment_type = PaymentType::parse(&pay_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            Box::new(crate::event::ValidationError::UnknownEnumValue {
                field: "payment_type",
                value: pay_raw.clone(),
            }),
        )
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Event {
        id: row.get(0)?,
        vehicle: row.get(1)?,
        worker: row.get(2)?,
        transaction_type,
        payment_type,
        amount: row.get(5)?,
        created_at,
    })
}

/// All events for one vehicle, insertion order. The identifier is
/// normalized here as well, so lookups match no matter the caller's casing.
pub fn events_for_vehicle(conn: &Connection, vehicle: &str) -> rusqlite::Result<Vec<Event>> {
    let vehicle = normalize_vehicle(vehicle);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events WHERE vehicle = ?1 ORDER BY id",
        EVENT_COLUMNS
    ))?;

    let events = stmt
        .query_map(params![vehicle], |row| row_to_event(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Every event in the log, insertion order.
pub fn all_events(conn: &Connection) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events ORDER BY id",
        EVENT_COLUMNS
    ))?;

    let events = stmt
        .query_map([], |row| row_to_event(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_events(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
}

// ============================================================================
// CSV BACKFILL (legacy system export)
// ============================================================================

/// One row of the legacy export. Field names match the old system's wire
/// shape; payment strings may be the legacy aliases ("GPAY/PHONE PAY",
/// "EXP"), which validation accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvEventRow {
    #[serde(rename = "vehicleNumber")]
    pub vehicle: String,

    #[serde(rename = "worker", default)]
    pub worker: String,

    #[serde(rename = "transactionType")]
    pub transaction_type: String,

    #[serde(rename = "paymentType")]
    pub payment_type: String,

    #[serde(rename = "amount")]
    pub amount: String,

    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Vec<CsvEventRow>> {
    let mut rdr = csv::Reader::from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvEventRow = result.context("Failed to deserialize event row")?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<CsvEventRow>> {
    let file = std::fs::File::open(csv_path).context("Failed to open CSV file")?;
    read_csv(file)
}

/// Backfill legacy rows through the exact validation a live submission gets.
/// Invalid rows are reported and skipped; nothing is ever half-written.
pub fn import_events(conn: &Connection, rows: &[CsvEventRow]) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (index, row) in rows.iter().enumerate() {
        let candidate = EventCandidate {
            vehicle: Some(row.vehicle.clone()),
            transaction_type: Some(row.transaction_type.clone()),
            payment_type: Some(row.payment_type.clone()),
            amount: Some(row.amount.clone()),
        };

        let validated = match candidate.validate() {
            Ok(v) => v,
            Err(e) => {
                eprintln!("  ⚠ row {}: {}", index + 1, e);
                summary.skipped += 1;
                continue;
            }
        };

        // Preserve the legacy timestamp when present and parseable
        let created_at = if row.created_at.trim().is_empty() {
            Utc::now()
        } else {
            match DateTime::parse_from_rfc3339(row.created_at.trim()) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    eprintln!("  ⚠ row {}: bad createdAt: {}", index + 1, e);
                    summary.skipped += 1;
                    continue;
                }
            }
        };

        let worker = if row.worker.trim().is_empty() {
            "backfill"
        } else {
            row.worker.trim()
        };

        append_event_at(conn, &validated, worker, created_at)?;
        summary.imported += 1;
    }

    println!("✓ Imported: {} events", summary.imported);
    println!("✓ Skipped: {} rows", summary.skipped);

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ValidatedEvent;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn validated(vehicle: &str, tx: TransactionType, pay: PaymentType, amount: f64) -> ValidatedEvent {
        ValidatedEvent {
            vehicle: normalize_vehicle(vehicle),
            transaction_type: tx,
            payment_type: pay,
            amount,
        }
    }

    #[test]
    fn test_append_and_query_round_trip() {
        let conn = test_conn();

        let stored = append_event(
            &conn,
            &validated("TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            "ravi",
        )
        .unwrap();

        assert!(!stored.id.is_empty());

        let events = events_for_vehicle(&conn, "TN01AB1234").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, stored.id);
        assert_eq!(events[0].vehicle, "TN01AB1234");
        assert_eq!(events[0].worker, "ravi");
        assert_eq!(events[0].transaction_type, TransactionType::Pending);
        assert_eq!(events[0].payment_type, PaymentType::Pending);
        assert_eq!(events[0].amount, 100.0);
    }

    #[test]
    fn test_vehicle_lookup_is_case_insensitive() {
        let conn = test_conn();

        append_event(
            &conn,
            &validated("TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0),
            "ravi",
        )
        .unwrap();

        // Caller casing must not matter
        assert_eq!(events_for_vehicle(&conn, "tn01ab1234").unwrap().len(), 1);
        assert_eq!(events_for_vehicle(&conn, " Tn01Ab1234 ").unwrap().len(), 1);
        assert!(events_for_vehicle(&conn, "KA05CD9999").unwrap().is_empty());
    }

    #[test]
    fn test_all_events_insertion_order() {
        let conn = test_conn();

        for (i, vehicle) in ["TN01AB1234", "KA05CD9999", "TN01AB1234"].iter().enumerate() {
            append_event(
                &conn,
                &validated(vehicle, TransactionType::Cash, PaymentType::Cash, i as f64 + 1.0),
                "ravi",
            )
            .unwrap();
        }

        let events = all_events(&conn).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].amount, 1.0);
        assert_eq!(events[1].amount, 2.0);
        assert_eq!(events[2].amount, 3.0);
        assert_eq!(count_events(&conn).unwrap(), 3);
    }

    #[test]
    fn test_csv_import_validates_each_row() {
        let conn = test_conn();

        let csv = "\
vehicleNumber,worker,transactionType,paymentType,amount,createdAt
tn01ab1234,ravi,PENDING,PENDING,100,2025-06-01T08:00:00Z
TN01AB1234,ravi,PENDING,GPAY/PHONE PAY,40,2025-06-01T09:00:00Z
KA05CD9999,,CASH,CASH,not-a-number,2025-06-01T10:00:00Z
,ravi,CASH,CASH,30,2025-06-01T11:00:00Z
";
        let rows = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);

        let summary = import_events(&conn, &rows).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 2);

        // Legacy alias landed as the canonical instrument, timestamp kept
        let events = events_for_vehicle(&conn, "TN01AB1234").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payment_type, PaymentType::ElectronicTransfer);
        assert_eq!(
            events[0].created_at,
            DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }
}
