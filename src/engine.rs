// ⚖️ Balance Engine - Pure folds over the event log
//
// Nothing here touches the store and nothing here is cached: every aggregate
// is recomputed from the events it is handed. That is the core correctness
// guarantee of the system - stored totals can never drift from the source
// events, because there are no stored totals.
//
// All folds are defined only over already-validated events and are
// order-independent, so concurrent appends plus re-folds can never produce
// an aggregate inconsistent with the log.

use crate::event::{Event, PaymentType, TransactionType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Round for display/serialization only. Accumulation stays full-precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// PENDING BALANCE
// ============================================================================

/// Contribution of one event to its vehicle's pending balance.
///
/// - PENDING through the PENDING instrument: a new unpaid charge, +amount
/// - PENDING through a real instrument: a debt being settled, -amount
/// - anything else: does not touch the pending balance
pub fn pending_delta(event: &Event) -> f64 {
    if event.is_pending_accrual() {
        event.amount
    } else if event.is_pending_settlement() {
        -event.amount
    } else {
        0.0
    }
}

/// Outstanding balance over one vehicle's events. May be negative
/// (over-settlement); the engine never clamps, callers decide per audience.
pub fn pending_balance(events: &[Event]) -> f64 {
    events.iter().map(pending_delta).sum()
}

/// The same fold, grouped by (already normalized) vehicle identifier.
pub fn pending_balances(events: &[Event]) -> HashMap<String, f64> {
    let mut balances: HashMap<String, f64> = HashMap::new();
    for event in events {
        *balances.entry(event.vehicle.clone()).or_insert(0.0) += pending_delta(event);
    }
    balances
}

/// One row of the worker's settlement-suggestion list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePending {
    pub vehicle: String,
    pub pending: f64,
}

/// Vehicles that still owe money, largest debt first.
pub fn pending_vehicles(events: &[Event]) -> Vec<VehiclePending> {
    let mut rows: Vec<VehiclePending> = pending_balances(events)
        .into_iter()
        .filter(|(_, pending)| round2(*pending) > 0.0)
        .map(|(vehicle, pending)| VehiclePending { vehicle, pending })
        .collect();

    rows.sort_by(|a, b| {
        b.pending
            .partial_cmp(&a.pending)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.vehicle.cmp(&b.vehicle))
    });
    rows
}

// ============================================================================
// INSTRUMENT TOTALS
// ============================================================================

/// Signed running total per payment instrument over a selected event set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentTotals {
    pub cash: f64,
    pub electronic_transfer: f64,
    pub pending: f64,
    pub expense: f64,
}

impl InstrumentTotals {
    pub fn get(&self, instrument: PaymentType) -> f64 {
        match instrument {
            PaymentType::Cash => self.cash,
            PaymentType::ElectronicTransfer => self.electronic_transfer,
            PaymentType::Pending => self.pending,
            PaymentType::Expense => self.expense,
        }
    }

    fn bucket_mut(&mut self, instrument: PaymentType) -> &mut f64 {
        match instrument {
            PaymentType::Cash => &mut self.cash,
            PaymentType::ElectronicTransfer => &mut self.electronic_transfer,
            PaymentType::Pending => &mut self.pending,
            PaymentType::Expense => &mut self.expense,
        }
    }
}

/// Fold a set of events into per-instrument totals.
///
/// Canonical rule: every event credits the bucket named by its payment type;
/// a pending settlement ADDITIONALLY debits the PENDING bucket. Consequence:
/// the PENDING bucket over any event set equals the sum of per-vehicle
/// pending balances over the same set. The two legacy dashboards disagreed
/// on this; this rule is applied uniformly everywhere.
///
/// `starting_cash` is the shift's opening float, added once to CASH as a
/// constant offset - it is supplied externally, never derived from events.
pub fn instrument_totals(events: &[Event], starting_cash: f64) -> InstrumentTotals {
    let mut totals = InstrumentTotals::default();
    totals.cash += starting_cash;

    for event in events {
        *totals.bucket_mut(event.payment_type) += event.amount;
        if event.is_pending_settlement() {
            totals.pending -= event.amount;
        }
    }
    totals
}

/// Physical cash in the drawer: opening float, plus everything paid in cash,
/// minus cash-lane charges whose money moved through another instrument.
pub fn cash_drawer_balance(events: &[Event], starting_cash: f64) -> f64 {
    events.iter().fold(starting_cash, |cash, event| {
        if event.transaction_type == TransactionType::Cash
            && event.payment_type != PaymentType::Cash
        {
            cash - event.amount
        } else if event.payment_type == PaymentType::Cash {
            cash + event.amount
        } else {
            cash
        }
    })
}

/// Gross sum over a selected event set (the ledger table footer).
pub fn total_amount(events: &[Event]) -> f64 {
    events.iter().map(|event| event.amount).sum()
}

// ============================================================================
// FILTERING & SORTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[default]
    #[serde(rename = "desc")]
    Descending,
}

/// Ledger search predicates. All independently optional, combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerFilter {
    /// Case-insensitive substring match on the vehicle registration.
    #[serde(default)]
    pub vehicle: Option<String>,

    /// Exact instrument match.
    #[serde(default)]
    pub payment_type: Option<PaymentType>,

    /// Case-insensitive substring match on the recording worker.
    #[serde(default)]
    pub worker: Option<String>,

    /// Inclusive start of the created_at date range.
    #[serde(default)]
    pub from: Option<NaiveDate>,

    /// Inclusive end of the created_at date range, treated as end-of-day.
    #[serde(default)]
    pub to: Option<NaiveDate>,

    #[serde(default)]
    pub sort: SortOrder,
}

impl LedgerFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(vehicle) = &self.vehicle {
            let needle = vehicle.trim().to_uppercase();
            if !needle.is_empty() && !event.vehicle.contains(&needle) {
                return false;
            }
        }

        if let Some(payment_type) = self.payment_type {
            if event.payment_type != payment_type {
                return false;
            }
        }

        if let Some(worker) = &self.worker {
            let needle = worker.trim().to_lowercase();
            if !needle.is_empty() && !event.worker.to_lowercase().contains(&needle) {
                return false;
            }
        }

        let event_date = event.created_at.date_naive();
        if let Some(from) = self.from {
            if event_date < from {
                return false;
            }
        }
        // "to" is inclusive through end-of-day, so compare dates only
        if let Some(to) = self.to {
            if event_date > to {
                return false;
            }
        }

        true
    }
}

/// Filter then sort by created_at. The sort is stable, so events with equal
/// timestamps keep their insertion order in either direction.
pub fn filter_events(events: &[Event], filter: &LedgerFilter) -> Vec<Event> {
    let mut selected: Vec<Event> = events
        .iter()
        .filter(|event| filter.matches(event))
        .cloned()
        .collect();

    match filter.sort {
        SortOrder::Ascending => selected.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::Descending => selected.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    selected
}

// ============================================================================
// DISPLAY POLICY
// ============================================================================

/// Who is looking at a pending balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Worker-facing views clamp negatives to zero.
    Worker,
    /// Owner-facing views show the signed value, over-settlement included.
    Owner,
}

/// Both audiences derive from the same unclamped fold; only the display
/// differs. The engine itself never clamps.
pub fn display_pending(balance: f64, audience: Audience) -> f64 {
    match audience {
        Audience::Worker => round2(balance.max(0.0)),
        Audience::Owner => round2(balance),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::normalize_vehicle;
    use chrono::{Duration, TimeZone, Utc};

    /// Build a test event the way the service would: normalized vehicle,
    /// timestamps spaced by insertion order.
    fn event(
        seq: i64,
        vehicle: &str,
        tx: TransactionType,
        pay: PaymentType,
        amount: f64,
    ) -> Event {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        Event {
            id: format!("evt-{}", seq),
            vehicle: normalize_vehicle(vehicle),
            worker: "ravi".to_string(),
            transaction_type: tx,
            payment_type: pay,
            amount,
            created_at: base + Duration::seconds(seq),
        }
    }

    #[test]
    fn test_basic_accrual_and_settlement() {
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            event(1, "TN01AB1234", TransactionType::Pending, PaymentType::Cash, 40.0),
        ];

        assert_eq!(pending_balance(&events), 60.0);
    }

    #[test]
    fn test_non_pending_events_are_neutral() {
        let mut events = vec![event(
            0,
            "TN01AB1234",
            TransactionType::Pending,
            PaymentType::Pending,
            60.0,
        )];
        assert_eq!(pending_balance(&events), 60.0);

        // A cash-lane toll and a bank-channel toll leave pending untouched
        events.push(event(1, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0));
        events.push(event(
            2,
            "TN01AB1234",
            TransactionType::AxisBank,
            PaymentType::ElectronicTransfer,
            120.0,
        ));
        assert_eq!(pending_balance(&events), 60.0);
    }

    #[test]
    fn test_pending_balance_is_order_independent() {
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            event(1, "TN01AB1234", TransactionType::Pending, PaymentType::Cash, 40.0),
            event(2, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 25.0),
            event(3, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0),
        ];
        let expected = pending_balance(&events);

        // Every rotation and the full reversal must agree
        let mut rotated = events.clone();
        for _ in 0..events.len() {
            rotated.rotate_left(1);
            assert_eq!(pending_balance(&rotated), expected);
        }
        let reversed: Vec<Event> = events.iter().rev().cloned().collect();
        assert_eq!(pending_balance(&reversed), expected);
    }

    #[test]
    fn test_over_settlement_goes_negative() {
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 50.0),
            event(1, "TN01AB1234", TransactionType::Pending, PaymentType::ElectronicTransfer, 80.0),
        ];

        let balance = pending_balance(&events);
        assert_eq!(balance, -30.0);

        // Same fold, two displays
        assert_eq!(display_pending(balance, Audience::Worker), 0.0);
        assert_eq!(display_pending(balance, Audience::Owner), -30.0);
    }

    #[test]
    fn test_case_insensitive_vehicle_grouping() {
        // Identifiers arrive normalized; mixed-case submissions for the same
        // plate land in one bucket
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            event(1, "tn01ab1234", TransactionType::Pending, PaymentType::Cash, 40.0),
        ];

        let balances = pending_balances(&events);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances["TN01AB1234"], 60.0);
    }

    #[test]
    fn test_pending_vehicles_excludes_settled_and_sorts() {
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            event(1, "KA05CD9999", TransactionType::Pending, PaymentType::Pending, 250.0),
            event(2, "MH12EF0001", TransactionType::Pending, PaymentType::Pending, 80.0),
            event(3, "MH12EF0001", TransactionType::Pending, PaymentType::Cash, 80.0),
        ];

        let rows = pending_vehicles(&events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].vehicle, "KA05CD9999");
        assert_eq!(rows[0].pending, 250.0);
        assert_eq!(rows[1].vehicle, "TN01AB1234");
    }

    #[test]
    fn test_instrument_totals_rule() {
        let events = vec![
            // Accrual: 100 into PENDING
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            // Settlement: 40 into CASH, 40 out of PENDING
            event(1, "TN01AB1234", TransactionType::Pending, PaymentType::Cash, 40.0),
            // Plain cash-lane toll: 30 into CASH
            event(2, "KA05CD9999", TransactionType::Cash, PaymentType::Cash, 30.0),
            // Bank toll paid by transfer: 120 into ELECTRONIC_TRANSFER
            event(3, "KA05CD9999", TransactionType::HdfcBank, PaymentType::ElectronicTransfer, 120.0),
            // Expense write-off settling debt: 10 into EXPENSE, 10 out of PENDING
            event(4, "TN01AB1234", TransactionType::Pending, PaymentType::Expense, 10.0),
        ];

        let totals = instrument_totals(&events, 0.0);
        assert_eq!(totals.cash, 70.0);
        assert_eq!(totals.electronic_transfer, 120.0);
        assert_eq!(totals.expense, 10.0);
        assert_eq!(totals.pending, 50.0);
    }

    #[test]
    fn test_pending_bucket_matches_vehicle_balances() {
        // The canonical rule makes the PENDING bucket equal the summed
        // per-vehicle balances, for any event set
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Pending, PaymentType::Pending, 100.0),
            event(1, "KA05CD9999", TransactionType::Pending, PaymentType::Pending, 75.0),
            event(2, "TN01AB1234", TransactionType::Pending, PaymentType::Cash, 40.0),
            event(3, "KA05CD9999", TransactionType::Pending, PaymentType::ElectronicTransfer, 100.0),
            event(4, "MH12EF0001", TransactionType::OthersFastag, PaymentType::Expense, 60.0),
        ];

        let totals = instrument_totals(&events, 0.0);
        let summed: f64 = pending_balances(&events).values().sum();
        assert!((totals.pending - summed).abs() < 1e-9);
        assert_eq!(totals.pending, 35.0);
    }

    #[test]
    fn test_starting_cash_is_a_constant_offset() {
        let events = vec![event(
            0,
            "TN01AB1234",
            TransactionType::Cash,
            PaymentType::Cash,
            30.0,
        )];

        let totals = instrument_totals(&events, 500.0);
        assert_eq!(totals.cash, 530.0);
        // Only CASH sees the float
        assert_eq!(totals.electronic_transfer, 0.0);
        assert_eq!(totals.pending, 0.0);
    }

    #[test]
    fn test_cash_drawer_balance() {
        let events = vec![
            // Paid in cash: +30
            event(0, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0),
            // Cash-lane charge but money moved by transfer: -45 from drawer
            event(1, "KA05CD9999", TransactionType::Cash, PaymentType::ElectronicTransfer, 45.0),
            // Settlement received in cash: +40
            event(2, "MH12EF0001", TransactionType::Pending, PaymentType::Cash, 40.0),
            // Transfer through a bank channel never touches the drawer
            event(3, "MH12EF0001", TransactionType::AxisBank, PaymentType::ElectronicTransfer, 100.0),
        ];

        assert_eq!(cash_drawer_balance(&events, 500.0), 525.0);
    }

    #[test]
    fn test_empty_input_yields_zero_aggregates() {
        assert_eq!(pending_balance(&[]), 0.0);
        assert!(pending_balances(&[]).is_empty());
        assert!(pending_vehicles(&[]).is_empty());
        assert_eq!(instrument_totals(&[], 0.0), InstrumentTotals::default());
        assert_eq!(total_amount(&[]), 0.0);
        assert!(filter_events(&[], &LedgerFilter::default()).is_empty());
    }

    #[test]
    fn test_filter_conjunction() {
        let events = vec![
            event(0, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0),
            event(1, "TN01AB1234", TransactionType::HdfcBank, PaymentType::ElectronicTransfer, 120.0),
            event(2, "KA05CD9999", TransactionType::Cash, PaymentType::Cash, 55.0),
        ];

        // vehicle substring AND payment type must both hold
        let filter = LedgerFilter {
            vehicle: Some("ab12".to_string()),
            payment_type: Some(PaymentType::Cash),
            ..LedgerFilter::default()
        };
        let hits = filter_events(&events, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "evt-0");

        // worker substring is case-insensitive too
        let filter = LedgerFilter {
            worker: Some("RAV".to_string()),
            ..LedgerFilter::default()
        };
        assert_eq!(filter_events(&events, &filter).len(), 3);
    }

    #[test]
    fn test_filter_date_range_inclusive_end_of_day() {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let mut late = event(0, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 30.0);
        late.created_at = Utc.with_ymd_and_hms(2025, 6, 3, 23, 45, 0).unwrap();
        let mut early = event(1, "KA05CD9999", TransactionType::Cash, PaymentType::Cash, 55.0);
        early.created_at = base;

        let events = vec![late.clone(), early];

        // "to" of June 3rd still includes the 23:45 event
        let filter = LedgerFilter {
            from: Some(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()),
            to: Some(NaiveDate::from_ymd_opt(2025, 6, 3).unwrap()),
            ..LedgerFilter::default()
        };
        let hits = filter_events(&events, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, late.id);
    }

    #[test]
    fn test_sort_default_descending_and_stable_ties() {
        let a = event(0, "TN01AB1234", TransactionType::Cash, PaymentType::Cash, 10.0);
        let mut b = event(1, "KA05CD9999", TransactionType::Cash, PaymentType::Cash, 20.0);
        let c = event(2, "MH12EF0001", TransactionType::Cash, PaymentType::Cash, 30.0);
        // a and b share a timestamp; insertion order must survive the sort
        b.created_at = a.created_at;

        let events = vec![a.clone(), b.clone(), c.clone()];

        let newest_first = filter_events(&events, &LedgerFilter::default());
        assert_eq!(newest_first[0].id, c.id);
        assert_eq!(newest_first[1].id, a.id);
        assert_eq!(newest_first[2].id, b.id);

        let oldest_first = filter_events(
            &events,
            &LedgerFilter {
                sort: SortOrder::Ascending,
                ..LedgerFilter::default()
            },
        );
        assert_eq!(oldest_first[0].id, a.id);
        assert_eq!(oldest_first[1].id, b.id);
        assert_eq!(oldest_first[2].id, c.id);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(59.999999), 60.0);
        assert_eq!(round2(10.004), 10.0);
        assert_eq!(round2(10.006), 10.01);
    }
}
