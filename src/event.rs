// 🎫 Event Model - Canonical transaction shape + validation
//
// Every recorded toll event carries two classification axes:
// - transaction type: the CHANNEL the charge ran through (a bank/FASTag
//   channel, the site's own CASH lane, or PENDING = "owed, not settled")
// - payment type: how money ACTUALLY moved (cash, transfer, pending, expense)
//
// The sign of an amount is always derived from the combination of both axes,
// never from the payment type alone. The enums below are the single source
// of truth for the recognized sets; client and server validate against the
// same lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

/// Channel through which a toll charge was incurred or fulfilled.
///
/// The bank/FASTag variants are the deployment's settlement channels.
/// `Pending` and `Cash` are distinguished: `Pending` marks an amount owed
/// (or a later settlement of one), `Cash` marks the site's own cash lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "IDFC FIRST BANK")]
    IdfcFirstBank,
    #[serde(rename = "STATE BANK OF INDIA(SBI)")]
    StateBankOfIndia,
    #[serde(rename = "AIRTEL PAYMENTS BANK")]
    AirtelPaymentsBank,
    #[serde(rename = "ICICI BANK")]
    IciciBank,
    #[serde(rename = "INDUSIND BANK")]
    IndusindBank,
    #[serde(rename = "KOTAK MAHINDRA BANK")]
    KotakMahindraBank,
    #[serde(rename = "EQUITAS BANK")]
    EquitasBank,
    #[serde(rename = "AXIS BANK")]
    AxisBank,
    #[serde(rename = "HDFC BANK")]
    HdfcBank,
    #[serde(rename = "BANK OF BARODA")]
    BankOfBaroda,
    #[serde(rename = "IDBI BANK")]
    IdbiBank,
    // "FEDRAL" is the spelling the field devices send; keep it on the wire.
    #[serde(rename = "FEDRAL BANK")]
    FedralBank,
    #[serde(rename = "BAJAJ PAY")]
    BajajPay,
    #[serde(rename = "LIVQUIK FASTAG")]
    LivquikFastag,
    #[serde(rename = "OTHERS FASTAG")]
    OthersFastag,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "CASH")]
    Cash,
}

impl TransactionType {
    /// All recognized channels, in the order the worker form lists them.
    pub const ALL: [TransactionType; 17] = [
        TransactionType::IdfcFirstBank,
        TransactionType::StateBankOfIndia,
        TransactionType::AirtelPaymentsBank,
        TransactionType::IciciBank,
        TransactionType::IndusindBank,
        TransactionType::KotakMahindraBank,
        TransactionType::EquitasBank,
        TransactionType::AxisBank,
        TransactionType::HdfcBank,
        TransactionType::BankOfBaroda,
        TransactionType::IdbiBank,
        TransactionType::FedralBank,
        TransactionType::BajajPay,
        TransactionType::LivquikFastag,
        TransactionType::OthersFastag,
        TransactionType::Pending,
        TransactionType::Cash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::IdfcFirstBank => "IDFC FIRST BANK",
            TransactionType::StateBankOfIndia => "STATE BANK OF INDIA(SBI)",
            TransactionType::AirtelPaymentsBank => "AIRTEL PAYMENTS BANK",
            TransactionType::IciciBank => "ICICI BANK",
            TransactionType::IndusindBank => "INDUSIND BANK",
            TransactionType::KotakMahindraBank => "KOTAK MAHINDRA BANK",
            TransactionType::EquitasBank => "EQUITAS BANK",
            TransactionType::AxisBank => "AXIS BANK",
            TransactionType::HdfcBank => "HDFC BANK",
            TransactionType::BankOfBaroda => "BANK OF BARODA",
            TransactionType::IdbiBank => "IDBI BANK",
            TransactionType::FedralBank => "FEDRAL BANK",
            TransactionType::BajajPay => "BAJAJ PAY",
            TransactionType::LivquikFastag => "LIVQUIK FASTAG",
            TransactionType::OthersFastag => "OTHERS FASTAG",
            TransactionType::Pending => "PENDING",
            TransactionType::Cash => "CASH",
        }
    }

    /// Parse a wire string (case-insensitive, surrounding whitespace ignored).
    pub fn parse(raw: &str) -> Option<TransactionType> {
        let wanted = raw.trim().to_uppercase();
        TransactionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionType::Pending)
    }
}

// ============================================================================
// PAYMENT TYPE
// ============================================================================

/// How the money for an event actually moved.
///
/// Canonical wire strings are the upper-case names. The legacy client sent
/// "GPAY/PHONE PAY" and "EXP"; those still parse but never serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    #[serde(rename = "CASH")]
    Cash,
    #[serde(rename = "ELECTRONIC_TRANSFER", alias = "GPAY/PHONE PAY")]
    ElectronicTransfer,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "EXPENSE", alias = "EXP")]
    Expense,
}

impl PaymentType {
    /// The fixed instrument set, in display order.
    pub const ALL: [PaymentType; 4] = [
        PaymentType::Cash,
        PaymentType::ElectronicTransfer,
        PaymentType::Pending,
        PaymentType::Expense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "CASH",
            PaymentType::ElectronicTransfer => "ELECTRONIC_TRANSFER",
            PaymentType::Pending => "PENDING",
            PaymentType::Expense => "EXPENSE",
        }
    }

    /// Parse a wire string, accepting the legacy aliases.
    pub fn parse(raw: &str) -> Option<PaymentType> {
        match raw.trim().to_uppercase().as_str() {
            "CASH" => Some(PaymentType::Cash),
            "ELECTRONIC_TRANSFER" | "GPAY/PHONE PAY" => Some(PaymentType::ElectronicTransfer),
            "PENDING" => Some(PaymentType::Pending),
            "EXPENSE" | "EXP" => Some(PaymentType::Expense),
            _ => None,
        }
    }
}

// ============================================================================
// VEHICLE NORMALIZATION
// ============================================================================

/// Normalize a vehicle registration for storage, comparison and grouping.
///
/// Applied in exactly one place (validation) and assumed everywhere after:
/// "tn01ab1234" and "TN01AB1234" are the same vehicle.
pub fn normalize_vehicle(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ============================================================================
// EVENT (the atomic, immutable fact)
// ============================================================================

/// A stored toll transaction. Immutable once appended; corrections are new
/// offsetting events, never in-place edits or deletions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Opaque identity (UUID), assigned at persistence time.
    pub id: String,

    /// Normalized vehicle registration.
    pub vehicle: String,

    /// Shift worker who recorded the event (identity supplied by the
    /// shift/auth collaborator, trusted as given).
    pub worker: String,

    pub transaction_type: TransactionType,

    pub payment_type: PaymentType,

    /// Non-negative; accumulated in full precision, rounded to 2 decimals
    /// only for display.
    pub amount: f64,

    /// Assigned at append time; non-decreasing per insertion order.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// A new unpaid charge: PENDING through the PENDING instrument.
    pub fn is_pending_accrual(&self) -> bool {
        self.transaction_type.is_pending() && self.payment_type == PaymentType::Pending
    }

    /// A prior debt being settled through a real instrument.
    pub fn is_pending_settlement(&self) -> bool {
        self.transaction_type.is_pending() && self.payment_type != PaymentType::Pending
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent or blank.
    MissingField(&'static str),

    /// Amount did not parse as a finite, non-negative decimal.
    InvalidAmount(String),

    /// Enum string outside the recognized set (caller/schema drift).
    UnknownEnumValue { field: &'static str, value: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField(field) => {
                write!(f, "missing required field: {}", field)
            }
            ValidationError::InvalidAmount(raw) => {
                write!(f, "amount must be a non-negative number, got: {:?}", raw)
            }
            ValidationError::UnknownEnumValue { field, value } => {
                write!(f, "unrecognized {}: {:?}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// An unvalidated submission, exactly as it arrives from a form body or a
/// backfill row. All fields optional so that absence and blankness produce
/// the same specific error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCandidate {
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

/// A candidate that passed validation: normalized, typed, ready to append.
/// Identity and timestamp are still the store's to assign.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub vehicle: String,
    pub transaction_type: TransactionType,
    pub payment_type: PaymentType,
    pub amount: f64,
}

impl ValidatedEvent {
    pub fn is_pending_settlement(&self) -> bool {
        self.transaction_type.is_pending() && self.payment_type != PaymentType::Pending
    }
}

impl EventCandidate {
    /// Pure validation: no side effects, no store access.
    ///
    /// Vehicle normalization happens here and only here; everything
    /// downstream assumes it already happened.
    pub fn validate(&self) -> Result<ValidatedEvent, ValidationError> {
        let vehicle = require(self.vehicle.as_deref(), "vehicle")?;
        let tx_raw = require(self.transaction_type.as_deref(), "transaction_type")?;
        let pay_raw = require(self.payment_type.as_deref(), "payment_type")?;
        let amount_raw = require(self.amount.as_deref(), "amount")?;

        let amount: f64 = amount_raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidAmount(amount_raw.to_string()))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(ValidationError::InvalidAmount(amount_raw.to_string()));
        }

        let transaction_type =
            TransactionType::parse(tx_raw).ok_or_else(|| ValidationError::UnknownEnumValue {
                field: "transaction_type",
                value: tx_raw.to_string(),
            })?;

        let payment_type =
            PaymentType::parse(pay_raw).ok_or_else(|| ValidationError::UnknownEnumValue {
                field: "payment_type",
                value: pay_raw.to_string(),
            })?;

        Ok(ValidatedEvent {
            vehicle: normalize_vehicle(vehicle),
            transaction_type,
            payment_type,
            amount,
        })
    }
}

fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ValidationError::MissingField(field)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(vehicle: &str, tx: &str, pay: &str, amount: &str) -> EventCandidate {
        EventCandidate {
            vehicle: Some(vehicle.to_string()),
            transaction_type: Some(tx.to_string()),
            payment_type: Some(pay.to_string()),
            amount: Some(amount.to_string()),
        }
    }

    #[test]
    fn test_validate_normalizes_vehicle() {
        let validated = candidate(" tn01ab1234 ", "CASH", "CASH", "30")
            .validate()
            .unwrap();

        assert_eq!(validated.vehicle, "TN01AB1234");
        assert_eq!(validated.transaction_type, TransactionType::Cash);
        assert_eq!(validated.payment_type, PaymentType::Cash);
        assert_eq!(validated.amount, 30.0);
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut c = candidate("TN01AB1234", "CASH", "CASH", "30");
        c.vehicle = None;
        assert_eq!(c.validate(), Err(ValidationError::MissingField("vehicle")));

        // Blank counts as missing, same as absent
        let mut c = candidate("TN01AB1234", "CASH", "CASH", "30");
        c.amount = Some("   ".to_string());
        assert_eq!(c.validate(), Err(ValidationError::MissingField("amount")));

        let mut c = candidate("TN01AB1234", "CASH", "CASH", "30");
        c.payment_type = Some(String::new());
        assert_eq!(
            c.validate(),
            Err(ValidationError::MissingField("payment_type"))
        );
    }

    #[test]
    fn test_validate_invalid_amount() {
        for bad in ["abc", "-50", "NaN", "inf", "12,50"] {
            let err = candidate("TN01AB1234", "CASH", "CASH", bad)
                .validate()
                .unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidAmount(_)),
                "expected InvalidAmount for {:?}, got {:?}",
                bad,
                err
            );
        }

        // Decimal amounts are fine
        let ok = candidate("TN01AB1234", "CASH", "CASH", "45.50").validate();
        assert_eq!(ok.unwrap().amount, 45.50);
    }

    #[test]
    fn test_validate_unknown_enum() {
        let err = candidate("TN01AB1234", "SOME BANK", "CASH", "30")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownEnumValue {
                field: "transaction_type",
                value: "SOME BANK".to_string(),
            }
        );

        let err = candidate("TN01AB1234", "CASH", "CHEQUE", "30")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownEnumValue {
                field: "payment_type",
                value: "CHEQUE".to_string(),
            }
        );
    }

    #[test]
    fn test_legacy_payment_aliases_parse() {
        assert_eq!(
            PaymentType::parse("GPAY/PHONE PAY"),
            Some(PaymentType::ElectronicTransfer)
        );
        assert_eq!(PaymentType::parse("EXP"), Some(PaymentType::Expense));
        assert_eq!(PaymentType::parse("exp"), Some(PaymentType::Expense));

        // But they serialize canonically
        let json = serde_json::to_string(&PaymentType::ElectronicTransfer).unwrap();
        assert_eq!(json, "\"ELECTRONIC_TRANSFER\"");
    }

    #[test]
    fn test_transaction_type_round_trip() {
        for t in TransactionType::ALL {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
            let json = serde_json::to_string(&t).unwrap();
            let back: TransactionType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
        }
        assert_eq!(TransactionType::parse("NOT A CHANNEL"), None);
    }

    #[test]
    fn test_pending_classification() {
        let accrual = candidate("TN01AB1234", "PENDING", "PENDING", "100")
            .validate()
            .unwrap();
        assert!(!accrual.is_pending_settlement());

        let settlement = candidate("TN01AB1234", "PENDING", "CASH", "40")
            .validate()
            .unwrap();
        assert!(settlement.is_pending_settlement());

        // A normal toll through the cash lane is neither
        let toll = candidate("TN01AB1234", "CASH", "CASH", "30")
            .validate()
            .unwrap();
        assert!(!toll.is_pending_settlement());
    }
}
