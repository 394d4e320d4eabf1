//! Offline payment records and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Largest accepted amount in minor units (9,999,999,999,999.99).
pub const MAX_AMOUNT: i64 = 999_999_999_999_999;

/// Lifecycle of an offline payment.
///
/// ```text
/// queued -> captured_offline -> pending_sync -> synced | failed
/// failed -> queued             (explicit retry)
/// any non-terminal -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Queued,
    CapturedOffline,
    PendingSync,
    Synced,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Queued,
        Self::CapturedOffline,
        Self::PendingSync,
        Self::Synced,
        Self::Failed,
        Self::Cancelled,
    ];

    /// `synced` and `cancelled` accept no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Synced | Self::Cancelled, _) => false,
            (_, Self::Cancelled) => true,
            (Self::Queued, Self::CapturedOffline | Self::PendingSync)
            | (Self::CapturedOffline | Self::Failed, Self::PendingSync)
            | (Self::PendingSync, Self::Synced | Self::Failed)
            | (Self::Failed, Self::Queued) => true,
            _ => false,
        }
    }

    /// Get the string representation used in storage and output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::CapturedOffline => "captured_offline",
            Self::PendingSync => "pending_sync",
            Self::Synced => "synced",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the payment was (or will be) collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    MobileWallet,
    Check,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::BankTransfer => "bank_transfer",
            Self::MobileWallet => "mobile_wallet",
            Self::Check => "check",
        };
        write!(f, "{s}")
    }
}

/// Input for queueing a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in minor units (cents).
    pub amount: i64,
    /// ISO 4217 code.
    pub currency: String,
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
    pub method: PaymentMethod,
}

impl PaymentRequest {
    /// Check the request before it becomes a payment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` for an amount outside `1..=MAX_AMOUNT`, a
    /// malformed currency code, or an empty recipient.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidPayload(
                "payment amount must be positive".to_string(),
            ));
        }
        if self.amount > MAX_AMOUNT {
            return Err(LedgerError::InvalidPayload(format!(
                "payment amount exceeds {}",
                format_minor(MAX_AMOUNT)
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LedgerError::InvalidPayload(format!(
                "invalid currency code: {}",
                self.currency
            )));
        }
        if self.recipient.trim().is_empty() {
            return Err(LedgerError::InvalidPayload(
                "payment recipient is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Capture details supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureData {
    /// Captured amount; defaults to the payment amount.
    #[serde(default)]
    pub amount: Option<i64>,
    /// Capture method; defaults to the payment method.
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    /// Receipt number, signature reference, or similar proof.
    #[serde(default)]
    pub evidence: Option<String>,
}

/// Offline capture attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub amount: i64,
    pub method: PaymentMethod,
    pub evidence: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Why and when a payment was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

/// A payment captured on the device awaiting the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePayment {
    pub id: Uuid,
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub recipient: String,
    pub description: Option<String>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capture: Option<Capture>,
    #[serde(default)]
    pub cancellation: Option<Cancellation>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Reference the remote assigned on acceptance.
    #[serde(default)]
    pub remote_ref: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Set once a submission has been sent to the remote.
    #[serde(default)]
    pub submitted: bool,
    /// Send the next submission with the conflict override flag.
    #[serde(default)]
    pub conflict_override: bool,
    /// Conflict waiting on a user decision.
    #[serde(default)]
    pub pending_conflict: Option<Uuid>,
}

impl OfflinePayment {
    /// Create a `queued` payment from a validated request.
    #[must_use]
    pub fn new(request: PaymentRequest, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            amount: request.amount,
            currency: request.currency.to_ascii_uppercase(),
            recipient: request.recipient,
            description: request.description,
            method: request.method,
            status: PaymentStatus::Queued,
            retry_count: 0,
            max_retries,
            queued_at: now,
            updated_at: now,
            last_retry_at: None,
            capture: None,
            cancellation: None,
            last_error: None,
            remote_ref: None,
            synced_at: None,
            submitted: false,
            conflict_override: false,
            pending_conflict: None,
        }
    }

    /// Move to `to` if the lifecycle allows it.
    ///
    /// # Errors
    ///
    /// Returns `PaymentTerminal` from `synced`/`cancelled` and
    /// `InvalidTransition` for any other disallowed move.
    pub fn transition(&mut self, to: PaymentStatus) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::PaymentTerminal {
                payment_id: self.id.to_string(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        tracing::debug!(payment = %self.id, from = %self.status, %to, "payment transition");
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether `retry()` still has budget.
    #[must_use]
    pub const fn retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Amount that will actually be settled.
    #[must_use]
    pub fn effective_amount(&self) -> i64 {
        self.capture.as_ref().map_or(self.amount, |capture| capture.amount)
    }
}

/// Format minor units as a decimal amount (e.g. `4200` -> `42.00`).
#[must_use]
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            amount: 100,
            currency: "usd".to_string(),
            recipient: "Acme Supplies".to_string(),
            description: None,
            method: PaymentMethod::Card,
        }
    }

    #[test]
    fn test_new_payment_is_queued() {
        let payment = OfflinePayment::new(request(), 3);
        assert_eq!(payment.status, PaymentStatus::Queued);
        assert_eq!(payment.currency, "USD");
        assert_eq!(payment.retry_count, 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        use PaymentStatus::{Cancelled, CapturedOffline, Failed, PendingSync, Queued, Synced};

        assert!(Queued.can_transition_to(CapturedOffline));
        assert!(CapturedOffline.can_transition_to(PendingSync));
        assert!(PendingSync.can_transition_to(Synced));
        assert!(PendingSync.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Queued));
        assert!(Failed.can_transition_to(Cancelled));

        assert!(!CapturedOffline.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Synced));
        for to in PaymentStatus::ALL {
            assert!(!Synced.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn test_terminal_transition_rejected() {
        let mut payment = OfflinePayment::new(request(), 3);
        payment.transition(PaymentStatus::Cancelled).unwrap();

        let err = payment.transition(PaymentStatus::Queued).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PaymentTerminal { status: PaymentStatus::Cancelled, .. }
        ));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut payment = OfflinePayment::new(request(), 3);
        let err = payment.transition(PaymentStatus::Synced).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(payment.status, PaymentStatus::Queued);
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.amount = 0;
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.amount = MAX_AMOUNT + 1;
        assert!(bad.validate().is_err());

        let mut largest = request();
        largest.amount = MAX_AMOUNT;
        assert!(largest.validate().is_ok());

        let mut bad = request();
        bad.currency = "US".to_string();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.recipient = "  ".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_format_minor() {
        assert_eq!(format_minor(4200), "42.00");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-1234), "-12.34");
    }
}
