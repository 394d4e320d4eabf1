//! Dashboard aggregates over the payment queue.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::payment::{OfflinePayment, PaymentStatus};

/// Figures computed from the current payment set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAnalytics {
    pub total: usize,
    /// Count per status; every status is present.
    pub by_status: BTreeMap<String, usize>,
    /// Minor units not yet synced, per currency. Cancelled payments excluded.
    pub unsynced_by_currency: BTreeMap<String, i64>,
    /// Minor units synced, per currency.
    pub synced_by_currency: BTreeMap<String, i64>,
    /// Share of sync outcomes that ended `failed` (0.0 when none finished).
    pub failure_rate: f64,
    /// Payments with no retries left that are still not terminal.
    pub exhausted: usize,
    pub oldest_unsynced: Option<DateTime<Utc>>,
}

impl PaymentAnalytics {
    /// Compute analytics for `payments`.
    #[must_use]
    pub fn from_payments(payments: &[OfflinePayment]) -> Self {
        let mut by_status: BTreeMap<String, usize> = PaymentStatus::ALL
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect();
        let mut unsynced_by_currency = BTreeMap::new();
        let mut synced_by_currency = BTreeMap::new();
        let mut exhausted = 0;
        let mut oldest_unsynced: Option<DateTime<Utc>> = None;

        for payment in payments {
            *by_status.entry(payment.status.to_string()).or_insert(0) += 1;

            match payment.status {
                PaymentStatus::Synced => {
                    add_amount(&mut synced_by_currency, payment);
                }
                PaymentStatus::Cancelled => {}
                _ => {
                    add_amount(&mut unsynced_by_currency, payment);
                    oldest_unsynced = Some(
                        oldest_unsynced.map_or(payment.queued_at, |t| t.min(payment.queued_at)),
                    );
                    if !payment.retries_left() {
                        exhausted += 1;
                    }
                }
            }
        }

        let synced = by_status[PaymentStatus::Synced.as_str()];
        let failed = by_status[PaymentStatus::Failed.as_str()];
        #[allow(clippy::cast_precision_loss)]
        let failure_rate = if synced + failed == 0 {
            0.0
        } else {
            failed as f64 / (synced + failed) as f64
        };

        Self {
            total: payments.len(),
            by_status,
            unsynced_by_currency,
            synced_by_currency,
            failure_rate,
            exhausted,
            oldest_unsynced,
        }
    }
}

/// Totals saturate; stored records are not re-validated on load.
fn add_amount(totals: &mut BTreeMap<String, i64>, payment: &OfflinePayment) {
    let total = totals.entry(payment.currency.clone()).or_insert(0);
    *total = total.saturating_add(payment.effective_amount());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::payments::{PaymentMethod, PaymentRequest};

    fn payment(amount: i64, currency: &str, status: PaymentStatus) -> OfflinePayment {
        let mut payment = OfflinePayment::new(
            PaymentRequest {
                amount,
                currency: currency.to_string(),
                recipient: "Vendor".to_string(),
                description: None,
                method: PaymentMethod::Card,
            },
            3,
        );
        payment.status = status;
        payment
    }

    #[test]
    fn test_empty_analytics() {
        let analytics = PaymentAnalytics::from_payments(&[]);
        assert_eq!(analytics.total, 0);
        assert_eq!(analytics.by_status.len(), 6);
        assert!(analytics.failure_rate.abs() < f64::EPSILON);
        assert!(analytics.oldest_unsynced.is_none());
    }

    #[test]
    fn test_amounts_and_rates() {
        let mut exhausted = payment(300, "EUR", PaymentStatus::Failed);
        exhausted.retry_count = 3;

        let payments = vec![
            payment(1000, "USD", PaymentStatus::Synced),
            payment(250, "USD", PaymentStatus::Queued),
            payment(500, "USD", PaymentStatus::Cancelled),
            exhausted,
            payment(700, "EUR", PaymentStatus::Synced),
        ];
        let analytics = PaymentAnalytics::from_payments(&payments);

        assert_eq!(analytics.total, 5);
        assert_eq!(analytics.by_status["synced"], 2);
        assert_eq!(analytics.by_status["cancelled"], 1);
        assert_eq!(analytics.synced_by_currency["USD"], 1000);
        assert_eq!(analytics.synced_by_currency["EUR"], 700);
        assert_eq!(analytics.unsynced_by_currency["USD"], 250);
        assert_eq!(analytics.unsynced_by_currency["EUR"], 300);
        assert_eq!(analytics.exhausted, 1);
        assert!((analytics.failure_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(analytics.oldest_unsynced, Some(payments[1].queued_at));
    }

    #[test]
    fn test_huge_totals_saturate() {
        let half = i64::MAX / 2 + 1;
        let payments = vec![
            payment(half, "USD", PaymentStatus::Queued),
            payment(half, "USD", PaymentStatus::Failed),
            payment(half, "JPY", PaymentStatus::Synced),
            payment(half, "JPY", PaymentStatus::Synced),
        ];
        let analytics = PaymentAnalytics::from_payments(&payments);

        assert_eq!(analytics.unsynced_by_currency["USD"], i64::MAX);
        assert_eq!(analytics.synced_by_currency["JPY"], i64::MAX);
    }
}
