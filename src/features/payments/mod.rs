//! Offline payment queue.
//!
//! Features:
//! - Payment status machine with terminal `synced` and `cancelled` states
//! - Offline capture with evidence
//! - Explicit retry with a per-payment budget
//! - Remote cancellation for already submitted payments
//! - Analytics over queued, synced, and failed amounts

pub mod analytics;
pub mod gateway;
pub mod manager;
pub mod payment;

pub use analytics::PaymentAnalytics;
pub use gateway::{GatewayOutcome, HttpPaymentGateway, PaymentGateway};
pub use manager::{PaymentQueueManager, PaymentSyncResult, SyncReport};
pub use payment::{
    format_minor, Cancellation, Capture, CaptureData, OfflinePayment, PaymentMethod,
    PaymentRequest, PaymentStatus, MAX_AMOUNT,
};
