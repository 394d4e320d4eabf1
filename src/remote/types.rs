//! Remote API endpoint map and response shapes.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::features::conflict::EntitySnapshot;

/// One remote resource the core talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    CreateTransaction,
    UpdateTransaction(String),
    DeleteTransaction(String),
    CreateInvoice,
    UpdateInvoice(String),
    SyncPayment,
    CancelPayment(String),
}

impl Endpoint {
    /// HTTP method for this endpoint.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::CreateTransaction
            | Self::CreateInvoice
            | Self::SyncPayment
            | Self::CancelPayment(_) => Method::POST,
            Self::UpdateTransaction(_) | Self::UpdateInvoice(_) => Method::PUT,
            Self::DeleteTransaction(_) => Method::DELETE,
        }
    }

    /// Path below the API prefix.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::CreateTransaction => "/transactions".to_string(),
            Self::UpdateTransaction(id) | Self::DeleteTransaction(id) => {
                format!("/transactions/{id}")
            }
            Self::CreateInvoice => "/invoices".to_string(),
            Self::UpdateInvoice(id) => format!("/invoices/{id}"),
            Self::SyncPayment => "/payments/sync".to_string(),
            Self::CancelPayment(id) => format!("/payments/{id}/cancel"),
        }
    }
}

/// Classified outcome of one remote call that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteReply {
    /// 2xx with the decoded body (`Null` when empty).
    Accepted(Value),
    /// 409 with the server's current view of the entity.
    Conflict(EntitySnapshot),
    /// Any other status.
    Rejected { status: u16, message: String },
}

impl RemoteReply {
    /// Build a conflict snapshot from a 409 body.
    ///
    /// Bodies that don't follow the snapshot shape are kept whole as the
    /// remote data.
    #[must_use]
    pub fn conflict_from_body(body: Value) -> Self {
        let snapshot = match serde_json::from_value::<EntitySnapshot>(body.clone()) {
            Ok(snapshot) if !snapshot.data.is_null() || snapshot.deleted => snapshot,
            _ => EntitySnapshot {
                data: body,
                ..EntitySnapshot::default()
            },
        };
        Self::Conflict(snapshot)
    }
}

/// Acknowledgement returned by the payment sync endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncAck {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl SyncAck {
    /// Remote reference for the synced payment, if the server sent one.
    #[must_use]
    pub fn remote_ref(self) -> Option<String> {
        self.reference.or(self.id)
    }
}
