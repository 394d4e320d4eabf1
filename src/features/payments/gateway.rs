//! Remote side of payment synchronization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::payment::{Capture, Cancellation, OfflinePayment, PaymentMethod};
use crate::features::conflict::EntitySnapshot;
use crate::remote::{CallOptions, Endpoint, RemoteClient, RemoteReply, SyncAck};

/// Result of one gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    /// The remote accepted the submission.
    Accepted { remote_ref: Option<String> },
    /// Transport error or non-2xx response.
    Rejected(String),
    /// The remote holds a divergent record for this payment.
    Conflict(EntitySnapshot),
}

/// Submits payments to, and cancels them on, the system of record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a payment for synchronization.
    async fn submit(&self, payment: &OfflinePayment) -> GatewayOutcome;

    /// Tell the remote a submitted payment was cancelled locally.
    async fn cancel(&self, payment: &OfflinePayment) -> GatewayOutcome;
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    id: Uuid,
    amount: i64,
    currency: &'a str,
    recipient: &'a str,
    description: Option<&'a str>,
    method: PaymentMethod,
    capture: Option<&'a Capture>,
    queued_at: DateTime<Utc>,
}

impl<'a> From<&'a OfflinePayment> for SubmitBody<'a> {
    fn from(payment: &'a OfflinePayment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            currency: &payment.currency,
            recipient: &payment.recipient,
            description: payment.description.as_deref(),
            method: payment.method,
            capture: payment.capture.as_ref(),
            queued_at: payment.queued_at,
        }
    }
}

/// Gateway backed by the HTTP remote API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: RemoteClient,
}

impl HttpPaymentGateway {
    #[must_use]
    pub const fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    async fn send(&self, endpoint: Endpoint, body: &Value, conflict_override: bool) -> GatewayOutcome {
        let options = CallOptions {
            body: Some(body),
            conflict_override,
            ..CallOptions::default()
        };

        match self.client.call(&endpoint, options).await {
            Ok(RemoteReply::Accepted(body)) => GatewayOutcome::Accepted {
                remote_ref: serde_json::from_value::<SyncAck>(body)
                    .ok()
                    .and_then(SyncAck::remote_ref),
            },
            Ok(RemoteReply::Conflict(remote)) => GatewayOutcome::Conflict(remote),
            Ok(RemoteReply::Rejected { message, .. }) => GatewayOutcome::Rejected(message),
            Err(e) => GatewayOutcome::Rejected(e.to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn submit(&self, payment: &OfflinePayment) -> GatewayOutcome {
        match serde_json::to_value(SubmitBody::from(payment)) {
            Ok(body) => {
                self.send(Endpoint::SyncPayment, &body, payment.conflict_override)
                    .await
            }
            Err(e) => GatewayOutcome::Rejected(format!("could not encode payment: {e}")),
        }
    }

    async fn cancel(&self, payment: &OfflinePayment) -> GatewayOutcome {
        let body = match &payment.cancellation {
            Some(Cancellation {
                reason,
                cancelled_at,
            }) => serde_json::json!({ "reason": reason, "cancelled_at": cancelled_at }),
            None => Value::Null,
        };
        self.send(Endpoint::CancelPayment(payment.id.to_string()), &body, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::features::payments::PaymentRequest;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> HttpPaymentGateway {
        HttpPaymentGateway::new(
            RemoteClient::new(&RemoteConfig {
                base_url: server.uri(),
                ..RemoteConfig::default()
            })
            .unwrap(),
        )
    }

    fn payment() -> OfflinePayment {
        OfflinePayment::new(
            PaymentRequest {
                amount: 2500,
                currency: "EUR".to_string(),
                recipient: "Bakery".to_string(),
                description: Some("Bread".to_string()),
                method: PaymentMethod::Cash,
            },
            3,
        )
    }

    #[tokio::test]
    async fn test_submit_returns_remote_reference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/payments/sync"))
            .and(body_partial_json(json!({"amount": 2500, "currency": "EUR", "method": "cash"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reference": "pay_77"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = gateway_for(&server).submit(&payment()).await;
        assert_eq!(
            outcome,
            GatewayOutcome::Accepted {
                remote_ref: Some("pay_77".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_submit_rejected_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let outcome = gateway_for(&server).submit(&payment()).await;
        assert_eq!(outcome, GatewayOutcome::Rejected("HTTP 502".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_posts_reason() {
        let server = MockServer::start().await;
        let mut cancelled = payment();
        cancelled.cancellation = Some(Cancellation {
            reason: "customer requested".to_string(),
            cancelled_at: Utc::now(),
        });

        Mock::given(method("POST"))
            .and(path(format!("/api/v1/payments/{}/cancel", cancelled.id)))
            .and(body_partial_json(json!({"reason": "customer requested"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = gateway_for(&server).cancel(&cancelled).await;
        assert_eq!(outcome, GatewayOutcome::Accepted { remote_ref: None });
    }
}
