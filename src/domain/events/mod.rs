//! Domain events
use crate::domain::value_objects::CartKey;
use serde::Serialize;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartEvent {
    LineAdded { key: CartKey, quantity: u32 },
    QuantityChanged { key: CartKey, quantity: u32 },
    LineRemoved { key: CartKey },
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: String, total: i64 },
    StatusChanged { order_id: String, status: String },
    Cancelled { order_id: String, reason: String },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            DomainEvent::Cart(_) => "storefront.cart".to_string(),
            DomainEvent::Order(e) => {
                let kind = match e {
                    OrderEvent::Created { .. } => "created",
                    OrderEvent::StatusChanged { .. } => "status_changed",
                    OrderEvent::Cancelled { .. } => "cancelled",
                };
                format!("storefront.orders.{kind}")
            }
        }
    }
}

/// Publishes domain events to NATS when a client is configured; a no-op otherwise.
#[derive(Clone, Debug, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self { nats: None } }

    pub async fn publish(&self, event: &DomainEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, "failed to encode domain event"); return; }
        };
        if let Err(e) = nats.publish(event.subject(), payload.into()).await {
            warn!(error = %e, subject = %event.subject(), "failed to publish domain event");
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events { self.publish(event).await; }
    }
}
