//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;

/// Reason recorded when a customer cancels without giving one.
pub const DEFAULT_CANCEL_REASON: &str = "Cancelado por el usuario";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { Pending, Paid, Confirmed, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Paid => "paid", Self::Confirmed => "confirmed",
            Self::Processing => "processing", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    /// Not yet handed to the carrier.
    pub fn is_customer_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid | Self::Confirmed | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    fn step(&self) -> u8 {
        match self {
            Self::Pending => 0, Self::Paid => 1, Self::Confirmed => 2, Self::Processing => 3,
            Self::Shipped => 4, Self::Delivered => 5, Self::Cancelled => u8::MAX,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending, "paid" => Self::Paid, "confirmed" => Self::Confirmed,
            "processing" => Self::Processing, "shipped" => Self::Shipped,
            "delivered" => Self::Delivered, "cancelled" => Self::Cancelled,
            other => return Err(OrderError::UnknownStatus(other.to_string())),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Option<String>,
    pub name: String,
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
}

impl ShippingAddress {
    /// Single-line form: `address, postal code city`.
    pub fn one_line(&self) -> String {
        format!("{}, {} {}", self.address, self.postal_code, self.city)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: String,
    user_id: Option<String>,
    customer_email: String,
    status: OrderStatus,
    total: Money,
    items: Vec<OrderItem>,
    shipping_address: Option<ShippingAddress>,
    payment_session_id: Option<String>,
    cancellation: Option<Cancellation>,
    refund_pending: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// New order for a confirmed payment session.
    pub fn from_payment(id: impl Into<String>, session_id: impl Into<String>, customer_email: impl Into<String>, user_id: Option<String>, items: Vec<OrderItem>, total: Money) -> Self {
        let now = Utc::now();
        let id = id.into();
        let mut order = Self {
            id: id.clone(), user_id, customer_email: customer_email.into(), status: OrderStatus::Paid,
            total, items, shipping_address: None, payment_session_id: Some(session_id.into()),
            cancellation: None, refund_pending: false, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, total: total.minor() }));
        order
    }

    /// Rebuilds an order from stored state; raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(id: String, user_id: Option<String>, customer_email: String, status: OrderStatus, total: Money, items: Vec<OrderItem>, shipping_address: Option<ShippingAddress>, payment_session_id: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id, user_id, customer_email, status, total, items, shipping_address, payment_session_id,
            cancellation: None, refund_pending: false, created_at, updated_at, events: vec![],
        }
    }

    pub fn with_shipping(mut self, address: Option<ShippingAddress>) -> Self { self.shipping_address = address; self }
    pub fn with_cancellation(mut self, cancellation: Option<Cancellation>, refund_pending: bool) -> Self {
        self.cancellation = cancellation;
        self.refund_pending = refund_pending;
        self
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn short_number(&self) -> &str { self.id.get(..8).unwrap_or(&self.id) }
    pub fn user_id(&self) -> Option<&str> { self.user_id.as_deref() }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn total(&self) -> Money { self.total }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn shipping_address(&self) -> Option<&ShippingAddress> { self.shipping_address.as_ref() }
    pub fn payment_session_id(&self) -> Option<&str> { self.payment_session_id.as_deref() }
    pub fn cancellation(&self) -> Option<&Cancellation> { self.cancellation.as_ref() }
    pub fn refund_pending(&self) -> bool { self.refund_pending }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn is_owned_by(&self, user_id: &str) -> bool { self.user_id.as_deref() == Some(user_id) }

    /// Customer-initiated cancellation. Leaves a refund pending.
    pub fn cancel_by_customer(&mut self, user_id: &str, reason: Option<&str>) -> Result<(), OrderError> {
        if !self.is_owned_by(user_id) { return Err(OrderError::NotOwner); }
        if !self.status.is_customer_cancellable() { return Err(OrderError::CannotCancel(self.status)); }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_CANCEL_REASON).to_string();
        self.status = OrderStatus::Cancelled;
        self.cancellation = Some(Cancellation { at: Utc::now(), reason: reason.clone() });
        self.refund_pending = true;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id.clone(), reason }));
        Ok(())
    }

    /// Admin transition. Moves forward only; cancellation allowed from any non-terminal state.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status.is_terminal() { return Err(OrderError::InvalidTransition { from: self.status, to: next }); }
        if next != OrderStatus::Cancelled && next.step() <= self.status.step() {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id.clone(), status: next.to_string() }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NotOwner,
    CannotCancel(OrderStatus),
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    UnknownStatus(String),
}

impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwner => write!(f, "order belongs to another user"),
            Self::CannotCancel(s) => write!(f, "order in status {s} can no longer be cancelled"),
            Self::InvalidTransition { from, to } => write!(f, "cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "unknown order status {s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let items = vec![OrderItem { product_id: Some("p1".into()), name: "Shirt".into(), size: Some("M".into()), quantity: 2, unit_price: Money::from_minor(2000) }];
        Order::from_payment("0a1b2c3d-aaaa", "cs_test_1", "ana@example.com", Some("u1".into()), items, Money::from_minor(4000))
    }

    #[test]
    fn test_order_created_paid() {
        let mut o = order();
        assert_eq!(o.status(), OrderStatus::Paid);
        assert_eq!(o.short_number(), "0a1b2c3d");
        assert_eq!(o.items()[0].total(), Money::from_minor(4000));
        assert!(matches!(o.take_events()[0], DomainEvent::Order(OrderEvent::Created { total: 4000, .. })));
    }

    #[test]
    fn test_customer_cancel() {
        let mut o = order();
        o.take_events();
        o.cancel_by_customer("u1", None).unwrap();
        assert_eq!(o.status(), OrderStatus::Cancelled);
        assert!(o.refund_pending());
        assert_eq!(o.cancellation().unwrap().reason, DEFAULT_CANCEL_REASON);
        assert_eq!(o.take_events().len(), 1);
    }

    #[test]
    fn test_customer_cancel_rules() {
        let mut o = order();
        assert_eq!(o.cancel_by_customer("u2", Some("x")), Err(OrderError::NotOwner));
        o.transition(OrderStatus::Shipped).unwrap();
        assert_eq!(o.cancel_by_customer("u1", Some("late")), Err(OrderError::CannotCancel(OrderStatus::Shipped)));
    }

    #[test]
    fn test_admin_transitions() {
        let mut o = order();
        o.transition(OrderStatus::Processing).unwrap();
        assert!(o.transition(OrderStatus::Confirmed).is_err());
        o.transition(OrderStatus::Delivered).unwrap();
        assert!(o.transition(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::Processing.to_string(), "processing");
    }
}
