//! Checkout Initiator
//!
//! Turns the cart lines into one payment-session request and hands it to the
//! [`PaymentGateway`]. Validation happens before any external call and a
//! failed call never touches the cart.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::aggregates::{cart::SIZE_LABEL, CartLine, ShippingAddress};
use crate::services::payments::{PaymentError, PaymentGateway, PaymentSession, SESSION_ID_PLACEHOLDER};

/// Label used when a line has no size.
pub const ONE_SIZE: &str = "Única";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("El carrito está vacío")]
    EmptyCart,

    #[error("payment session failed: {0}")]
    Payment(#[from] PaymentError),
}

impl CheckoutError {
    pub fn is_validation(&self) -> bool { matches!(self, Self::EmptyCart) }
}

/// One external line item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutLineItem {
    pub product_id: String,
    pub size: Option<String>,
    /// Display name with the size suffix stripped.
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
    pub image: Option<String>,
}

impl CheckoutLineItem {
    /// Label shown on the hosted payment page.
    pub fn display_label(&self) -> String {
        format!("{} (Talla: {})", self.name, self.size.as_deref().unwrap_or(ONE_SIZE))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
    pub customer_email: Option<String>,
}

/// Strips the `" - Talla <size>"` suffix the product page adds to names.
pub fn clean_display_name(name: &str) -> &str {
    match name.find(SIZE_LABEL) {
        Some(at) if at + SIZE_LABEL.len() < name.len() => &name[..at],
        _ => name,
    }
}

fn forwardable_image(image: Option<&str>) -> Option<String> {
    image
        .filter(|i| i.starts_with("https://") || i.starts_with("http://"))
        .map(str::to_string)
}

/// Metadata keys read back when the order is finalized.
pub mod metadata_keys {
    pub const USER_ID: &str = "userId";
    pub const FULL_NAME: &str = "shipping_full_name";
    pub const PHONE: &str = "shipping_phone";
    pub const ADDRESS: &str = "shipping_address";
    pub const CITY: &str = "shipping_city";
    pub const POSTAL_CODE: &str = "shipping_postal_code";
}

/// Account id fit for the order record: only uuids are accepted.
pub fn account_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|r| Uuid::parse_str(r).is_ok()).map(str::to_string)
}

/// Builds the payment-session request. Rejects an empty cart.
pub fn build_checkout_request(
    site_url: &str,
    lines: &[CartLine],
    shipping: Option<&ShippingAddress>,
    user_id: Option<&str>,
) -> Result<CheckoutRequest, CheckoutError> {
    if lines.is_empty() { return Err(CheckoutError::EmptyCart); }

    let line_items = lines
        .iter()
        .map(|line| CheckoutLineItem {
            product_id: line.key.product_id.to_string(),
            size: line.key.size.as_ref().map(|s| s.to_string()),
            name: clean_display_name(&line.name).to_string(),
            unit_amount: line.price.minor(),
            quantity: line.quantity,
            image: forwardable_image(line.image.as_deref()),
        })
        .collect();

    let shipping = shipping.cloned().unwrap_or_default();
    let metadata = BTreeMap::from([
        (metadata_keys::USER_ID.to_string(), user_id.unwrap_or_default().to_string()),
        (metadata_keys::FULL_NAME.to_string(), shipping.full_name),
        (metadata_keys::PHONE.to_string(), shipping.phone),
        (metadata_keys::ADDRESS.to_string(), shipping.address),
        (metadata_keys::CITY.to_string(), shipping.city),
        (metadata_keys::POSTAL_CODE.to_string(), shipping.postal_code),
    ]);

    Ok(CheckoutRequest {
        line_items,
        success_url: format!("{site_url}/pago-exitoso?session_id={SESSION_ID_PLACEHOLDER}"),
        cancel_url: format!("{site_url}/carrito"),
        metadata,
        customer_email: None,
    })
}

#[derive(Clone)]
pub struct CheckoutInitiator {
    gateway: Arc<dyn PaymentGateway>,
    site_url: String,
}

impl CheckoutInitiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, site_url: impl Into<String>) -> Self {
        Self { gateway, site_url: site_url.into() }
    }

    /// Submits every line in a single request and returns the hosted page to redirect to.
    pub async fn initiate(
        &self,
        lines: &[CartLine],
        shipping: Option<&ShippingAddress>,
        user_id: Option<&str>,
    ) -> Result<PaymentSession, CheckoutError> {
        let request = build_checkout_request(&self.site_url, lines, shipping, user_id)?;
        let items = request.line_items.len();
        match self.gateway.create_session(request).await {
            Ok(session) => {
                info!(session_id = %session.session_id, items, "payment session created");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, items, "payment session creation failed");
                Err(e.into())
            }
        }
    }
}
