//! Hosted payment sessions.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::checkout::{CheckoutLineItem, CheckoutRequest};

/// Placeholder the provider replaces with the real session id in the success URL.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment provider response missing {0}")]
    MissingField(&'static str),
}

/// What the provider hands back for a new session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub url: String,
}

/// A session looked up after the customer returned from the hosted page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedSession {
    pub id: String,
    pub paid: bool,
    pub customer_email: Option<String>,
    pub amount_total: i64,
    pub metadata: BTreeMap<String, String>,
    pub line_items: Vec<SessionLineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_amount: i64,
    pub product_metadata: BTreeMap<String, String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: CheckoutRequest) -> Result<PaymentSession, PaymentError>;
    async fn retrieve_session(&self, session_id: String) -> Result<CompletedSession, PaymentError>;
}

/// Stripe Checkout over its form-encoded REST API.
#[derive(Clone, Debug)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

impl StripeClient {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>, currency: impl Into<String>) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            currency: currency.into(),
        })
    }

    /// Flattens a checkout request into Stripe's bracketed form fields.
    pub fn session_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("locale".to_string(), "es".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            push_line_item(&mut form, i, item, &self.currency);
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        form
    }

    async fn error_from(response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();
        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => body.error.message.unwrap_or_default(),
            Err(_) => String::new(),
        };
        PaymentError::Rejected { status, message }
    }
}

fn push_line_item(form: &mut Vec<(String, String)>, i: usize, item: &CheckoutLineItem, currency: &str) {
    let p = format!("line_items[{i}]");
    form.push((format!("{p}[quantity]"), item.quantity.to_string()));
    form.push((format!("{p}[price_data][currency]"), currency.to_string()));
    form.push((format!("{p}[price_data][unit_amount]"), item.unit_amount.to_string()));
    form.push((format!("{p}[price_data][product_data][name]"), item.display_label()));
    if let Some(image) = &item.image {
        form.push((format!("{p}[price_data][product_data][images][0]"), image.clone()));
    }
    let size = item.size.clone().unwrap_or_default();
    for (key, value) in [("product_id", item.product_id.clone()), ("size", size), ("original_name", item.name.clone())] {
        form.push((format!("{p}[price_data][product_data][metadata][{key}]"), value));
    }
}

#[derive(Deserialize)]
struct StripeErrorBody { error: StripeErrorDetail }

#[derive(Deserialize)]
struct StripeErrorDetail { message: Option<String> }

#[derive(Deserialize)]
struct SessionResponse {
    id: Option<String>,
    url: Option<String>,
    payment_status: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    line_items: Option<LineItemList>,
}

#[derive(Deserialize)]
struct CustomerDetails { email: Option<String> }

#[derive(Deserialize)]
struct LineItemList { data: Vec<LineItemResponse> }

#[derive(Deserialize)]
struct LineItemResponse {
    description: Option<String>,
    quantity: Option<u32>,
    price: Option<PriceResponse>,
}

#[derive(Deserialize)]
struct PriceResponse {
    unit_amount: Option<i64>,
    product: Option<ProductField>,
}

/// Either the bare product id or the expanded product object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProductField {
    Expanded {
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    Id(IgnoredAny),
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_session(&self, request: CheckoutRequest) -> Result<PaymentSession, PaymentError> {
        let response = self.client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&self.session_form(&request))
            .send()
            .await?;
        if !response.status().is_success() { return Err(Self::error_from(response).await); }
        let body: SessionResponse = response.json().await?;
        Ok(PaymentSession {
            session_id: body.id.ok_or(PaymentError::MissingField("id"))?,
            url: body.url.ok_or(PaymentError::MissingField("url"))?,
        })
    }

    async fn retrieve_session(&self, session_id: String) -> Result<CompletedSession, PaymentError> {
        let response = self.client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("expand[]", "line_items"), ("expand[]", "line_items.data.price.product")])
            .send()
            .await?;
        if !response.status().is_success() { return Err(Self::error_from(response).await); }
        let body: SessionResponse = response.json().await?;
        let line_items = body.line_items.map(|l| l.data).unwrap_or_default().into_iter().map(|li| {
            let (unit_amount, product_metadata) = match li.price {
                Some(PriceResponse { unit_amount, product: Some(ProductField::Expanded { metadata }) }) => (unit_amount.unwrap_or(0), metadata),
                Some(PriceResponse { unit_amount, .. }) => (unit_amount.unwrap_or(0), BTreeMap::new()),
                None => (0, BTreeMap::new()),
            };
            SessionLineItem { description: li.description.unwrap_or_default(), quantity: li.quantity.unwrap_or(1), unit_amount, product_metadata }
        }).collect();
        Ok(CompletedSession {
            id: body.id.unwrap_or(session_id),
            paid: body.payment_status.as_deref() == Some("paid"),
            customer_email: body.customer_email.or(body.customer_details.and_then(|c| c.email)),
            amount_total: body.amount_total.unwrap_or(0),
            metadata: body.metadata,
            line_items,
        })
    }
}
