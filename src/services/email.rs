//! Transactional email: templates and delivery.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::aggregates::Order;
use crate::domain::value_objects::Money;

pub const DEFAULT_RESEND_API_BASE: &str = "https://api.resend.com";
pub const BRAND: &str = "Aurum";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Sends without making the caller wait; failures only reach the log.
pub fn send_in_background(mailer: Arc<dyn Mailer>, message: EmailMessage) {
    tokio::spawn(async move {
        let to = message.to.clone();
        let subject = message.subject.clone();
        match mailer.send(message).await {
            Ok(()) => info!(%to, %subject, "email sent"),
            Err(e) => error!(%to, %subject, error = %e, "email delivery failed"),
        }
    });
}

/// Delivery through the Resend HTTP API.
#[derive(Clone, Debug)]
pub struct ResendMailer {
    client: Client,
    api_base: String,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>, from: &str) -> Result<Self, MailError> {
        Self::with_base(DEFAULT_RESEND_API_BASE, api_key, from)
    }

    pub fn with_base(api_base: impl Into<String>, api_key: impl Into<String>, from: &str) -> Result<Self, MailError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            from: format!("{BRAND} <{from}>"),
        })
    }
}

#[derive(Serialize)]
struct SendBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let response = self.client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&SendBody { from: &self.from, to: [&message.to], subject: &message.subject, html: &message.html })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() { return Ok(()); }
        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected { status: status.as_u16(), body })
    }
}

/// Used when no mail provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "mail disabled, message dropped");
        Ok(())
    }
}

// =============================================================================
// Templates
// =============================================================================

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head>\
         <body style=\"font-family: 'Helvetica Neue', Arial, sans-serif; background-color: #f4f4f5; margin: 0; padding: 0;\">\
         <div style=\"max-width: 600px; margin: 0 auto; background: white;\">\
         <div style=\"background: #18181b; padding: 24px; text-align: center;\"><h1 style=\"color: white; margin: 0;\">{BRAND}</h1></div>\
         {body}\
         <div style=\"background: #f4f4f5; padding: 20px; text-align: center; color: #71717a; font-size: 12px;\">\
         <p>&copy; {year} {BRAND}. Todos los derechos reservados.</p></div>\
         </div></body></html>",
        year = Utc::now().year(),
    )
}

/// Invoice-style confirmation sent after a paid checkout.
pub fn order_confirmation(order: &Order, customer_name: &str, site_url: &str) -> EmailMessage {
    let rows: String = order
        .items()
        .iter()
        .map(|item| {
            format!(
                "<tr><td style=\"padding: 12px 10px;\">{}</td><td style=\"text-align: center;\">{}</td><td style=\"text-align: right; padding-right: 10px;\">{}</td></tr>",
                escape_html(&item.name),
                item.quantity,
                item.total().format_eur(),
            )
        })
        .collect();
    let address = order
        .shipping_address()
        .map(|a| escape_html(&a.one_line()).replace(", ", "<br>"))
        .unwrap_or_default();
    let body = format!(
        "<div style=\"padding: 30px;\">\
         <h2>Confirmación de Pedido</h2><p>Gracias por tu confianza</p>\
         <p><strong>Factura a:</strong><br>{name}<br>{email}<br>{address}</p>\
         <p><strong>Nº Pedido:</strong> #{number}<br><strong>Fecha:</strong> {date}</p>\
         <table width=\"100%\" cellspacing=\"0\"><thead><tr><th align=\"left\">Producto</th><th>Cant.</th><th align=\"right\">Total</th></tr></thead>\
         <tbody>{rows}<tr><td colspan=\"2\" style=\"text-align: right; font-weight: bold;\">TOTAL</td><td style=\"text-align: right; font-weight: bold;\">{total}</td></tr></tbody></table>\
         <p>Hemos recibido tu pedido y estamos preparándolo para el envío.</p>\
         <a href=\"{site_url}/mi-cuenta/pedidos\">Ver Mi Pedido</a></div>",
        name = escape_html(customer_name),
        email = escape_html(order.customer_email()),
        number = order.short_number(),
        date = order.created_at().format("%d/%m/%Y"),
        total = order.total().format_eur(),
    );
    EmailMessage {
        to: order.customer_email().to_string(),
        subject: format!("Factura de Pedido #{}", order.short_number()),
        html: layout(&body),
    }
}

/// Everything the "favorite on sale" email shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleAlert<'a> {
    pub to: &'a str,
    pub user_name: Option<&'a str>,
    pub product_name: &'a str,
    pub product_image: Option<&'a str>,
    pub product_slug: &'a str,
    pub original_price: Money,
    pub sale_price: Money,
    pub discount_percent: u32,
}

pub fn favorite_on_sale(alert: &SaleAlert<'_>, site_url: &str) -> EmailMessage {
    let name = escape_html(alert.product_name);
    let image = alert
        .product_image
        .map(|src| format!("<img src=\"{}\" alt=\"{name}\" style=\"max-width: 200px; border-radius: 8px;\">", escape_html(src)))
        .unwrap_or_default();
    let body = format!(
        "<div style=\"padding: 20px;\">\
         <h2>¡Oferta en tus Favoritos!</h2><p>Hola {user},</p><p>Un producto que te gusta ha bajado de precio.</p>\
         <div style=\"text-align: center; padding: 20px;\">{image}<h3>{name}</h3>\
         <p><span style=\"text-decoration: line-through; color: #71717a;\">{original}</span> \
         <span style=\"font-weight: bold; color: #ef4444;\">{sale}</span></p>\
         <p style=\"color: #ef4444; font-weight: bold;\">¡-{discount}% de Descuento!</p></div>\
         <div style=\"text-align: center;\"><a href=\"{site_url}/productos/{slug}\">Ver Oferta</a></div></div>",
        user = escape_html(alert.user_name.unwrap_or("Usuario")),
        original = alert.original_price.format_eur(),
        sale = alert.sale_price.format_eur(),
        discount = alert.discount_percent,
        slug = alert.product_slug,
    );
    EmailMessage {
        to: alert.to.to_string(),
        subject: format!("¡{} está en oferta! -{}%", alert.product_name, alert.discount_percent),
        html: layout(&body),
    }
}

/// Newsletter message; line breaks in `message` become `<br>`.
pub fn broadcast(to: &str, user_name: Option<&str>, subject: &str, title: Option<&str>, message: &str) -> EmailMessage {
    let body = format!(
        "<div style=\"padding: 40px 30px; color: #334155; line-height: 1.6;\">\
         <h2>{title}</h2><p>Hola {user},</p><p>{message}</p>\
         <p>Saludos,<br>El equipo de {BRAND}</p></div>",
        title = escape_html(title.unwrap_or(subject)),
        user = escape_html(user_name.unwrap_or("Suscriptor")),
        message = escape_html(message).replace('\n', "<br>"),
    );
    EmailMessage { to: to.to_string(), subject: subject.to_string(), html: layout(&body) }
}
