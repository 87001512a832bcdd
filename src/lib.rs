//! Storefront service
//!
//! Server side of a small fashion storefront. Owns the cart rules and the
//! checkout hand-off; everything else is delegated to hosted collaborators.
//!
//! ## Features
//! - Cart store with pluggable persistence and derived totals
//! - Stock-aware quantity changes against a fetched stock snapshot
//! - Checkout session creation with the payment provider
//! - Order finalization, customer cancellation and admin status changes
//! - Favorites and "favorite on sale" email notifications

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod services;

use thiserror::Error;

use crate::services::{
    auth::AuthError, backend::BackendError, email::MailError, images::ImageHostError,
    payments::PaymentError,
};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] checkout::CheckoutError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Image host error: {0}")]
    ImageHost(#[from] ImageHostError),

    #[error("Cart storage error: {0}")]
    Persistence(#[from] cart::PersistenceError),

    #[error("Order error: {0}")]
    Order(#[from] domain::aggregates::OrderError),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
