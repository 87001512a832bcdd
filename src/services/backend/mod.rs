//! Backend data store contracts.

mod postgres;

pub use postgres::PgBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{Order, Product, StockSnapshot};
use crate::domain::value_objects::ProductId;

/// Postgres SQLSTATE for unique violations.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Notification kind recorded when a favorite goes on sale.
pub const FAVORITE_ON_SALE: &str = "favorite_on_sale";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("record already exists")]
    Duplicate,

    #[error("record not found")]
    NotFound,

    #[error("backend error {code}: {message}")]
    Store { code: String, message: String },

    #[error("unreadable record: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl BackendError {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Duplicate => Some(UNIQUE_VIOLATION),
            Self::Store { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(error: sqlx::Error) -> Self {
        let coded = match &error {
            sqlx::Error::RowNotFound => return Self::NotFound,
            sqlx::Error::Database(db) => db.code().map(|c| (c.into_owned(), db.message().to_string())),
            _ => None,
        };
        match coded {
            Some((code, _)) if code == UNIQUE_VIOLATION => Self::Duplicate,
            Some((code, message)) => Self::Store { code, message },
            None => Self::Database(error),
        }
    }
}

/// A user who favorited a product, with the contact details needed to email them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FavoriteSubscriber {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NewsletterSubscriber {
    pub email: String,
    pub full_name: Option<String>,
}

/// Per-size stock for a set of products.
#[async_trait]
pub trait StockLookup: Send + Sync {
    async fn stock_for(&self, product_ids: &[ProductId]) -> Result<StockSnapshot, BackendError>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every product, newest first.
    async fn list_products(&self) -> Result<Vec<Product>, BackendError>;

    /// Products flagged on sale whose sale started at or after `since`.
    async fn products_on_sale_since(&self, since: DateTime<Utc>) -> Result<Vec<Product>, BackendError>;
}

#[async_trait]
pub trait Favorites: Send + Sync {
    /// Fails with [`BackendError::Duplicate`] when already a favorite.
    async fn add_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError>;
    async fn remove_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError>;
    async fn is_favorite(&self, user_id: &str, product_id: &str) -> Result<bool, BackendError>;
    async fn favorite_subscribers(&self, product_id: &str) -> Result<Vec<FavoriteSubscriber>, BackendError>;
}

#[async_trait]
pub trait Orders: Send + Sync {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, BackendError>;
    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, BackendError>;

    /// Inserts the order and its items. Returns `false` when an order for the
    /// same payment session already exists.
    async fn insert_order(&self, order: &Order) -> Result<bool, BackendError>;

    /// Writes status, cancellation and refund fields back.
    async fn update_order(&self, order: &Order, notes: Option<&str>) -> Result<(), BackendError>;

    async fn append_status_history(&self, order_id: &str, status: &str, notes: &str, created_by: Option<&str>) -> Result<(), BackendError>;
}

#[async_trait]
pub trait Notifications: Send + Sync {
    /// Users without a preferences row get alerts.
    async fn wants_sale_alerts(&self, user_id: &str) -> Result<bool, BackendError>;
    async fn already_notified(&self, user_id: &str, product_id: &str, kind: &str) -> Result<bool, BackendError>;
    async fn record_notification(&self, user_id: &str, product_id: &str, kind: &str, sent_to: &str) -> Result<(), BackendError>;
    async fn newsletter_subscribers(&self) -> Result<Vec<NewsletterSubscriber>, BackendError>;
}

/// Everything the HTTP layer needs from the data store.
pub trait Backend: StockLookup + Catalog + Favorites + Orders + Notifications {}

impl<T> Backend for T where T: StockLookup + Catalog + Favorites + Orders + Notifications {}
