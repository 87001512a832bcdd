//! Postgres implementation of the backend contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    BackendError, Catalog, FavoriteSubscriber, Favorites, NewsletterSubscriber, Notifications,
    Orders, StockLookup,
};
use crate::domain::aggregates::order::{Cancellation, OrderItem, ShippingAddress};
use crate::domain::aggregates::{Order, OrderStatus, Product, StockSnapshot};
use crate::domain::value_objects::{Money, ProductId};

const PRODUCT_COLUMNS: &str = "id::text AS id, name, slug, price, sale_price, is_on_sale, images, \
     category_id::text AS category_id, colors, sizes, stock, created_at";

const ORDER_COLUMNS: &str = "id::text AS id, user_id::text AS user_id, customer_email, status, \
     total_amount, shipping_address, stripe_session_id, cancelled_at, cancellation_reason, \
     refund_status, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgBackend {
    db: PgPool,
}

impl PgBackend {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: Option<String>,
    customer_email: String,
    status: String,
    total_amount: i64,
    shipping_address: Option<Json<ShippingAddress>>,
    stripe_session_id: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    refund_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: String,
    product_id: Option<String>,
    product_name: String,
    size: Option<String>,
    quantity: i32,
    price: i64,
}

impl OrderItemRow {
    fn into_item(self) -> OrderItem {
        OrderItem {
            product_id: self.product_id,
            name: self.product_name,
            size: self.size,
            quantity: u32::try_from(self.quantity).unwrap_or(0),
            unit_price: Money::from_minor(self.price),
        }
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, BackendError> {
        let status: OrderStatus = self.status.parse().map_err(|e| BackendError::Decode(format!("order {}: {e}", self.id)))?;
        let cancellation = match (self.cancelled_at, self.cancellation_reason) {
            (Some(at), reason) => Some(Cancellation { at, reason: reason.unwrap_or_default() }),
            _ => None,
        };
        let refund_pending = self.refund_status.as_deref() == Some("pending");
        Ok(Order::restore(
            self.id, self.user_id, self.customer_email, status, Money::from_minor(self.total_amount), items,
            self.shipping_address.map(|j| j.0), self.stripe_session_id, self.created_at, self.updated_at,
        )
        .with_cancellation(cancellation, refund_pending))
    }
}

fn parse_uuid(raw: &str) -> Option<Uuid> { Uuid::parse_str(raw).ok() }

#[async_trait]
impl StockLookup for PgBackend {
    async fn stock_for(&self, product_ids: &[ProductId]) -> Result<StockSnapshot, BackendError> {
        let ids: Vec<String> = product_ids.iter().map(|p| p.as_str().to_string()).collect();
        if ids.is_empty() { return Ok(StockSnapshot::new()); }
        let rows = sqlx::query_as::<_, (String, Option<Value>)>("SELECT id::text, sizes FROM products WHERE id::text = ANY($1)")
            .bind(&ids).fetch_all(&self.db).await?;
        let mut snapshot = StockSnapshot::new();
        for (id, sizes) in rows {
            let (Ok(product_id), Some(sizes)) = (ProductId::new(id), sizes) else { continue };
            snapshot.insert_product(&product_id, &sizes);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl Catalog for PgBackend {
    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Product>(&sql).fetch_all(&self.db).await?)
    }

    async fn products_on_sale_since(&self, since: DateTime<Utc>) -> Result<Vec<Product>, BackendError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE is_on_sale = TRUE AND sale_price IS NOT NULL AND sale_started_at >= $1");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(since).fetch_all(&self.db).await?)
    }
}

#[async_trait]
impl Favorites for PgBackend {
    async fn add_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError> {
        sqlx::query("INSERT INTO favorites (user_id, product_id) VALUES ($1::uuid, $2::uuid)")
            .bind(user_id).bind(product_id).execute(&self.db).await?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1::uuid AND product_id::text = $2")
            .bind(user_id).bind(product_id).execute(&self.db).await?;
        Ok(())
    }

    async fn is_favorite(&self, user_id: &str, product_id: &str) -> Result<bool, BackendError> {
        let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM favorites WHERE user_id = $1::uuid AND product_id::text = $2")
            .bind(user_id).bind(product_id).fetch_optional(&self.db).await?;
        Ok(found.is_some())
    }

    async fn favorite_subscribers(&self, product_id: &str) -> Result<Vec<FavoriteSubscriber>, BackendError> {
        Ok(sqlx::query_as::<_, FavoriteSubscriber>(
            "SELECT p.id::text AS user_id, p.email, p.full_name FROM favorites f \
             JOIN profiles p ON p.id = f.user_id WHERE f.product_id::text = $1",
        )
        .bind(product_id).fetch_all(&self.db).await?)
    }
}

#[async_trait]
impl Orders for PgBackend {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, BackendError> {
        let Some(id) = parse_uuid(order_id) else { return Ok(None) };
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&self.db).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id::text AS order_id, product_id, product_name, size, quantity, price FROM order_items WHERE order_id = $1",
        )
        .bind(id).fetch_all(&self.db).await?;
        row.into_order(items.into_iter().map(OrderItemRow::into_item).collect()).map(Some)
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, BackendError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(limit).bind(offset).fetch_all(&self.db).await?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id::text AS order_id, product_id, product_name, size, quantity, price FROM order_items WHERE order_id::text = ANY($1)",
        )
        .bind(&ids).fetch_all(&self.db).await?;
        rows.into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut items).into_iter().partition(|i| i.order_id == row.id);
                items = rest;
                row.into_order(mine.into_iter().map(OrderItemRow::into_item).collect())
            })
            .collect()
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, BackendError> {
        let id = parse_uuid(order.id()).ok_or_else(|| BackendError::Decode(format!("order id {:?} is not a uuid", order.id())))?;
        let mut tx = self.db.begin().await?;
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO orders (id, user_id, stripe_session_id, customer_email, status, total_amount, shipping_address, created_at, updated_at) \
             VALUES ($1, $2::uuid, $3, $4, $5, $6, $7, $8, $8) ON CONFLICT (stripe_session_id) DO NOTHING RETURNING id",
        )
        .bind(id).bind(order.user_id()).bind(order.payment_session_id()).bind(order.customer_email())
        .bind(order.status().as_str()).bind(order.total().minor()).bind(order.shipping_address().map(Json))
        .bind(order.created_at())
        .fetch_optional(&mut *tx).await?;
        if inserted.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }
        for item in order.items() {
            sqlx::query("INSERT INTO order_items (order_id, product_id, product_name, size, quantity, price) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(id).bind(&item.product_id).bind(&item.name).bind(&item.size)
                .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX)).bind(item.unit_price.minor())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn update_order(&self, order: &Order, notes: Option<&str>) -> Result<(), BackendError> {
        let id = parse_uuid(order.id()).ok_or(BackendError::NotFound)?;
        let cancellation = order.cancellation();
        let result = sqlx::query(
            "UPDATE orders SET status = $2, cancelled_at = $3, cancellation_reason = $4, \
             refund_status = CASE WHEN $5 THEN 'pending' ELSE refund_status END, \
             notes = COALESCE($6, notes), updated_at = NOW() WHERE id = $1",
        )
        .bind(id).bind(order.status().as_str()).bind(cancellation.map(|c| c.at)).bind(cancellation.map(|c| c.reason.as_str()))
        .bind(order.refund_pending()).bind(notes)
        .execute(&self.db).await?;
        if result.rows_affected() == 0 { return Err(BackendError::NotFound); }
        Ok(())
    }

    async fn append_status_history(&self, order_id: &str, status: &str, notes: &str, created_by: Option<&str>) -> Result<(), BackendError> {
        sqlx::query("INSERT INTO order_status_history (order_id, status, notes, created_by) VALUES ($1::uuid, $2, $3, $4::uuid)")
            .bind(order_id).bind(status).bind(notes).bind(created_by).execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifications for PgBackend {
    async fn wants_sale_alerts(&self, user_id: &str) -> Result<bool, BackendError> {
        let pref: Option<(bool,)> = sqlx::query_as("SELECT favorites_on_sale FROM user_notification_preferences WHERE user_id = $1::uuid")
            .bind(user_id).fetch_optional(&self.db).await?;
        Ok(pref.map_or(true, |(enabled,)| enabled))
    }

    async fn already_notified(&self, user_id: &str, product_id: &str, kind: &str) -> Result<bool, BackendError> {
        let found: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM notification_history WHERE user_id = $1::uuid AND product_id::text = $2 AND notification_type = $3 LIMIT 1",
        )
        .bind(user_id).bind(product_id).bind(kind).fetch_optional(&self.db).await?;
        Ok(found.is_some())
    }

    async fn record_notification(&self, user_id: &str, product_id: &str, kind: &str, sent_to: &str) -> Result<(), BackendError> {
        sqlx::query("INSERT INTO notification_history (user_id, product_id, notification_type, email_sent_to) VALUES ($1::uuid, $2::uuid, $3, $4)")
            .bind(user_id).bind(product_id).bind(kind).bind(sent_to).execute(&self.db).await?;
        Ok(())
    }

    async fn newsletter_subscribers(&self) -> Result<Vec<NewsletterSubscriber>, BackendError> {
        Ok(sqlx::query_as::<_, NewsletterSubscriber>("SELECT email, full_name FROM newsletter_subscribers WHERE is_active = TRUE ORDER BY created_at")
            .fetch_all(&self.db).await?)
    }
}
