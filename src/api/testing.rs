//! In-memory collaborators and request helpers for router tests.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use super::{build_router, ApiSettings, AppState};
use crate::checkout::CheckoutRequest;
use crate::domain::aggregates::{Order, OrderStatus, OrderItem, Product, StockSnapshot};
use crate::domain::events::EventPublisher;
use crate::domain::value_objects::{Money, ProductId};
use crate::services::auth::{AuthError, AuthService, AuthUser, ADMIN_ROLE};
use crate::services::backend::{
    BackendError, Catalog, FavoriteSubscriber, Favorites, NewsletterSubscriber, Notifications, Orders, StockLookup,
};
use crate::services::email::{EmailMessage, MailError, Mailer};
use crate::services::images::{ImageHost, ImageHostError};
use crate::services::payments::{CompletedSession, PaymentError, PaymentGateway, PaymentSession, SessionLineItem};

pub const CUSTOMER_TOKEN: &str = "customer-token";
pub const CUSTOMER_ID: &str = "5b0c6a1e-3f7d-4c2a-9b8e-1d2f3a4b5c6d";
pub const ADMIN_TOKEN: &str = "admin-token";
/// Makes the fake auth service fail as if it were unreachable.
pub const AUTH_DOWN_TOKEN: &str = "auth-down";

// =============================================================================
// Backend
// =============================================================================

type HistoryRow = (String, String, String, Option<String>);

#[derive(Default)]
struct BackendData {
    products: Vec<Product>,
    favorites: HashSet<(String, String)>,
    subscribers: HashMap<String, Vec<FavoriteSubscriber>>,
    opted_out: HashSet<String>,
    notified: HashSet<(String, String, String)>,
    orders: BTreeMap<String, Order>,
    history: Vec<HistoryRow>,
    newsletter: Vec<NewsletterSubscriber>,
    broken_alert_lookups: HashSet<String>,
    failing_records: usize,
}

#[derive(Default)]
pub struct FakeBackend {
    data: Mutex<BackendData>,
}

impl FakeBackend {
    fn with<R>(&self, f: impl FnOnce(&mut BackendData) -> R) -> R {
        let mut guard = self.data.lock().unwrap();
        f(&mut guard)
    }

    pub fn add_product(&self, product: Product) { self.with(|d| d.products.push(product)); }
    pub fn add_favorite_subscriber(&self, product_id: &str, s: FavoriteSubscriber) {
        self.with(|d| d.subscribers.entry(product_id.to_string()).or_default().push(s));
    }
    pub fn opt_out(&self, user_id: &str) { self.with(|d| d.opted_out.insert(user_id.to_string())); }
    pub fn add_newsletter_subscriber(&self, s: NewsletterSubscriber) { self.with(|d| d.newsletter.push(s)); }
    pub fn put_order(&self, order: Order) { self.with(|d| d.orders.insert(order.id().to_string(), order)); }
    pub fn order(&self, id: &str) -> Option<Order> { self.with(|d| d.orders.get(id).cloned()) }
    pub fn order_count(&self) -> usize { self.with(|d| d.orders.len()) }
    pub fn history(&self) -> Vec<HistoryRow> { self.with(|d| d.history.clone()) }

    /// The preference lookup for `user_id` errors from now on.
    pub fn break_alert_lookup(&self, user_id: &str) { self.with(|d| d.broken_alert_lookups.insert(user_id.to_string())); }
    /// The next `n` notification history writes error.
    pub fn fail_records(&self, n: usize) { self.with(|d| d.failing_records = n); }
    pub fn was_notified(&self, user_id: &str, product_id: &str) -> bool {
        self.with(|d| d.notified.iter().any(|(u, p, _)| u == user_id && p == product_id))
    }
}

fn store_error() -> BackendError {
    BackendError::Store { code: "08006".into(), message: "connection failure".into() }
}

#[async_trait]
impl StockLookup for FakeBackend {
    async fn stock_for(&self, product_ids: &[ProductId]) -> Result<StockSnapshot, BackendError> {
        Ok(self.with(|d| {
            let mut snapshot = StockSnapshot::new();
            for id in product_ids {
                if let Some(sizes) = d.products.iter().find(|p| p.id == id.as_str()).and_then(|p| p.sizes.as_ref()) {
                    snapshot.insert_product(id, sizes);
                }
            }
            snapshot
        }))
    }
}

#[async_trait]
impl Catalog for FakeBackend {
    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        Ok(self.with(|d| d.products.clone()))
    }

    async fn products_on_sale_since(&self, _since: DateTime<Utc>) -> Result<Vec<Product>, BackendError> {
        Ok(self.with(|d| d.products.iter().filter(|p| p.is_on_sale && p.sale_price.is_some()).cloned().collect()))
    }
}

#[async_trait]
impl Favorites for FakeBackend {
    async fn add_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError> {
        let inserted = self.with(|d| d.favorites.insert((user_id.to_string(), product_id.to_string())));
        if inserted { Ok(()) } else { Err(BackendError::Duplicate) }
    }

    async fn remove_favorite(&self, user_id: &str, product_id: &str) -> Result<(), BackendError> {
        self.with(|d| d.favorites.remove(&(user_id.to_string(), product_id.to_string())));
        Ok(())
    }

    async fn is_favorite(&self, user_id: &str, product_id: &str) -> Result<bool, BackendError> {
        Ok(self.with(|d| d.favorites.contains(&(user_id.to_string(), product_id.to_string()))))
    }

    async fn favorite_subscribers(&self, product_id: &str) -> Result<Vec<FavoriteSubscriber>, BackendError> {
        Ok(self.with(|d| d.subscribers.get(product_id).cloned().unwrap_or_default()))
    }
}

#[async_trait]
impl Orders for FakeBackend {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, BackendError> {
        Ok(self.order(order_id))
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, BackendError> {
        let (skip, take) = (usize::try_from(offset).unwrap_or(0), usize::try_from(limit).unwrap_or(0));
        Ok(self.with(|d| d.orders.values().skip(skip).take(take).cloned().collect()))
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, BackendError> {
        Ok(self.with(|d| {
            let duplicate = d.orders.values().any(|o| o.payment_session_id().is_some() && o.payment_session_id() == order.payment_session_id());
            if !duplicate { d.orders.insert(order.id().to_string(), order.clone()); }
            !duplicate
        }))
    }

    async fn update_order(&self, order: &Order, _notes: Option<&str>) -> Result<(), BackendError> {
        self.with(|d| match d.orders.get_mut(order.id()) {
            Some(stored) => { *stored = order.clone(); Ok(()) }
            None => Err(BackendError::NotFound),
        })
    }

    async fn append_status_history(&self, order_id: &str, status: &str, notes: &str, created_by: Option<&str>) -> Result<(), BackendError> {
        self.with(|d| d.history.push((order_id.into(), status.into(), notes.into(), created_by.map(str::to_string))));
        Ok(())
    }
}

#[async_trait]
impl Notifications for FakeBackend {
    async fn wants_sale_alerts(&self, user_id: &str) -> Result<bool, BackendError> {
        self.with(|d| {
            if d.broken_alert_lookups.contains(user_id) { return Err(store_error()); }
            Ok(!d.opted_out.contains(user_id))
        })
    }

    async fn already_notified(&self, user_id: &str, product_id: &str, kind: &str) -> Result<bool, BackendError> {
        Ok(self.with(|d| d.notified.contains(&(user_id.to_string(), product_id.to_string(), kind.to_string()))))
    }

    async fn record_notification(&self, user_id: &str, product_id: &str, kind: &str, _sent_to: &str) -> Result<(), BackendError> {
        self.with(|d| {
            if d.failing_records > 0 {
                d.failing_records -= 1;
                return Err(store_error());
            }
            d.notified.insert((user_id.into(), product_id.into(), kind.into()));
            Ok(())
        })
    }

    async fn newsletter_subscribers(&self) -> Result<Vec<NewsletterSubscriber>, BackendError> {
        Ok(self.with(|d| d.newsletter.clone()))
    }
}

// =============================================================================
// Other collaborators
// =============================================================================

pub struct FakeAuth;

#[async_trait]
impl AuthService for FakeAuth {
    async fn current_user(&self, token: &str) -> Result<Option<AuthUser>, AuthError> {
        let user = |id: &str, role: Option<&str>| AuthUser {
            id: id.into(),
            email: Some(format!("{id}@example.com")),
            full_name: None,
            role: role.map(str::to_string),
        };
        if token == AUTH_DOWN_TOKEN { return Err(AuthError::UnexpectedStatus(503)); }
        Ok(match token {
            CUSTOMER_TOKEN => Some(user(CUSTOMER_ID, None)),
            ADMIN_TOKEN => Some(user("admin-1", Some(ADMIN_ROLE))),
            _ => None,
        })
    }
}

#[derive(Default)]
pub struct FakePayments {
    requests: Mutex<Vec<CheckoutRequest>>,
    fail: AtomicBool,
    session: Mutex<Option<CompletedSession>>,
}

impl FakePayments {
    pub fn requests(&self) -> Vec<CheckoutRequest> { self.requests.lock().unwrap().clone() }
    pub fn fail_next(&self) { self.fail.store(true, Ordering::SeqCst); }
    pub fn set_session(&self, session: CompletedSession) { *self.session.lock().unwrap() = Some(session); }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_session(&self, request: CheckoutRequest) -> Result<PaymentSession, PaymentError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Rejected { status: 500, message: "boom".into() });
        }
        self.requests.lock().unwrap().push(request);
        Ok(PaymentSession { session_id: "cs_test_1".into(), url: "https://pay.test/cs_test_1".into() })
    }

    async fn retrieve_session(&self, session_id: String) -> Result<CompletedSession, PaymentError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.id == session_id)
            .ok_or(PaymentError::Rejected { status: 404, message: "No such checkout.session".into() })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<EmailMessage> { self.sent.lock().unwrap().clone() }

    /// Lets background sends run until `n` messages arrived (or gives up).
    pub async fn wait_for(&self, n: usize) -> Vec<EmailMessage> {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= n { break; }
            tokio::task::yield_now().await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeImages {
    uploads: Mutex<Vec<(String, usize)>>,
}

impl FakeImages {
    pub fn uploads(&self) -> Vec<(String, usize)> { self.uploads.lock().unwrap().clone() }
}

#[async_trait]
impl ImageHost for FakeImages {
    async fn upload(&self, name: &str, _content_type: &str, bytes: Vec<u8>) -> Result<String, ImageHostError> {
        if bytes.is_empty() { return Err(ImageHostError::Empty); }
        self.uploads.lock().unwrap().push((name.to_string(), bytes.len()));
        Ok(format!("https://img.test/{name}"))
    }
}

// =============================================================================
// App and requests
// =============================================================================

pub struct TestApp {
    pub backend: Arc<FakeBackend>,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<FakeMailer>,
    pub images: Arc<FakeImages>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self { Self::build(false) }
    pub fn production() -> Self { Self::build(true) }

    fn build(production: bool) -> Self {
        let backend = Arc::new(FakeBackend::default());
        let payments = Arc::new(FakePayments::default());
        let mailer = Arc::new(FakeMailer::default());
        let images = Arc::new(FakeImages::default());
        let state = AppState {
            backend: backend.clone(),
            auth: Arc::new(FakeAuth),
            payments: payments.clone(),
            mailer: mailer.clone(),
            images: images.clone(),
            events: EventPublisher::disabled(),
            settings: ApiSettings {
                site_url: "https://shop.test".into(),
                api_secret_key: Some("cron-secret".into()),
                production,
            },
        };
        Self { backend, payments, mailer, images, state }
    }

    pub fn router(&self) -> Router { build_router(self.state.clone()) }
}

pub async fn send_json(app: &TestApp, method: Method, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    call(app, request).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
    send_json(app, Method::POST, uri, body, token).await
}

pub async fn get(app: &TestApp, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    call(app, builder.body(Body::empty()).unwrap()).await
}

/// GET carrying the session cookie the browser sends instead of a bearer header.
pub async fn get_with_cookie(app: &TestApp, uri: &str, token: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("cookie", format!("theme=dark; sb-access-token={token}"))
        .body(Body::empty())
        .unwrap();
    call(app, request).await
}

async fn call(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, body)
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn product(id: &str, price: i64, sale_price: Option<i64>) -> Product {
    Product {
        id: id.into(),
        name: format!("Producto {id}"),
        slug: format!("producto-{id}"),
        price,
        sale_price,
        is_on_sale: sale_price.is_some(),
        images: vec![format!("https://cdn.test/{id}.jpg")],
        category_id: None,
        colors: vec![],
        sizes: None,
        stock: None,
        created_at: Utc::now(),
    }
}

pub fn stored_order(id: &str, user_id: &str, status: OrderStatus) -> Order {
    let items = vec![OrderItem {
        product_id: Some("p1".into()), name: "Shirt".into(), size: Some("M".into()), quantity: 1, unit_price: Money::from_minor(2000),
    }];
    let now = Utc::now();
    Order::restore(id.into(), Some(user_id.into()), "ana@example.com".into(), status, Money::from_minor(2000), items, None, Some(format!("cs_{id}")), now, now)
}

pub fn paid_session(id: &str, paid: bool) -> CompletedSession {
    let metadata = BTreeMap::from([
        ("userId".to_string(), CUSTOMER_ID.to_string()),
        ("shipping_full_name".to_string(), "Ana Ruiz".to_string()),
        ("shipping_phone".to_string(), "600000000".to_string()),
        ("shipping_address".to_string(), "Calle Mayor 1".to_string()),
        ("shipping_city".to_string(), "Madrid".to_string()),
        ("shipping_postal_code".to_string(), "28013".to_string()),
    ]);
    let product_metadata = BTreeMap::from([
        ("product_id".to_string(), "p1".to_string()),
        ("size".to_string(), "M".to_string()),
        ("original_name".to_string(), "Shirt".to_string()),
    ]);
    CompletedSession {
        id: id.into(),
        paid,
        customer_email: Some("ana@example.com".into()),
        amount_total: 4000,
        metadata,
        line_items: vec![SessionLineItem { description: "Shirt (Talla: M)".into(), quantity: 2, unit_amount: 2000, product_metadata }],
    }
}
