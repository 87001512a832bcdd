//! HTTP surface.

mod admin;
mod catalog;
mod checkout;
mod favorites;
mod notifications;
mod orders;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use validator::Validate;

use crate::checkout::{CheckoutError, CheckoutInitiator};
use crate::config::Config;
use crate::domain::events::EventPublisher;
use crate::services::{
    auth::{extract_token, AuthService, AuthUser, SupabaseAuth},
    backend::{Backend, BackendError, PgBackend},
    email::{LogMailer, Mailer, ResendMailer},
    images::{CloudinaryHost, ImageHost, UnconfiguredImageHost},
    payments::{PaymentGateway, StripeClient},
};

/// Largest image accepted by the upload endpoint.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Settings handlers read at request time.
#[derive(Clone, Debug, Default)]
pub struct ApiSettings {
    pub site_url: String,
    pub api_secret_key: Option<String>,
    pub production: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub auth: Arc<dyn AuthService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageHost>,
    pub events: EventPublisher,
    pub settings: ApiSettings,
}

impl AppState {
    /// Wires the production collaborators from configuration.
    pub fn from_config(config: &Config, db: PgPool, nats: Option<async_nats::Client>) -> crate::Result<Self> {
        let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
            Some(key) => Arc::new(ResendMailer::new(key.clone(), &config.email_from)?),
            None => Arc::new(LogMailer),
        };
        let images: Arc<dyn ImageHost> = match (&config.cloudinary_cloud_name, &config.cloudinary_upload_preset) {
            (Some(cloud), Some(preset)) => Arc::new(CloudinaryHost::new(cloud.clone(), preset.clone())?),
            _ => Arc::new(UnconfiguredImageHost),
        };
        Ok(Self {
            backend: Arc::new(PgBackend::new(db)),
            auth: Arc::new(SupabaseAuth::new(config.supabase_url.clone(), config.supabase_anon_key.clone())?),
            payments: Arc::new(StripeClient::new(
                config.stripe_api_base.clone(),
                config.stripe_secret_key.clone(),
                config.checkout_currency.clone(),
            )?),
            mailer,
            images,
            events: EventPublisher::new(nats),
            settings: ApiSettings {
                site_url: config.site_url.clone(),
                api_secret_key: config.api_secret_key.clone(),
                production: config.is_production(),
            },
        })
    }

    pub fn checkout(&self) -> CheckoutInitiator {
        CheckoutInitiator::new(self.payments.clone(), self.settings.site_url.clone())
    }
}

// =============================================================================
// Errors
// =============================================================================

pub const GENERIC_ERROR: &str = "Error interno del servidor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, message) }
    pub fn unauthorized() -> Self { Self::new(StatusCode::UNAUTHORIZED, "No autorizado") }
    pub fn forbidden(message: impl Into<String>) -> Self { Self::new(StatusCode::FORBIDDEN, message) }
    pub fn not_found(message: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, message) }
    pub fn internal() -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        error!(error = %e, code = ?e.code(), "backend call failed");
        Self::internal()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::EmptyCart => Self::bad_request(e.to_string()),
            CheckoutError::Payment(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Error al procesar el pago"),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Runs `validator` rules, reporting the first failure as a 400.
pub(crate) fn validate<T: Validate>(body: &T) -> ApiResult<()> {
    body.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| e.message.as_ref().map_or_else(|| format!("{field} inválido"), |m| m.to_string())))
            .next()
            .unwrap_or_else(|| "Datos inválidos".to_string());
        ApiError::bad_request(message)
    })
}

// =============================================================================
// Authentication helpers
// =============================================================================

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The signed-in user, if the request carries a valid token.
pub(crate) async fn current_user(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<AuthUser>> {
    let Some(token) = extract_token(header_str(headers, header::AUTHORIZATION), header_str(headers, header::COOKIE)) else {
        return Ok(None);
    };
    state.auth.current_user(&token).await.map_err(|e| {
        error!(error = %e, "auth lookup failed");
        ApiError::internal()
    })
}

pub(crate) async fn require_user(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthUser> {
    current_user(state, headers).await?.ok_or_else(ApiError::unauthorized)
}

pub(crate) async fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthUser> {
    let user = require_user(state, headers).await?;
    if !user.is_admin() {
        return Err(ApiError::forbidden("Acceso restringido a administradores"));
    }
    Ok(user)
}

pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION).and_then(|h| h.strip_prefix("Bearer "))
}

// =============================================================================
// Router
// =============================================================================

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(catalog::health))
        .route("/api/search.json", get(catalog::search))
        .route("/api/stock", get(catalog::stock))
        .route("/api/checkout", post(checkout::create_session))
        .route("/api/favorites", get(favorites::status).post(favorites::add).delete(favorites::remove))
        .route("/api/orders/return", post(orders::cancel))
        .route("/api/orders/finalize", post(orders::finalize))
        .route("/api/notify-favorites-on-sale", get(notifications::trigger_get).post(notifications::trigger))
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:id/status", put(admin::update_status))
        .route("/api/send-broadcast", post(admin::broadcast))
        .route("/api/admin/images", post(admin::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;
