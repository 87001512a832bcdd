use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::{bearer, ApiError, ApiResult, AppState};
use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;
use crate::services::backend::{FavoriteSubscriber, FAVORITE_ON_SALE};
use crate::services::email::{favorite_on_sale, SaleAlert};

/// How far back a sale start still counts as new.
pub const SALE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotifySummary {
    pub message: &'static str,
    pub products_checked: usize,
    pub notifications_sent: usize,
}

pub async fn trigger(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<NotifySummary>> {
    let authorized = match (&state.settings.api_secret_key, bearer(&headers)) {
        (Some(key), Some(given)) => key == given,
        _ => false,
    };
    if !authorized { return Err(ApiError::unauthorized()); }
    notify_favorites_on_sale(&state).await.map(Json)
}

/// Manual trigger for local testing; refused in production.
pub async fn trigger_get(state: State<AppState>, headers: HeaderMap) -> ApiResult<Json<NotifySummary>> {
    if state.settings.production {
        return Err(ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Método no permitido en producción"));
    }
    trigger(state, headers).await
}

/// Emails every subscriber of each product that went on sale in the window,
/// skipping opted-out users and anyone already told about that product.
pub async fn notify_favorites_on_sale(state: &AppState) -> ApiResult<NotifySummary> {
    let since = Utc::now() - Duration::hours(SALE_WINDOW_HOURS);
    let products = state.backend.products_on_sale_since(since).await?;
    if products.is_empty() {
        return Ok(NotifySummary { message: "No hay nuevas ofertas", ..Default::default() });
    }

    let mut sent = 0;
    for product in &products {
        let subscribers = match state.backend.favorite_subscribers(&product.id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "skipping product, subscribers unavailable");
                continue;
            }
        };
        for subscriber in &subscribers {
            if notify_one(state, product, subscriber).await { sent += 1; }
        }
    }

    info!(products = products.len(), sent, "favorite sale notifications processed");
    Ok(NotifySummary { message: "Notificaciones procesadas", products_checked: products.len(), notifications_sent: sent })
}

/// Whether an email went out. Backend failures skip this subscriber only.
async fn notify_one(state: &AppState, product: &Product, subscriber: &FavoriteSubscriber) -> bool {
    let backend = &state.backend;
    let user_id = &subscriber.user_id;
    match backend.wants_sale_alerts(user_id).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "skipping subscriber, preferences unavailable");
            return false;
        }
    }
    match backend.already_notified(user_id, &product.id, FAVORITE_ON_SALE).await {
        Ok(false) => {}
        Ok(true) => return false,
        Err(e) => {
            warn!(user_id = %user_id, product_id = %product.id, error = %e, "skipping subscriber, history unavailable");
            return false;
        }
    }
    let (Some(sale), Some(discount)) = (product.sale_price, product.discount_percent()) else { return false };

    let alert = SaleAlert {
        to: &subscriber.email,
        user_name: subscriber.full_name.as_deref(),
        product_name: &product.name,
        product_image: product.primary_image(),
        product_slug: &product.slug,
        original_price: product.price(),
        sale_price: Money::from_minor(sale),
        discount_percent: discount,
    };
    // history is written only after the send succeeds
    if let Err(e) = state.mailer.send(favorite_on_sale(&alert, &state.settings.site_url)).await {
        error!(user_id = %user_id, product_id = %product.id, error = %e, "sale alert not delivered");
        return false;
    }
    if let Err(e) = backend.record_notification(user_id, &product.id, FAVORITE_ON_SALE, &subscriber.email).await {
        error!(user_id = %user_id, product_id = %product.id, error = %e, "sale alert sent but not recorded");
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{get, post_json, product, TestApp};
    use crate::services::backend::FavoriteSubscriber;
    use axum::http::StatusCode;
    use serde_json::json;

    fn subscriber(id: &str) -> FavoriteSubscriber {
        FavoriteSubscriber { user_id: id.into(), email: format!("{id}@example.com"), full_name: None }
    }

    #[tokio::test]
    async fn test_requires_secret() {
        let app = TestApp::new();
        let (status, _) = post_json(&app, "/api/notify-favorites-on-sale", json!({}), Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_notifies_once_and_respects_opt_out() {
        let app = TestApp::new();
        app.backend.add_product(product("p1", 10_000, Some(8_000)));
        app.backend.add_favorite_subscriber("p1", subscriber("u1"));
        app.backend.add_favorite_subscriber("p1", subscriber("u2"));
        app.backend.opt_out("u2");

        let (status, body) = post_json(&app, "/api/notify-favorites-on-sale", json!({}), Some("cron-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["productsChecked"], 1);
        assert_eq!(body["notificationsSent"], 1);
        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "u1@example.com");
        assert!(sent[0].subject.contains("-20%"));

        let (_, body) = post_json(&app, "/api/notify-favorites-on-sale", json!({}), Some("cron-secret")).await;
        assert_eq!(body["notificationsSent"], 0);
    }

    #[tokio::test]
    async fn test_backend_failure_skips_only_that_subscriber() {
        let app = TestApp::new();
        app.backend.add_product(product("p1", 10_000, Some(8_000)));
        for id in ["u1", "u2", "u3", "u4"] {
            app.backend.add_favorite_subscriber("p1", subscriber(id));
        }
        app.backend.fail_records(1);
        app.backend.break_alert_lookup("u3");

        let (status, body) = post_json(&app, "/api/notify-favorites-on-sale", json!({}), Some("cron-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notificationsSent"], 3);
        let recipients: Vec<_> = app.mailer.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(recipients, ["u1@example.com", "u2@example.com", "u4@example.com"]);
        assert!(!app.backend.was_notified("u1", "p1"));
        assert!(app.backend.was_notified("u2", "p1"));
        assert!(app.backend.was_notified("u4", "p1"));
    }

    #[tokio::test]
    async fn test_no_new_sales() {
        let app = TestApp::new();
        app.backend.add_product(product("p1", 10_000, None));
        let (status, body) = post_json(&app, "/api/notify-favorites-on-sale", json!({}), Some("cron-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No hay nuevas ofertas");
    }

    #[tokio::test]
    async fn test_get_refused_in_production() {
        let app = TestApp::production();
        let (status, _) = get(&app, "/api/notify-favorites-on-sale", Some("cron-secret")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_get_allowed_in_development() {
        let app = TestApp::new();
        let (status, _) = get(&app, "/api/notify-favorites-on-sale", Some("cron-secret")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
