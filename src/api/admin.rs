use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use validator::Validate;

use super::{require_admin, validate, ApiError, ApiResult, AppState};
use crate::domain::aggregates::{Order, OrderStatus};
use crate::services::email::{broadcast as broadcast_email, send_in_background};
use crate::services::images::ImageHostError;

#[derive(Debug, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: String,
    pub number: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub total: i64,
    pub total_display: String,
    pub items: usize,
    pub refund_pending: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id().to_string(),
            number: o.short_number().to_string(),
            customer_email: o.customer_email().to_string(),
            status: o.status(),
            total: o.total().minor(),
            total_display: o.total().format_eur(),
            items: o.items().len(),
            refund_pending: o.refund_pending(),
            created_at: o.created_at(),
        }
    }
}

pub async fn list_orders(State(state): State<AppState>, headers: HeaderMap, Query(page): Query<Page>) -> ApiResult<Json<Vec<OrderSummary>>> {
    require_admin(&state, &headers).await?;
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);
    let orders = state.backend.list_orders(limit, offset).await?;
    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusBody {
    pub status: String,
    #[validate(length(max = 500, message = "Notas demasiado largas"))]
    pub notes: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<OrderSummary>> {
    let admin = require_admin(&state, &headers).await?;
    validate(&body)?;
    let next: OrderStatus = body.status.parse().map_err(|_| ApiError::bad_request("Estado desconocido"))?;

    let mut order = state
        .backend
        .find_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Pedido no encontrado"))?;
    order.transition(next).map_err(|e| ApiError::bad_request(e.to_string()))?;

    state.backend.update_order(&order, body.notes.as_deref()).await?;
    let notes = body.notes.clone().unwrap_or_else(|| format!("Estado cambiado a {next}"));
    if let Err(e) = state.backend.append_status_history(order.id(), next.as_str(), &notes, Some(&admin.id)).await {
        warn!(order_id = %order.id(), error = %e, "could not record status history");
    }
    state.events.publish_all(order.take_events()).await;

    info!(order_id = %order.id(), status = %next, admin = %admin.id, "order status updated");
    Ok(Json(OrderSummary::from(&order)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BroadcastBody {
    #[serde(default)]
    #[validate(length(min = 1, message = "Faltan campos"))]
    pub subject: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Faltan campos"))]
    pub message: String,
    pub title: Option<String>,
}

/// Queues one email per newsletter subscriber.
pub async fn broadcast(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<BroadcastBody>) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers).await?;
    validate(&body)?;
    let subscribers = state.backend.newsletter_subscribers().await?;
    let recipients: Vec<_> = subscribers.into_iter().filter(|s| !s.email.is_empty()).collect();
    if recipients.is_empty() {
        return Ok(Json(json!({ "message": "No hay usuarios para enviar", "queued": 0 })));
    }
    for subscriber in &recipients {
        let message = broadcast_email(&subscriber.email, subscriber.full_name.as_deref(), &body.subject, body.title.as_deref(), &body.message);
        send_in_background(state.mailer.clone(), message);
    }
    info!(recipients = recipients.len(), subject = %body.subject, "broadcast queued");
    Ok(Json(json!({ "message": "Proceso iniciado", "queued": recipients.len() })))
}

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    pub name: Option<String>,
}

/// Raw request body in, image host reference out.
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ImageParams>,
    bytes: Bytes,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers).await?;
    let name = params.name.filter(|n| !n.trim().is_empty()).ok_or_else(|| ApiError::bad_request("name requerido"))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.starts_with("image/"))
        .ok_or_else(|| ApiError::bad_request("Se esperaba una imagen"))?
        .to_string();

    match state.images.upload(&name, &content_type, bytes.to_vec()).await {
        Ok(url) => Ok(Json(json!({ "url": url }))),
        Err(ImageHostError::Empty) => Err(ApiError::bad_request("Imagen vacía")),
        Err(e) => {
            error!(name = %name, error = %e, "image upload failed");
            Err(ApiError::internal())
        }
    }
}
