use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{require_user, validate, ApiError, ApiResult, AppState};
use crate::checkout::{account_id, metadata_keys};
use crate::domain::aggregates::{Order, OrderError, OrderItem, OrderStatus, ShippingAddress};
use crate::domain::value_objects::Money;
use crate::services::email::{order_confirmation, send_in_background};
use crate::services::payments::CompletedSession;

#[derive(Debug, Deserialize, Validate)]
pub struct CancelBody {
    #[serde(alias = "orderId", default)]
    #[validate(length(min = 1, message = "ID de pedido requerido"))]
    pub order_id: String,
    pub reason: Option<String>,
}

/// Customer-initiated cancellation ("return") of an order that has not shipped.
pub async fn cancel(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CancelBody>) -> ApiResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate(&body)?;

    let mut order = state
        .backend
        .find_order(&body.order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Pedido no encontrado"))?;

    order.cancel_by_customer(&user.id, body.reason.as_deref()).map_err(|e| match e {
        OrderError::NotOwner => ApiError::forbidden("No tienes permiso para modificar este pedido"),
        _ => ApiError::bad_request("Este pedido ya no puede ser cancelado porque ha sido enviado o ya está finalizado."),
    })?;

    let reason = body.reason.as_deref().filter(|r| !r.trim().is_empty()).unwrap_or("Sin especificar");
    let notes = format!("Cancelación solicitada por usuario. Razón: {reason}");
    if let Err(e) = state.backend.update_order(&order, Some(&notes)).await {
        error!(order_id = %order.id(), error = %e, "failed to cancel order");
        return Err(ApiError::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "Error al procesar la cancelación"));
    }
    let history = format!("Cancelado por el usuario. Razón: {reason}");
    if let Err(e) = state.backend.append_status_history(order.id(), OrderStatus::Cancelled.as_str(), &history, Some(&user.id)).await {
        warn!(order_id = %order.id(), error = %e, "could not record status history");
    }
    state.events.publish_all(order.take_events()).await;

    info!(order_id = %order.id(), user_id = %user.id, "order cancelled by customer");
    Ok(Json(json!({
        "success": true,
        "message": "Pedido cancelado correctamente. El reembolso se procesará en breve.",
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct FinalizeBody {
    #[serde(alias = "sessionId", default)]
    #[validate(length(min = 1, message = "session_id requerido"))]
    pub session_id: String,
}

fn shipping_from(session: &CompletedSession) -> Option<ShippingAddress> {
    let field = |key: &str| session.metadata.get(key).cloned().unwrap_or_default();
    let full_name = field(metadata_keys::FULL_NAME);
    if full_name.is_empty() { return None; }
    Some(ShippingAddress {
        full_name,
        phone: field(metadata_keys::PHONE),
        address: field(metadata_keys::ADDRESS),
        city: field(metadata_keys::CITY),
        postal_code: field(metadata_keys::POSTAL_CODE),
    })
}

/// Builds the order a paid session describes. Fails when the session has no customer email.
pub fn order_from_session(session: &CompletedSession) -> Option<Order> {
    let email = session.customer_email.clone().filter(|e| !e.is_empty())?;
    let user_id = account_id(session.metadata.get(metadata_keys::USER_ID).map(String::as_str));
    let items = session
        .line_items
        .iter()
        .map(|li| OrderItem {
            product_id: li.product_metadata.get("product_id").cloned().filter(|p| !p.is_empty()),
            name: li.product_metadata.get("original_name").cloned().unwrap_or_else(|| li.description.clone()),
            size: li.product_metadata.get("size").cloned().filter(|s| !s.is_empty()),
            quantity: li.quantity,
            unit_price: Money::from_minor(li.unit_amount),
        })
        .collect();
    let order = Order::from_payment(Uuid::new_v4().to_string(), session.id.clone(), email, user_id, items, Money::from_minor(session.amount_total))
        .with_shipping(shipping_from(session));
    Some(order)
}

/// Persists the order for a paid session. Safe to call more than once per session.
pub async fn finalize(State(state): State<AppState>, Json(body): Json<FinalizeBody>) -> ApiResult<Json<Value>> {
    validate(&body)?;
    let session = state.payments.retrieve_session(body.session_id.clone()).await.map_err(|e| {
        error!(session_id = %body.session_id, error = %e, "could not retrieve payment session");
        ApiError::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "Error al verificar el pago")
    })?;
    if !session.paid {
        return Err(ApiError::bad_request("El pago no se ha completado"));
    }
    let mut order = order_from_session(&session).ok_or_else(|| ApiError::bad_request("Sesión de pago sin email"))?;

    if !state.backend.insert_order(&order).await? {
        info!(session_id = %session.id, "order already recorded for session");
        return Ok(Json(json!({ "success": true, "alreadyProcessed": true })));
    }

    let customer_name = order.shipping_address().map(|a| a.full_name.clone()).unwrap_or_else(|| "Cliente".to_string());
    send_in_background(state.mailer.clone(), order_confirmation(&order, &customer_name, &state.settings.site_url));
    state.events.publish_all(order.take_events()).await;

    info!(order_id = %order.id(), session_id = %session.id, total = order.total().minor(), "order finalized");
    Ok(Json(json!({ "success": true, "orderId": order.id() })))
}
