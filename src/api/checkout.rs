use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use tracing::warn;
use validator::Validate;

use super::{current_user, validate, ApiError, ApiResult, AppState};
use crate::checkout::account_id;
use crate::domain::aggregates::{CartLine, ShippingAddress};
use crate::domain::value_objects::{CartKey, Money, ProductId, Size};
use crate::services::payments::PaymentSession;

/// One cart line as the client sends it. Either the explicit key fields or
/// the older single-string `id` may be present.
#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub size: Option<String>,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
    pub image: Option<String>,
}

impl CheckoutItem {
    fn into_line(self) -> ApiResult<CartLine> {
        let key = match (self.product_id, self.id) {
            (Some(pid), _) => ProductId::new(pid).map(|pid| CartKey::new(pid, self.size.map(Size::new))),
            (None, Some(id)) => CartKey::parse_legacy(&id),
            (None, None) => return Err(ApiError::bad_request("Producto sin identificador")),
        }
        .map_err(|_| ApiError::bad_request("Producto sin identificador"))?;
        if self.price < 0 { return Err(ApiError::bad_request("Precio inválido")); }
        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| ApiError::bad_request("Cantidad inválida"))?;
        Ok(CartLine { key, name: self.name, price: Money::from_minor(self.price), quantity, image: self.image })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ShippingDetails {
    #[validate(length(min = 1, message = "Nombre requerido"))]
    pub full_name: String,
    #[validate(length(min = 6, message = "Teléfono inválido"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Dirección requerida"))]
    pub address: String,
    #[validate(length(min = 1, message = "Ciudad requerida"))]
    pub city: String,
    #[validate(length(min = 4, max = 10, message = "Código postal inválido"))]
    pub postal_code: String,
}

impl From<ShippingDetails> for ShippingAddress {
    fn from(s: ShippingDetails) -> Self {
        Self { full_name: s.full_name, phone: s.phone, address: s.address, city: s.city, postal_code: s.postal_code }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub shipping: Option<ShippingDetails>,
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

pub async fn create_session(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CheckoutBody>) -> ApiResult<Json<PaymentSession>> {
    if let Some(shipping) = &body.shipping { validate(shipping)?; }
    let lines = body.items.into_iter().map(CheckoutItem::into_line).collect::<ApiResult<Vec<_>>>()?;
    let shipping = body.shipping.map(ShippingAddress::from);

    // A signed-in session wins over whatever user id the client claims.
    let user_id = match current_user(&state, &headers).await {
        Ok(Some(user)) => Some(user.id),
        Ok(None) => account_id(body.user_id.as_deref()),
        Err(e) => {
            warn!(status = %e.status, "auth lookup failed at checkout, using client user id");
            account_id(body.user_id.as_deref())
        }
    };

    let session = state.checkout().initiate(&lines, shipping.as_ref(), user_id.as_deref()).await?;
    Ok(Json(session))
}
