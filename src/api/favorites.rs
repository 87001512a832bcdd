use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use validator::Validate;

use super::{current_user, require_user, validate, ApiError, ApiResult, AppState};
use crate::services::backend::BackendError;

#[derive(Debug, Deserialize, Validate)]
pub struct FavoriteBody {
    #[serde(alias = "productId", default)]
    #[validate(length(min = 1, message = "productId requerido"))]
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteQuery {
    #[serde(alias = "productId")]
    pub product_id: Option<String>,
}

pub async fn add(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<FavoriteBody>) -> ApiResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate(&body)?;
    match state.backend.add_favorite(&user.id, &body.product_id).await {
        Ok(()) => Ok(Json(json!({ "success": true }))),
        Err(BackendError::Duplicate) => {
            debug!(user_id = %user.id, product_id = %body.product_id, "favorite already present");
            Ok(Json(json!({ "success": true, "message": "Ya está en favoritos" })))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn remove(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<FavoriteBody>) -> ApiResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate(&body)?;
    state.backend.remove_favorite(&user.id, &body.product_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Anonymous callers get a negative answer rather than an error.
pub async fn status(State(state): State<AppState>, headers: HeaderMap, Query(query): Query<FavoriteQuery>) -> ApiResult<Json<Value>> {
    let anonymous = Json(json!({ "isFavorite": false, "authenticated": false }));
    let user = match current_user(&state, &headers).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(anonymous),
        Err(e) => {
            warn!(status = %e.status, "treating failed auth lookup as anonymous");
            return Ok(anonymous);
        }
    };
    let product_id = query
        .product_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("productId requerido"))?;
    let is_favorite = state.backend.is_favorite(&user.id, &product_id).await?;
    Ok(Json(json!({ "isFavorite": is_favorite, "authenticated": true })))
}
