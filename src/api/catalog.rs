use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{ApiError, ApiResult, AppState};
use crate::domain::aggregates::{Product, SizeStock};
use crate::domain::value_objects::ProductId;

/// Upper bound on ids accepted by one stock query.
const MAX_STOCK_IDS: usize = 100;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "storefront" }))
}

/// Search index entry: the catalog fields the client-side search needs.
#[derive(Debug, Serialize)]
pub struct SearchEntry {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub is_on_sale: bool,
    pub images: Vec<String>,
    pub category_id: Option<String>,
    pub colors: Vec<String>,
    pub discount_percent: Option<u32>,
    pub effective_price: i64,
    pub sizes: Vec<SizeStock>,
}

impl From<Product> for SearchEntry {
    fn from(p: Product) -> Self {
        let discount_percent = p.discount_percent();
        let effective_price = p.effective_price().minor();
        let sizes = p.size_stock(&[]);
        Self {
            id: p.id,
            name: p.name,
            slug: p.slug,
            price: p.price,
            sale_price: p.sale_price,
            is_on_sale: p.is_on_sale,
            images: p.images,
            category_id: p.category_id,
            colors: p.colors,
            discount_percent,
            effective_price,
            sizes,
        }
    }
}

pub async fn search(State(state): State<AppState>) -> ApiResult<Json<Vec<SearchEntry>>> {
    let products = state.backend.list_products().await?;
    Ok(Json(products.into_iter().map(SearchEntry::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct StockParams {
    pub ids: Option<String>,
}

/// Stock keyed by the encoded cart key (`<productId>-<size>`).
pub async fn stock(State(state): State<AppState>, Query(params): Query<StockParams>) -> ApiResult<Json<HashMap<String, u32>>> {
    let mut ids: Vec<ProductId> = params
        .ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|raw| ProductId::new(raw).ok())
        .collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() { return Err(ApiError::bad_request("ids requerido")); }
    if ids.len() > MAX_STOCK_IDS { return Err(ApiError::bad_request("Demasiados productos")); }
    let snapshot = state.backend.stock_for(&ids).await?;
    Ok(Json(snapshot.to_encoded()))
}
