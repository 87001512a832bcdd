//! Stock snapshots and the ceilings derived from them

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use crate::domain::value_objects::{CartKey, ProductId, Size};

/// Below this many units a size is shown as running low.
pub const LOW_STOCK_THRESHOLD: u32 = 20;
/// Total assumed for legacy size arrays that carry no stock figure.
pub const LEGACY_DEFAULT_TOTAL: u32 = 50;
/// Per-size stock assumed when the backend has no size data at all.
pub const FALLBACK_SIZE_STOCK: u32 = 10;

/// Point-in-time available units per cart key. Possibly stale; never authoritative.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockSnapshot {
    units: HashMap<CartKey, u32>,
}

impl StockSnapshot {
    pub fn new() -> Self { Self::default() }
    pub fn insert(&mut self, key: CartKey, units: u32) { self.units.insert(key, units); }
    pub fn get(&self, key: &CartKey) -> Option<u32> { self.units.get(key).copied() }
    pub fn len(&self) -> usize { self.units.len() }
    pub fn is_empty(&self) -> bool { self.units.is_empty() }
    pub fn extend(&mut self, other: StockSnapshot) { self.units.extend(other.units); }

    /// Adds every size of one product from its backend `sizes` column.
    /// Only the object form carries real per-size counts; other shapes add nothing.
    pub fn insert_product(&mut self, product_id: &ProductId, sizes: &Value) {
        if let Value::Object(map) = sizes {
            for (size, stock) in map {
                let key = CartKey::new(product_id.clone(), Some(Size::new(size.as_str())));
                self.insert(key, stock_units(stock));
            }
        }
    }

    /// Encoded-key view for wire responses.
    pub fn to_encoded(&self) -> HashMap<String, u32> {
        self.units.iter().map(|(k, v)| (k.encode(), *v)).collect()
    }

    /// Whether one more unit of `key` fits. Keys with no entry are not limited.
    pub fn check_increment(&self, key: &CartKey, current: u32) -> Result<(), StockCeiling> {
        match self.get(key) {
            Some(available) if current.saturating_add(1) > available => {
                Err(StockCeiling { key: key.clone(), available, in_cart: current })
            }
            _ => Ok(()),
        }
    }
}

impl FromIterator<(CartKey, u32)> for StockSnapshot {
    fn from_iter<T: IntoIterator<Item = (CartKey, u32)>>(iter: T) -> Self {
        Self { units: iter.into_iter().collect() }
    }
}

/// Rejection of an increment that would exceed the known stock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockCeiling {
    pub key: CartKey,
    pub available: u32,
    pub in_cart: u32,
}

impl fmt::Display for StockCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Solo hay {} unidades disponibles", self.available)
    }
}

impl std::error::Error for StockCeiling {}

/// Stock of one size as shown on the product page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SizeStock {
    pub size: Size,
    pub stock: u32,
}

impl SizeStock {
    pub fn is_sold_out(&self) -> bool { self.stock == 0 }
    pub fn is_low(&self) -> bool { self.stock > 0 && self.stock < LOW_STOCK_THRESHOLD }
}

/// Per-size stock for a product page.
///
/// `sizes` is the backend column: either `{"S": 10, "M": 20}` or the older
/// `["S", "M"]`, where `total` is split evenly. When the column is missing the
/// product's declared sizes get [`FALLBACK_SIZE_STOCK`] each.
pub fn size_stock(sizes: Option<&Value>, total: Option<u32>, declared: &[String]) -> Vec<SizeStock> {
    let mut rows: Vec<SizeStock> = match sizes {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(size, stock)| SizeStock { size: Size::new(size.as_str()), stock: stock_units(stock) })
            .collect(),
        Some(Value::Array(list)) if !list.is_empty() => {
            let total = total.filter(|t| *t > 0).unwrap_or(LEGACY_DEFAULT_TOTAL);
            let per_size = total / u32::try_from(list.len()).unwrap_or(u32::MAX);
            list.iter().map(|s| SizeStock { size: Size::new(value_label(s)), stock: per_size }).collect()
        }
        _ => declared.iter().map(|s| SizeStock { size: Size::new(s.as_str()), stock: FALLBACK_SIZE_STOCK }).collect(),
    };
    rows.sort_by_key(|r| r.size.rank());
    rows
}

/// Why a product-page "add" was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddRejection {
    SoldOut,
    AtCeiling { available: u32, in_cart: u32 },
}

impl fmt::Display for AddRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SoldOut => write!(f, "Agotado"),
            Self::AtCeiling { available, in_cart } => write!(
                f,
                "No puedes añadir más. Solo hay {available} unidades disponibles y ya tienes {in_cart} en tu carrito."
            ),
        }
    }
}

/// Gate applied by the product page before adding one unit of a size.
pub fn check_add(stock: &SizeStock, in_cart: u32) -> Result<(), AddRejection> {
    if stock.is_sold_out() { return Err(AddRejection::SoldOut); }
    if in_cart >= stock.stock { return Err(AddRejection::AtCeiling { available: stock.stock, in_cart }); }
    Ok(())
}

fn stock_units(v: &Value) -> u32 {
    match v {
        Value::Number(n) => n.as_u64().map_or_else(
            || n.as_f64().filter(|f| *f > 0.0).map_or(0, |f| f.floor().min(f64::from(u32::MAX)) as u32),
            |u| u32::try_from(u).unwrap_or(u32::MAX),
        ),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
