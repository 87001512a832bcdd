//! Product read model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::domain::aggregates::stock::{size_stock, SizeStock};
use crate::domain::value_objects::Money;

/// Catalog row as the storefront reads it; the backend owns writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub is_on_sale: bool,
    pub images: Vec<String>,
    pub category_id: Option<String>,
    pub colors: Vec<String>,
    pub sizes: Option<Value>,
    pub stock: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn price(&self) -> Money { Money::from_minor(self.price) }

    /// Price actually charged: the sale price while the product is on sale.
    pub fn effective_price(&self) -> Money {
        match (self.is_on_sale, self.sale_price) {
            (true, Some(sale)) => Money::from_minor(sale),
            _ => self.price(),
        }
    }

    pub fn primary_image(&self) -> Option<&str> { self.images.first().map(String::as_str) }

    pub fn discount_percent(&self) -> Option<u32> {
        let sale = self.sale_price.filter(|_| self.is_on_sale)?;
        discount_percent(self.price, sale)
    }

    pub fn size_stock(&self, declared: &[String]) -> Vec<SizeStock> {
        let total = self.stock.and_then(|s| u32::try_from(s).ok());
        size_stock(self.sizes.as_ref(), total, declared)
    }
}

/// `round((1 - sale / price) * 100)`; `None` when the price is not positive.
pub fn discount_percent(price: i64, sale: i64) -> Option<u32> {
    if price <= 0 { return None; }
    let pct = (1.0 - sale as f64 / price as f64) * 100.0;
    Some(pct.round().clamp(0.0, 100.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Product {
        Product {
            id: "p1".into(), name: "Camisa".into(), slug: "camisa".into(), price: 4000,
            sale_price: Some(3000), is_on_sale: true, images: vec!["https://cdn/x.jpg".into()],
            category_id: None, colors: vec![], sizes: Some(json!({"M": 3})), stock: None, created_at: Utc::now(),
        }
    }

    #[test]
    fn test_discount_percent() {
        assert_eq!(discount_percent(4000, 3000), Some(25));
        assert_eq!(discount_percent(2999, 1999), Some(33));
        assert_eq!(discount_percent(0, 100), None);
        assert_eq!(product().discount_percent(), Some(25));
    }

    #[test]
    fn test_effective_price_requires_sale_flag() {
        let mut p = product();
        assert_eq!(p.effective_price(), Money::from_minor(3000));
        p.is_on_sale = false;
        assert_eq!(p.effective_price(), Money::from_minor(4000));
        assert_eq!(p.discount_percent(), None);
    }

    #[test]
    fn test_size_stock_from_product() {
        let rows = product().size_stock(&[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock, 3);
        assert_eq!(product().primary_image(), Some("https://cdn/x.jpg"));
    }
}
