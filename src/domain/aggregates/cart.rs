//! Cart Aggregate

use serde::{Deserialize, Serialize};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CartKey, Money, ProductId, Size};

/// Suffix the product page appends to a line's display name.
pub const SIZE_LABEL: &str = " - Talla ";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub key: CartKey,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartLine {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

/// Everything needed to add a product to the cart, minus the quantity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub size: Option<Size>,
    pub image: Option<String>,
}

impl NewCartItem {
    /// Builds the item the product page adds: the size is folded into the display name.
    pub fn sized(product_id: ProductId, product_name: &str, price: Money, size: Size, image: Option<String>) -> Self {
        Self {
            name: format!("{product_name}{SIZE_LABEL}{size}"),
            product_id, price, size: Some(size), image,
        }
    }

    pub fn key(&self) -> CartKey { CartKey::new(self.product_id.clone(), self.size.clone()) }
}

/// Sum of `price * quantity` over `lines`.
pub fn total(lines: &[CartLine]) -> Money {
    lines.iter().fold(Money::ZERO, |acc, l| acc.add(l.line_total()))
}

/// Sum of quantities over `lines`.
pub fn count(lines: &[CartLine]) -> u64 {
    lines.iter().map(|l| u64::from(l.quantity)).sum()
}

/// In-memory cart state. Totals are derived on every read.
#[derive(Clone, Debug, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
    open: bool,
    events: Vec<DomainEvent>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from stored lines, dropping any with quantity below one.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
        for line in lines.into_iter().filter(|l| l.quantity >= 1) {
            match merged.iter_mut().find(|m| m.key == line.key) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => merged.push(line),
            }
        }
        Self { lines: merged, open: false, events: vec![] }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn get(&self, key: &CartKey) -> Option<&CartLine> { self.lines.iter().find(|l| &l.key == key) }
    pub fn quantity(&self, key: &CartKey) -> u32 { self.get(key).map_or(0, |l| l.quantity) }
    pub fn total(&self) -> Money { total(&self.lines) }
    pub fn count(&self) -> u64 { count(&self.lines) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn is_open(&self) -> bool { self.open }
    pub fn set_open(&mut self, open: bool) { self.open = open; }

    /// Adds one unit of `item`, merging into an existing line with the same key.
    pub fn add(&mut self, item: NewCartItem) -> u32 {
        let key = item.key();
        let quantity = match self.lines.iter_mut().find(|l| l.key == key) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(1);
                existing.quantity
            }
            None => {
                self.lines.push(CartLine { key: key.clone(), name: item.name, price: item.price, quantity: 1, image: item.image });
                1
            }
        };
        self.open = true;
        self.raise_event(DomainEvent::Cart(CartEvent::LineAdded { key, quantity }));
        quantity
    }

    /// Removes the line if present. Returns whether anything was removed.
    pub fn remove(&mut self, key: &CartKey) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.key != key);
        let removed = self.lines.len() != before;
        if removed { self.raise_event(DomainEvent::Cart(CartEvent::LineRemoved { key: key.clone() })); }
        removed
    }

    /// Overwrites the quantity; anything below one removes the line.
    /// Absent keys are left alone.
    pub fn set_quantity(&mut self, key: &CartKey, quantity: i64) -> bool {
        if quantity < 1 { return self.remove(key); }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        let Some(line) = self.lines.iter_mut().find(|l| &l.key == key) else { return false };
        line.quantity = quantity;
        self.raise_event(DomainEvent::Cart(CartEvent::QuantityChanged { key: key.clone(), quantity }));
        true
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.raise_event(DomainEvent::Cart(CartEvent::Cleared));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}
