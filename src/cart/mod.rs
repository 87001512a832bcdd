//! Cart Store
//!
//! The only authority for cart mutations. Wraps the in-memory [`Cart`]
//! aggregate and writes every change through a [`CartPersistence`] backend.
//! Writes that fail are logged and the in-memory state stays authoritative.

mod persistence;
mod view;

pub use persistence::{decode, encode, CartPersistence, FilePersistence, MemoryPersistence, DEFAULT_ENTRY, FORMAT_VERSION};
pub use view::{checkout_destination, CartView, TransientNotice, CART_PATH, LOGIN_FOR_CHECKOUT_PATH, NOTICE_TTL};

use thiserror::Error;
use tracing::warn;

use crate::domain::aggregates::stock::{check_add, AddRejection};
use crate::domain::aggregates::{Cart, CartLine, NewCartItem, SizeStock};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{CartKey, Money};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cart storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cart storage content unreadable: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported cart storage version {0}")]
    UnsupportedVersion(u32),
}

pub struct CartStore<P: CartPersistence> {
    cart: Cart,
    persistence: P,
}

impl<P: CartPersistence> CartStore<P> {
    /// Loads whatever the backend holds. Unreadable content starts an empty cart.
    pub fn open(persistence: P) -> Self {
        let lines = persistence.load().unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable stored cart");
            Vec::new()
        });
        Self { cart: Cart::from_lines(lines), persistence }
    }

    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn total(&self) -> Money { self.cart.total() }
    pub fn count(&self) -> u64 { self.cart.count() }
    pub fn quantity(&self, key: &CartKey) -> u32 { self.cart.quantity(key) }
    pub fn is_empty(&self) -> bool { self.cart.is_empty() }
    pub fn is_open(&self) -> bool { self.cart.is_open() }
    pub fn open_panel(&mut self) { self.cart.set_open(true); }
    pub fn close_panel(&mut self) { self.cart.set_open(false); }
    pub fn persistence(&self) -> &P { &self.persistence }

    /// Adds one unit. No stock check happens here.
    pub fn add(&mut self, item: NewCartItem) -> u32 {
        let quantity = self.cart.add(item);
        self.persist();
        quantity
    }

    /// Product-page add: refused when the size is sold out or already at its stock.
    pub fn add_within_stock(&mut self, item: NewCartItem, stock: &SizeStock) -> Result<u32, AddRejection> {
        check_add(stock, self.quantity(&item.key()))?;
        Ok(self.add(item))
    }

    pub fn remove(&mut self, key: &CartKey) {
        if self.cart.remove(key) { self.persist(); }
    }

    /// Below one removes the line. No upper bound is enforced.
    pub fn set_quantity(&mut self, key: &CartKey, quantity: i64) {
        if self.cart.set_quantity(key, quantity) { self.persist(); }
    }

    pub fn clear(&mut self) {
        self.cart.clear();
        self.persist();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { self.cart.take_events() }

    fn persist(&self) {
        if let Err(e) = self.persistence.save(self.cart.lines()) {
            warn!(error = %e, lines = self.cart.lines().len(), "failed to persist cart");
        }
    }
}
