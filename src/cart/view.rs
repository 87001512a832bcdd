//! Stock-aware cart panel state.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{CartPersistence, CartStore};
use crate::domain::aggregates::{StockCeiling, StockSnapshot};
use crate::domain::value_objects::{CartKey, ProductId};
use crate::services::backend::StockLookup;

/// How long a stock notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

pub const CART_PATH: &str = "/carrito";
pub const LOGIN_FOR_CHECKOUT_PATH: &str = "/login?redirect=/carrito";

/// A message that clears itself after [`NOTICE_TTL`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientNotice {
    message: String,
    expires_at: Instant,
}

impl TransientNotice {
    pub fn new(message: impl Into<String>, now: Instant) -> Self {
        Self { message: message.into(), expires_at: now + NOTICE_TTL }
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn is_expired_at(&self, now: Instant) -> bool { now >= self.expires_at }
}

/// Where the checkout button leads.
pub fn checkout_destination(authenticated: bool) -> &'static str {
    if authenticated { CART_PATH } else { LOGIN_FOR_CHECKOUT_PATH }
}

/// Panel state layered over a [`CartStore`]: the cached stock snapshot and
/// the current notice. Increments read whatever snapshot is cached, even a
/// partial one; keys without an entry are never limited.
#[derive(Clone, Debug, Default)]
pub struct CartView {
    snapshot: StockSnapshot,
    notice: Option<TransientNotice>,
}

impl CartView {
    pub fn new() -> Self { Self::default() }

    pub fn with_snapshot(snapshot: StockSnapshot) -> Self { Self { snapshot, notice: None } }

    pub fn snapshot(&self) -> &StockSnapshot { &self.snapshot }

    /// Fetches stock for the distinct products in the cart. On failure the
    /// previous snapshot stays in place.
    pub async fn refresh_stock<P, L>(&mut self, store: &CartStore<P>, lookup: &L)
    where
        P: CartPersistence,
        L: StockLookup + ?Sized,
    {
        let ids: Vec<ProductId> = store
            .lines()
            .iter()
            .map(|l| l.key.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() { return; }
        match lookup.stock_for(&ids).await {
            Ok(snapshot) => {
                debug!(products = ids.len(), entries = snapshot.len(), "stock snapshot refreshed");
                self.snapshot = snapshot;
            }
            Err(e) => warn!(error = %e, "stock lookup failed, keeping previous snapshot"),
        }
    }

    /// One more unit of `key`, unless the snapshot says it is not there.
    /// Keys not in the cart are left alone and report 0.
    pub fn increment<P: CartPersistence>(&mut self, store: &mut CartStore<P>, key: &CartKey) -> Result<u32, StockCeiling> {
        self.increment_at(store, key, Instant::now())
    }

    pub fn increment_at<P: CartPersistence>(&mut self, store: &mut CartStore<P>, key: &CartKey, now: Instant) -> Result<u32, StockCeiling> {
        let current = store.quantity(key);
        if current == 0 { return Ok(0); }
        if let Err(ceiling) = self.snapshot.check_increment(key, current) {
            self.notice = Some(TransientNotice::new(ceiling.to_string(), now));
            return Err(ceiling);
        }
        store.set_quantity(key, i64::from(current) + 1);
        Ok(store.quantity(key))
    }

    pub fn decrement<P: CartPersistence>(&mut self, store: &mut CartStore<P>, key: &CartKey) -> u32 {
        let current = store.quantity(key);
        store.set_quantity(key, i64::from(current) - 1);
        store.quantity(key)
    }

    pub fn remove<P: CartPersistence>(&mut self, store: &mut CartStore<P>, key: &CartKey) {
        store.remove(key);
    }

    pub fn notice(&self) -> Option<&str> { self.notice_at(Instant::now()) }

    pub fn notice_at(&self, now: Instant) -> Option<&str> {
        self.notice.as_ref().filter(|n| !n.is_expired_at(now)).map(TransientNotice::message)
    }

    pub fn dismiss_notice(&mut self) { self.notice = None; }
}
