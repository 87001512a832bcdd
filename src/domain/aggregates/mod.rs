//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod stock;

pub use product::Product;
pub use order::{Order, OrderError, OrderItem, OrderStatus, ShippingAddress};
pub use cart::{Cart, CartLine, NewCartItem};
pub use stock::{SizeStock, StockCeiling, StockSnapshot};
