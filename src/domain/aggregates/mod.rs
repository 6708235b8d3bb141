//! Aggregates module
pub mod cart;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem};
pub use order::{CarrierHandoff, Customer, Delivery, LineItem, Order, OrderDraft, StopDesk};
pub use product::Product;
