//! Order domain: value objects, aggregates, the status machine and pricing.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod status;
pub mod value_objects;
pub mod zones;
