//! Order persistence.
//!
//! One store object is built at start-up and shared by every handler. Updates
//! touch one order at a time; status and carrier handoff writes are
//! conditional so concurrent writers cannot clobber each other.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::aggregates::{CarrierHandoff, Order};
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{OrderId, TrackingId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} already exists")]
    Duplicate(String),

    #[error("tracking {0} belongs to another order")]
    DuplicateTracking(String),

    #[error("stored order {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of the write-once carrier handoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandoffWrite {
    Written,
    AlreadySet(TrackingId),
    NotFound,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] rather than overwriting.
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    async fn get(&self, id: &OrderId) -> StoreResult<Option<Order>>;

    /// Most recent first.
    async fn list(&self) -> StoreResult<Vec<Order>>;

    async fn find_by_tracking(&self, tracking: &TrackingId) -> StoreResult<Option<Order>>;

    /// Every order carrying a tracking number, terminal ones included.
    async fn list_tracked(&self) -> StoreResult<Vec<Order>>;

    /// Sets `new` only if the stored status is still `expected`.
    async fn update_status(&self, id: &OrderId, expected: OrderStatus, new: OrderStatus) -> StoreResult<bool>;

    /// Writes tracking and submission time only if no tracking is stored yet.
    /// A tracking number held by another order fails with
    /// [`StoreError::DuplicateTracking`].
    async fn set_carrier_handoff(&self, id: &OrderId, handoff: &CarrierHandoff) -> StoreResult<HandoffWrite>;

    async fn delete(&self, id: &OrderId) -> StoreResult<bool>;
}

/// Picks Postgres when a database URL is configured, memory otherwise.
pub async fn init_store(database_url: Option<&str>) -> StoreResult<Arc<dyn OrderStore>> {
    match database_url {
        Some(url) => {
            let store = PgOrderStore::connect(url).await?;
            info!("Order store: PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set: orders are kept in memory and lost on restart");
            Ok(Arc::new(MemoryOrderStore::new()))
        }
    }
}
