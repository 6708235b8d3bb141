//! In-memory order store for tests and local development.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::aggregates::{CarrierHandoff, Order};
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{OrderId, TrackingId};
use crate::store::{HandoffWrite, OrderStore, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<Vec<Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.id() == order.id()) {
            return Err(StoreError::Duplicate(order.id().to_string()));
        }
        let mut stored = order.clone();
        stored.take_events();
        orders.push(stored);
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.id() == id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Order>> {
        let mut orders = self.orders.read().await.clone();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(a.id())));
        Ok(orders)
    }

    async fn find_by_tracking(&self, tracking: &TrackingId) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.tracking() == Some(tracking)).cloned())
    }

    async fn list_tracked(&self) -> StoreResult<Vec<Order>> {
        Ok(self.orders.read().await.iter().filter(|o| o.tracking().is_some()).cloned().collect())
    }

    async fn update_status(&self, id: &OrderId, expected: OrderStatus, new: OrderStatus) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.iter_mut().find(|o| o.id() == id) else { return Ok(false) };
        if order.status() != expected { return Ok(false); }
        *order = Order::restore(
            order.id().clone(), order.confirmation_code().clone(), order.to_draft(), new,
            order.carrier().cloned(), order.created_at(),
        );
        Ok(true)
    }

    async fn set_carrier_handoff(&self, id: &OrderId, handoff: &CarrierHandoff) -> StoreResult<HandoffWrite> {
        let mut orders = self.orders.write().await;
        let Some(index) = orders.iter().position(|o| o.id() == id) else { return Ok(HandoffWrite::NotFound) };
        if let Some(existing) = orders[index].tracking() { return Ok(HandoffWrite::AlreadySet(existing.clone())); }
        if orders.iter().any(|o| o.tracking() == Some(&handoff.tracking)) {
            return Err(StoreError::DuplicateTracking(handoff.tracking.to_string()));
        }
        let order = &mut orders[index];
        *order = Order::restore(
            order.id().clone(), order.confirmation_code().clone(), order.to_draft(), order.status(),
            Some(handoff.clone()), order.created_at(),
        );
        Ok(HandoffWrite::Written)
    }

    async fn delete(&self, id: &OrderId) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|o| o.id() != id);
        Ok(orders.len() != before)
    }
}
