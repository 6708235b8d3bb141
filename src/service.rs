//! Order use cases behind the HTTP API.
//!
//! Every mutation goes through the aggregate first (validation, events) and is
//! then written with a conditional store update. Events are published only
//! after the write succeeded.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::carrier::{Carrier, StopDeskInfo};
use crate::catalog::Catalog;
use crate::domain::aggregates::{CarrierHandoff, Cart, Customer, Delivery, Order, OrderDraft};
use crate::domain::events::{EventEnvelope, OrderEvent};
use crate::domain::pricing;
use crate::domain::status::{Actor, OrderStatus, Transition};
use crate::domain::value_objects::{ConfirmationCode, OrderId, TrackingId, ZoneCode};
use crate::store::{HandoffWrite, OrderStore};
use crate::{OrdersError, Result};

const MAX_STATUS_ATTEMPTS: usize = 5;

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    carrier: Option<Arc<dyn Carrier>>,
    catalog: Arc<RwLock<Catalog>>,
    nats: Option<async_nats::Client>,
    in_flight: Mutex<HashSet<OrderId>>,
}

/// Marks an order as being submitted for as long as it lives.
struct Submission<'a> {
    in_flight: &'a Mutex<HashSet<OrderId>>,
    id: OrderId,
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, catalog: Catalog) -> Self {
        Self { store, carrier: None, catalog: Arc::new(RwLock::new(catalog)), nats: None, in_flight: Mutex::new(HashSet::new()) }
    }

    pub fn with_carrier(mut self, carrier: Arc<dyn Carrier>) -> Self { self.carrier = Some(carrier); self }
    pub fn with_nats(mut self, nats: Option<async_nats::Client>) -> Self { self.nats = nats; self }

    pub fn store(&self) -> &Arc<dyn OrderStore> { &self.store }
    pub fn catalog(&self) -> &Arc<RwLock<Catalog>> { &self.catalog }

    pub fn carrier(&self) -> Result<&Arc<dyn Carrier>> {
        self.carrier.as_ref().ok_or(OrdersError::CarrierNotConfigured)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Stores a draft priced elsewhere. Both identifiers are required.
    pub async fn create_order(&self, id: Option<&str>, confirmation_code: Option<&str>, draft: OrderDraft) -> Result<Order> {
        let id = id.and_then(OrderId::new).ok_or(OrdersError::MissingField("id"))?;
        let code = confirmation_code.and_then(ConfirmationCode::new).ok_or(OrdersError::MissingField("confirmation_code"))?;
        self.place(Order::place(id, code, draft, Utc::now())?).await
    }

    /// Prices the cart against the current catalog and places the order.
    pub async fn checkout(&self, cart: &Cart, customer: Customer, delivery: Delivery) -> Result<Order> {
        let draft = {
            let catalog = self.catalog.read().await;
            pricing::snapshot(cart, &catalog, customer, delivery)?
        };
        self.place(Order::place(OrderId::generate(), ConfirmationCode::generate(), draft, Utc::now())?).await
    }

    async fn place(&self, mut order: Order) -> Result<Order> {
        self.store.insert(&order).await?;
        info!(order_id = %order.id(), total = %order.total(), items = order.items().len(), "order placed");
        self.publish(order.take_events()).await;
        Ok(order)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn list_orders(&self) -> Result<Vec<Order>> { Ok(self.store.list().await?) }

    pub async fn get_order(&self, id: &OrderId) -> Result<Order> {
        self.store.get(id).await?.ok_or_else(|| OrdersError::OrderNotFound(id.to_string()))
    }

    /// `None` when no order carries the tracking number.
    pub async fn find_by_tracking(&self, tracking: &str) -> Result<Option<Order>> {
        match TrackingId::new(tracking) {
            Some(tracking) => Ok(self.store.find_by_tracking(&tracking).await?),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Operator status change. The status string is validated before the
    /// order is read.
    pub async fn set_status(&self, id: &OrderId, status: Option<&str>) -> Result<Order> {
        let to: OrderStatus = status.ok_or(OrdersError::MissingField("status"))?.parse()?;
        let (order, _) = self.change_status(id, to, Actor::Operator).await?;
        Ok(order)
    }

    /// Applies a transition with compare-and-set, re-reading the order when
    /// another writer got there first.
    pub async fn change_status(&self, id: &OrderId, to: OrderStatus, actor: Actor) -> Result<(Order, Transition)> {
        for _ in 0..MAX_STATUS_ATTEMPTS {
            let mut order = self.get_order(id).await?;
            let from = order.status();
            let transition = order.apply_status(to, actor)?;
            if !transition.is_applied() {
                debug!(order_id = %id, status = %from, requested = %to, ?actor, "status unchanged");
                return Ok((order, transition));
            }
            if self.store.update_status(id, from, to).await? {
                info!(order_id = %id, from = %from, to = %to, ?actor, "order status changed");
                self.publish(order.take_events()).await;
                return Ok((order, transition));
            }
            debug!(order_id = %id, "status changed concurrently, retrying");
        }
        Err(OrdersError::Storage(format!("order {id} kept changing while updating its status")))
    }

    // =========================================================================
    // Carrier
    // =========================================================================

    /// Records a tracking number obtained outside this service.
    pub async fn set_carrier_tracking(&self, id: &OrderId, tracking: Option<&str>, submitted_at: Option<DateTime<Utc>>) -> Result<Order> {
        let tracking = tracking.and_then(TrackingId::new).ok_or(OrdersError::MissingField("tracking"))?;
        let submitted_at = submitted_at.ok_or(OrdersError::MissingField("submitted_at"))?;
        let mut order = self.get_order(id).await?;
        let handoff = CarrierHandoff { tracking, submitted_at };
        order.record_handoff(handoff.clone())?;
        self.write_handoff(&mut order, &handoff).await?;
        Ok(order)
    }

    /// Creates the parcel at the carrier and stores its tracking number.
    ///
    /// Two concurrent calls for the same order never both reach the carrier:
    /// the second one fails with [`OrdersError::SubmissionInProgress`].
    pub async fn submit_to_carrier(&self, id: &OrderId) -> Result<Order> {
        let carrier = self.carrier()?.clone();
        let _submission = self.claim_submission(id)?;

        let mut order = self.get_order(id).await?;
        if let Some(tracking) = order.tracking() {
            info!(order_id = %id, %tracking, "order already handed to carrier");
            return Err(OrdersError::AlreadySubmitted { order_id: id.to_string(), tracking: tracking.clone() });
        }

        let tracking = carrier.submit_parcel(&order).await.map_err(|e| {
            warn!(order_id = %id, error = %e, "carrier submission failed");
            OrdersError::from(e)
        })?;
        let handoff = CarrierHandoff { tracking, submitted_at: Utc::now() };
        order.record_handoff(handoff.clone())?;
        self.write_handoff(&mut order, &handoff).await?;
        Ok(order)
    }

    async fn write_handoff(&self, order: &mut Order, handoff: &CarrierHandoff) -> Result<()> {
        let id = order.id().clone();
        match self.store.set_carrier_handoff(&id, handoff).await? {
            HandoffWrite::Written => {
                info!(order_id = %id, tracking = %handoff.tracking, "order handed to carrier");
                self.publish(order.take_events()).await;
                Ok(())
            }
            HandoffWrite::AlreadySet(existing) => {
                warn!(order_id = %id, tracking = %handoff.tracking, %existing, "order was tracked concurrently; new tracking discarded");
                Err(OrdersError::AlreadySubmitted { order_id: id.to_string(), tracking: existing })
            }
            HandoffWrite::NotFound => {
                warn!(order_id = %id, tracking = %handoff.tracking, "order deleted during carrier handoff");
                Err(OrdersError::OrderNotFound(id.to_string()))
            }
        }
    }

    fn claim_submission(&self, id: &OrderId) -> Result<Submission<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id.clone()) {
            return Err(OrdersError::SubmissionInProgress(id.to_string()));
        }
        Ok(Submission { in_flight: &self.in_flight, id: id.clone() })
    }

    pub async fn stop_desks(&self, zone: Option<&str>) -> Result<Vec<StopDeskInfo>> {
        let zone = zone.and_then(ZoneCode::new).ok_or(OrdersError::MissingField("zone"))?;
        Ok(self.carrier()?.stop_desks(&zone).await?)
    }

    // =========================================================================
    // Admin
    // =========================================================================

    pub async fn delete_order(&self, id: &OrderId) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(OrdersError::OrderNotFound(id.to_string()));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }

    async fn publish(&self, events: Vec<OrderEvent>) {
        let Some(nats) = &self.nats else { return };
        for event in events {
            let subject = event.subject();
            let envelope = EventEnvelope::from(event);
            let payload = match serde_json::to_vec(&envelope) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(subject, error = %e, "cannot encode order event");
                    continue;
                }
            };
            if let Err(e) = nats.publish(subject.to_string(), payload.into()).await {
                warn!(subject, order_id = %envelope.event.order_id(), error = %e, "failed to publish order event");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::carrier::{ensure_not_submitted, CarrierError};
    use crate::domain::aggregates::order::tests::draft;
    use crate::domain::aggregates::{CartItem, Product};
    use crate::domain::value_objects::{DeliveryMethod, Money};
    use crate::domain::zones::DeliveryPrices;
    use crate::store::MemoryOrderStore;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Carrier double: hands out one fixed tracking number and reports the
    /// statuses it was seeded with.
    pub(crate) struct FakeCarrier {
        tracking: String,
        statuses: Mutex<HashMap<TrackingId, String>>,
        failing: bool,
        delay: Duration,
        pub submissions: AtomicUsize,
        pub queries: AtomicUsize,
    }

    impl FakeCarrier {
        pub(crate) fn new(tracking: &str) -> Self {
            Self {
                tracking: tracking.into(), statuses: Mutex::new(HashMap::new()), failing: false,
                delay: Duration::ZERO, submissions: AtomicUsize::new(0), queries: AtomicUsize::new(0),
            }
        }
        pub(crate) fn failing(mut self) -> Self { self.failing = true; self }
        pub(crate) fn slow(mut self, delay: Duration) -> Self { self.delay = delay; self }
        pub(crate) fn report(&self, tracking: &str, raw: &str) {
            self.statuses.lock().unwrap().insert(TrackingId::new(tracking).unwrap(), raw.to_string());
        }
    }

    #[async_trait]
    impl Carrier for FakeCarrier {
        async fn submit_parcel(&self, order: &Order) -> std::result::Result<TrackingId, CarrierError> {
            ensure_not_submitted(order)?;
            if self.failing { return Err(CarrierError::Unavailable("connection refused".into())); }
            tokio::time::sleep(self.delay).await;
            self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(TrackingId::new(&self.tracking).unwrap())
        }

        async fn query_statuses(&self, trackings: &[TrackingId]) -> std::result::Result<HashMap<TrackingId, String>, CarrierError> {
            if trackings.is_empty() { return Ok(HashMap::new()); }
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.failing { return Err(CarrierError::Unavailable("connection refused".into())); }
            let statuses = self.statuses.lock().unwrap();
            Ok(trackings.iter().filter_map(|t| statuses.get(t).map(|s| (t.clone(), s.clone()))).collect())
        }

        async fn stop_desks(&self, zone: &ZoneCode) -> std::result::Result<Vec<StopDeskInfo>, CarrierError> {
            Ok(vec![StopDeskInfo { id: format!("{zone}0101"), name: "Agence centre".into(), address: None, zone: None }])
        }
    }

    pub(crate) fn catalog() -> Catalog {
        Catalog::new(vec![Product::create("ac-1", "Antichoc MagSafe", Money::dzd(2900))], DeliveryPrices::defaults())
    }

    pub(crate) fn service_with(carrier: Arc<FakeCarrier>) -> OrderService {
        OrderService::new(Arc::new(MemoryOrderStore::new()), catalog()).with_carrier(carrier)
    }

    fn id(s: &str) -> OrderId { OrderId::new(s).unwrap() }

    #[tokio::test]
    async fn test_create_requires_id_and_code() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        assert!(matches!(svc.create_order(None, Some("123456"), draft()).await, Err(OrdersError::MissingField("id"))));
        assert!(matches!(svc.create_order(Some("CMD-1"), Some(" "), draft()).await, Err(OrdersError::MissingField("confirmation_code"))));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        assert!(matches!(svc.create_order(Some("CMD-1"), Some("123456"), draft()).await, Err(OrdersError::DuplicateOrder(_))));
    }

    #[tokio::test]
    async fn test_placed_total_survives_price_change() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        let delivery = Delivery { zone: ZoneCode::new("16"), method: DeliveryMethod::Home, stop_desk: None };
        let customer = Customer { name: "Amine Benali".into(), phone: "0555123456".into(), address: "Alger".into() };
        let placed = svc.checkout(&Cart::try_from(vec![CartItem::new("ac-1")]).unwrap(), customer, delivery).await.unwrap();
        assert_eq!(placed.total(), Money::dzd(2900 + 490));

        svc.catalog().write().await.product_mut("ac-1").unwrap().update_price(Money::dzd(5000));

        let stored = svc.get_order(placed.id()).await.unwrap();
        assert_eq!(stored.total(), Money::dzd(3390));
        assert_eq!(stored.items()[0].unit_price, Money::dzd(2900));
        assert_eq!(stored.confirmation_code().as_str().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_status_leaves_order_untouched() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        let err = svc.set_status(&id("CMD-1"), Some("shipped")).await.unwrap_err();
        assert!(matches!(err, OrdersError::InvalidStatus(_)));
        assert!(matches!(svc.set_status(&id("CMD-1"), None).await, Err(OrdersError::MissingField("status"))));
        assert_eq!(svc.get_order(&id("CMD-1")).await.unwrap().status(), OrderStatus::Attempt1);
    }

    #[tokio::test]
    async fn test_operator_workflow() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        svc.set_status(&id("CMD-1"), Some("attempt-2")).await.unwrap();
        svc.set_status(&id("CMD-1"), Some("callback-requested")).await.unwrap();
        let err = svc.set_status(&id("CMD-1"), Some("delivered")).await.unwrap_err();
        assert!(matches!(err, OrdersError::IllegalTransition { .. }));
        let order = svc.set_status(&id("CMD-1"), Some("confirmed")).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert!(matches!(svc.set_status(&id("CMD-404"), Some("confirmed")).await, Err(OrdersError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_double_submission_keeps_first_tracking() {
        let carrier = Arc::new(FakeCarrier::new("yal-123"));
        let svc = service_with(carrier.clone());
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();

        let order = svc.submit_to_carrier(&id("CMD-1")).await.unwrap();
        assert_eq!(order.tracking().unwrap().as_str(), "YAL-123");

        let err = svc.submit_to_carrier(&id("CMD-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySubmitted);
        assert_eq!(carrier.submissions.load(Ordering::SeqCst), 1);
        let stored = svc.get_order(&id("CMD-1")).await.unwrap();
        assert_eq!(stored.tracking().unwrap().as_str(), "YAL-123");
        assert!(stored.carrier().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_reach_carrier_once() {
        let carrier = Arc::new(FakeCarrier::new("YAL-7").slow(Duration::from_millis(50)));
        let svc = service_with(carrier.clone());
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        let order_id = id("CMD-1");

        let (a, b) = tokio::join!(svc.submit_to_carrier(&order_id), svc.submit_to_carrier(&order_id));
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(carrier.submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_carrier_failures_are_retryable() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1").failing()));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        let err = svc.submit_to_carrier(&id("CMD-1")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(svc.get_order(&id("CMD-1")).await.unwrap().tracking().is_none());
        // the in-flight marker is released on failure
        assert!(svc.submit_to_carrier(&id("CMD-1")).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_missing_carrier_is_configuration_error() {
        let svc = OrderService::new(Arc::new(MemoryOrderStore::new()), catalog());
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        assert!(matches!(svc.submit_to_carrier(&id("CMD-1")).await, Err(OrdersError::CarrierNotConfigured)));
    }

    #[tokio::test]
    async fn test_manual_tracking_requires_both_fields() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        let err = svc.set_carrier_tracking(&id("CMD-1"), Some("yal-9"), None).await.unwrap_err();
        assert!(matches!(err, OrdersError::MissingField("submitted_at")));
        svc.set_carrier_tracking(&id("CMD-1"), Some("yal-9"), Some(Utc::now())).await.unwrap();
        let again = svc.set_carrier_tracking(&id("CMD-1"), Some("yal-10"), Some(Utc::now())).await;
        assert!(matches!(again, Err(OrdersError::AlreadySubmitted { tracking, .. }) if tracking.as_str() == "YAL-9"));
    }

    #[tokio::test]
    async fn test_tracking_reused_by_another_order_is_rejected() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        svc.create_order(Some("CMD-2"), Some("123456"), draft()).await.unwrap();
        svc.set_carrier_tracking(&id("CMD-1"), Some("yal-9"), Some(Utc::now())).await.unwrap();
        let err = svc.set_carrier_tracking(&id("CMD-2"), Some("YAL-9"), Some(Utc::now())).await.unwrap_err();
        assert!(matches!(&err, OrdersError::DuplicateTracking(t) if t == "YAL-9"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(svc.get_order(&id("CMD-2")).await.unwrap().tracking().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_views_agree() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-123")));
        let created = svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        let listed = svc.list_orders().await.unwrap();
        svc.submit_to_carrier(created.id()).await.unwrap();
        let found = svc.find_by_tracking(" yal-123 ").await.unwrap().unwrap();
        assert_eq!(created.id(), listed[0].id());
        assert_eq!(created.id(), found.id());
        assert!(svc.find_by_tracking("YAL-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_stop_desks() {
        let svc = service_with(Arc::new(FakeCarrier::new("YAL-1")));
        svc.create_order(Some("CMD-1"), Some("123456"), draft()).await.unwrap();
        svc.delete_order(&id("CMD-1")).await.unwrap();
        assert!(matches!(svc.delete_order(&id("CMD-1")).await, Err(OrdersError::OrderNotFound(_))));
        assert_eq!(svc.stop_desks(Some("16")).await.unwrap()[0].id, "160101");
        assert!(matches!(svc.stop_desks(None).await, Err(OrdersError::MissingField("zone"))));
    }
}
