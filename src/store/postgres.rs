//! PostgreSQL order store.
//!
//! Line items live in a JSONB column; the order row is the aggregate root.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::aggregates::{CarrierHandoff, Customer, Delivery, LineItem, Order, OrderDraft, StopDesk};
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{ConfirmationCode, DeliveryMethod, Money, OrderId, TrackingId, ZoneCode};
use crate::store::{HandoffWrite, OrderStore, StoreError, StoreResult};

const SELECT_ORDER: &str = "SELECT id, confirmation_code, customer_name, phone, address, zone, delivery_method, stop_desk_id, stop_desk_name, items, delivery_fee, total, status, carrier_tracking, carrier_submitted_at, created_at FROM orders";

pub struct PgOrderStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    confirmation_code: String,
    customer_name: String,
    phone: String,
    address: String,
    zone: Option<String>,
    delivery_method: String,
    stop_desk_id: Option<String>,
    stop_desk_name: Option<String>,
    items: Json<Vec<LineItem>>,
    delivery_fee: i64,
    total: i64,
    status: String,
    carrier_tracking: Option<String>,
    carrier_submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: r.id.clone(), reason };
        let id = OrderId::new(r.id.clone()).ok_or_else(|| corrupt("empty id".into()))?;
        let code = ConfirmationCode::new(r.confirmation_code.clone()).ok_or_else(|| corrupt("empty confirmation code".into()))?;
        let status = OrderStatus::from_stored(&r.status).ok_or_else(|| corrupt(format!("unknown status {:?}", r.status)))?;
        let method = DeliveryMethod::parse(&r.delivery_method).ok_or_else(|| corrupt(format!("unknown delivery method {:?}", r.delivery_method)))?;
        let carrier = match (r.carrier_tracking.as_deref().and_then(TrackingId::new), r.carrier_submitted_at) {
            (Some(tracking), Some(submitted_at)) => Some(CarrierHandoff { tracking, submitted_at }),
            (None, None) => None,
            _ => return Err(corrupt("tracking and submission time must be set together".into())),
        };
        let stop_desk = match (r.stop_desk_id, r.stop_desk_name) {
            (Some(id), Some(name)) => Some(StopDesk { id, name }),
            _ => None,
        };
        let draft = OrderDraft {
            customer: Customer { name: r.customer_name, phone: r.phone, address: r.address },
            delivery: Delivery { zone: r.zone.and_then(ZoneCode::new), method, stop_desk },
            items: r.items.0,
            delivery_fee: Money::dzd(r.delivery_fee),
            total: Money::dzd(r.total),
        };
        Ok(Order::restore(id, code, draft, status, carrier, r.created_at))
    }
}

impl PgOrderStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn fetch_many(&self, sql: String) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let delivery = order.delivery();
        let result = sqlx::query(
            "INSERT INTO orders (id, confirmation_code, customer_name, phone, address, zone, delivery_method, stop_desk_id, stop_desk_name, items, delivery_fee, total, status, carrier_tracking, carrier_submitted_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) ON CONFLICT (id) DO NOTHING",
        )
        .bind(order.id().as_str())
        .bind(order.confirmation_code().as_str())
        .bind(&order.customer().name)
        .bind(&order.customer().phone)
        .bind(&order.customer().address)
        .bind(delivery.zone.as_ref().map(|z| z.as_str()))
        .bind(delivery.method.as_str())
        .bind(delivery.stop_desk.as_ref().map(|d| d.id.as_str()))
        .bind(delivery.stop_desk.as_ref().map(|d| d.name.as_str()))
        .bind(Json(order.items()))
        .bind(order.delivery_fee().amount())
        .bind(order.total().amount())
        .bind(order.status().as_str())
        .bind(order.tracking().map(|t| t.as_str()))
        .bind(order.carrier().map(|c| c.submitted_at))
        .bind(order.created_at())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(order.id().to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Order>> {
        self.fetch_many(format!("{SELECT_ORDER} ORDER BY created_at DESC, id DESC")).await
    }

    async fn find_by_tracking(&self, tracking: &TrackingId) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE UPPER(TRIM(carrier_tracking)) = $1 LIMIT 1"))
            .bind(tracking.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn list_tracked(&self) -> StoreResult<Vec<Order>> {
        self.fetch_many(format!("{SELECT_ORDER} WHERE carrier_tracking IS NOT NULL ORDER BY created_at DESC")).await
    }

    async fn update_status(&self, id: &OrderId, expected: OrderStatus, new: OrderStatus) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = ANY($3)")
            .bind(new.as_str())
            .bind(id.as_str())
            .bind(expected.stored_spellings())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_carrier_handoff(&self, id: &OrderId, handoff: &CarrierHandoff) -> StoreResult<HandoffWrite> {
        let result = sqlx::query("UPDATE orders SET carrier_tracking = $1, carrier_submitted_at = $2 WHERE id = $3 AND carrier_tracking IS NULL")
            .bind(handoff.tracking.as_str())
            .bind(handoff.submitted_at)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateTracking(handoff.tracking.to_string()),
                _ => StoreError::Database(e),
            })?;
        if result.rows_affected() == 1 {
            return Ok(HandoffWrite::Written);
        }
        let existing: Option<(Option<String>,)> = sqlx::query_as("SELECT carrier_tracking FROM orders WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(match existing.and_then(|(t,)| t).and_then(TrackingId::new) {
            Some(tracking) => HandoffWrite::AlreadySet(tracking),
            None => HandoffWrite::NotFound,
        })
    }

    async fn delete(&self, id: &OrderId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id.as_str()).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
