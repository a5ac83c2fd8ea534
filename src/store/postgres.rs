//! # Postgres Store
//!
//! sqlx-backed implementation of the storage ports. Orders live as one JSONB
//! document per row with the status, version, and delivery date lifted into
//! columns for indexing; the document is the source of truth and the lifted
//! columns are rewritten on every update.
//!
//! Conditional updates take a row lock (`SELECT ... FOR UPDATE`), re-check
//! the predicate against the locked row, and write back in the same
//! transaction, so there is no observation window between check and write.
//! Driver-area replaces run at SERIALIZABLE because the uniqueness invariant
//! spans rows the replace does not touch.

use super::{
    BulkAssignment, BulkAssignmentOutcome, DriverAreaStore, Mutation, OrderStore, StoreError,
    UpdateOutcome, UpdatePredicate,
};
use crate::models::{AreaId, DriverAreaAssignment, DriverId, Order, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use tracing::{debug, instrument, warn};

/// Embedded migrations for the orders and driver_areas tables
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    document: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct DriverAreaRow {
    driver_id: String,
    driver_name: String,
    area_id: String,
    assigned_at: DateTime<Utc>,
}

impl From<DriverAreaRow> for DriverAreaAssignment {
    fn from(row: DriverAreaRow) -> Self {
        Self {
            driver_id: DriverId::new(row.driver_id),
            driver_name: row.driver_name,
            area_id: AreaId::new(row.area_id),
            assigned_at: row.assigned_at,
        }
    }
}

/// Postgres implementation of both storage ports
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("migration failed: {e}"),
            })
    }

    fn decode(document: serde_json::Value) -> Result<Order, StoreError> {
        Ok(serde_json::from_value(document)?)
    }

    async fn lock_order(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
        row.map(|row| Self::decode(row.document)).transpose()
    }

    async fn write_back(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), StoreError> {
        let document = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, version = $3, delivery_date = $4,
                document = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.to_string())
        .bind(order.version)
        .bind(order.delivery_date)
        .bind(document)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let document = serde_json::to_value(order)?;
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, status, version, delivery_date, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.to_string())
        .bind(order.version)
        .bind(order.delivery_date)
        .bind(document)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if sqlstate_is(&e, SQLSTATE_UNIQUE_VIOLATION) => Err(StoreError::DuplicateId {
                id: order.id.to_string(),
            }),
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| Self::decode(row.document)).transpose()
    }

    #[instrument(skip(self, predicate, mutation), fields(order_id = %id))]
    async fn conditional_update(
        &self,
        id: OrderId,
        predicate: UpdatePredicate,
        mutation: Mutation,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let Some(mut order) = Self::lock_order(&mut tx, id).await? else {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        };
        let outcome = if predicate.matches(&order) {
            mutation(&mut order);
            order.version += 1;
            Self::write_back(&mut tx, &order).await?;
            UpdateOutcome::Applied(order)
        } else {
            UpdateOutcome::NotApplied(order)
        };
        tx.commit().await.map_err(map_sqlx_error)?;

        if !outcome.is_applied() {
            debug!(order_id = %id, "Conditional update did not apply");
        }
        Ok(outcome)
    }

    async fn list_unassigned_ready(
        &self,
        delivery_date: NaiveDate,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT document FROM orders
            WHERE status = 'ready_for_delivery'
              AND delivery_date = $1
              AND document->'delivery'->>'driver_id' IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(delivery_date)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| Self::decode(row.document))
            .collect()
    }

    #[instrument(skip(self, assignments), fields(batch_size = assignments.len()))]
    async fn assign_drivers_bulk(
        &self,
        assignments: &[BulkAssignment],
    ) -> Result<BulkAssignmentOutcome, StoreError> {
        // One transaction across the whole plan; per-row locks keep each
        // eligibility re-check race-free against single-order writers.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let now = Utc::now();
        let mut outcome = BulkAssignmentOutcome::default();
        for assignment in assignments {
            let Some(mut order) = Self::lock_order(&mut tx, assignment.order_id).await? else {
                outcome.conflicts.push(assignment.order_id);
                continue;
            };
            if !assignment.predicate().matches(&order) {
                outcome.conflicts.push(assignment.order_id);
                continue;
            }
            assignment.apply(&mut order, now);
            order.version += 1;
            Self::write_back(&mut tx, &order).await?;
            outcome.assigned.push(assignment.order_id);
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(outcome)
    }
}

#[async_trait]
impl DriverAreaStore for PgStore {
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    async fn replace_driver_assignment(
        &self,
        driver_id: &DriverId,
        driver_name: &str,
        new_area: Option<AreaId>,
    ) -> Result<(), StoreError> {
        // Uniqueness is checked against rows this replace does not write, so
        // row locks are not enough.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(area_id) = &new_area {
            let taken: Option<DriverAreaRow> = sqlx::query_as(
                r#"
                SELECT driver_id, driver_name, area_id, assigned_at
                FROM driver_areas
                WHERE area_id = $1 AND driver_id <> $2
                "#,
            )
            .bind(area_id.as_str())
            .bind(driver_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if let Some(existing) = taken {
                warn!(
                    area_id = %existing.area_id,
                    held_by = %existing.driver_id,
                    "Area replace rejected, area already covered"
                );
                return Err(StoreError::AreaTaken {
                    area_id: existing.area_id,
                    driver_id: existing.driver_id,
                });
            }
        }

        sqlx::query("DELETE FROM driver_areas WHERE driver_id = $1")
            .bind(driver_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(area_id) = &new_area {
            let result = sqlx::query(
                r#"
                INSERT INTO driver_areas (area_id, driver_id, driver_name, assigned_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(area_id.as_str())
            .bind(driver_id.as_str())
            .bind(driver_name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                // The primary key on area_id backstops the pre-check
                if sqlstate_is(&e, SQLSTATE_UNIQUE_VIOLATION) {
                    return Err(StoreError::AreaTaken {
                        area_id: area_id.to_string(),
                        driver_id: "unknown".to_string(),
                    });
                }
                return Err(map_sqlx_error(e));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn assignment_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<DriverAreaAssignment>, StoreError> {
        let row: Option<DriverAreaRow> = sqlx::query_as(
            r#"
            SELECT driver_id, driver_name, area_id, assigned_at
            FROM driver_areas WHERE driver_id = $1
            "#,
        )
        .bind(driver_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn assignments_for_area(
        &self,
        area_id: &AreaId,
    ) -> Result<Vec<DriverAreaAssignment>, StoreError> {
        let rows: Vec<DriverAreaRow> = sqlx::query_as(
            r#"
            SELECT driver_id, driver_name, area_id, assigned_at
            FROM driver_areas WHERE area_id = $1
            "#,
        )
        .bind(area_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn active_assignments(&self) -> Result<Vec<DriverAreaAssignment>, StoreError> {
        let rows: Vec<DriverAreaRow> = sqlx::query_as(
            r#"
            SELECT driver_id, driver_name, area_id, assigned_at
            FROM driver_areas ORDER BY area_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn sqlstate_is(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(code),
        _ => false,
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(SQLSTATE_SERIALIZATION_FAILURE) {
            return StoreError::SerializationFailure {
                reason: db.message().to_string(),
            };
        }
    }
    StoreError::Database(err)
}
