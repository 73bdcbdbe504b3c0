//! Postgres-backed catalog, batch store, and damage ledger.
//!
//! ## Atomic reductions
//!
//! `apply_reduction` is one conditional `UPDATE … WHERE quantity_remaining >= $2`.
//! Two concurrent decrements cannot both pass the floor check, and the table's
//! `CHECK` constraint backs the same bound at the schema level.
//! `record_damage` runs that same update and the ledger insert in one
//! transaction, so a reduction never commits without its audit entry.
//!
//! ## Error mapping
//!
//! | Situation | Result |
//! |-----------|--------|
//! | conditional update matched no row, batch absent | `NotFound` |
//! | conditional update matched no row, batch present | `InsufficientStock` |
//! | unique violation on insert (`23505`) | `Validation` (batch or entry id) |
//! | foreign key violation on insert (`23503`) | `NotFound` (ingredient) |
//! | any other SQLx error | `Storage` (message preserved) |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use larder_core::{BatchId, CategoryId, DamageEntryId, DomainError, Entity, IngredientId, UserId};
use larder_stock::{DamageEntry, Ingredient, StockBatch};

use super::{BatchStore, DamageLedger, IngredientCatalog};
use crate::error::{StockError, StockResult};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_batches.sql");

const BATCH_COLUMNS: &str =
    "batch_id, ingredient_id, received_on, expires_on, quantity_received, quantity_remaining";

/// Postgres store sharing one connection pool across all three traits.
///
/// The pool's lifecycle belongs to the host process.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables, constraints, and the append-only ledger guard if missing.
    pub async fn ensure_schema(&self) -> StockResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&*self.pool).await?;
        Ok(())
    }

    async fn ingredient_exists(&self, ingredient_id: IngredientId) -> StockResult<bool> {
        let row = sqlx::query("SELECT 1 FROM ingredients WHERE ingredient_id = $1")
            .bind(ingredient_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn ingredient_from_row(row: &PgRow) -> StockResult<Ingredient> {
    let id: Uuid = row.try_get("ingredient_id")?;
    let category: Uuid = row.try_get("category_id")?;
    let ingredient = Ingredient::new(
        IngredientId::from_uuid(id),
        row.try_get::<String, _>("name")?,
        CategoryId::from_uuid(category),
        row.try_get::<String, _>("unit")?,
        row.try_get("minimum_stock")?,
        row.try_get("expiry_warning_days")?,
    )?;
    Ok(ingredient)
}

fn batch_from_row(row: &PgRow) -> StockResult<StockBatch> {
    let id: Uuid = row.try_get("batch_id")?;
    let ingredient: Uuid = row.try_get("ingredient_id")?;
    let received_on: NaiveDate = row.try_get("received_on")?;
    let expires_on: NaiveDate = row.try_get("expires_on")?;
    let batch = StockBatch::restore(
        BatchId::from_uuid(id),
        IngredientId::from_uuid(ingredient),
        received_on,
        expires_on,
        row.try_get("quantity_received")?,
        row.try_get("quantity_remaining")?,
    )?;
    Ok(batch)
}

fn entry_from_row(row: &PgRow) -> StockResult<DamageEntry> {
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
    Ok(DamageEntry {
        id: DamageEntryId::from_uuid(row.try_get("entry_id")?),
        batch_id: BatchId::from_uuid(row.try_get("batch_id")?),
        ingredient_id: IngredientId::from_uuid(row.try_get("ingredient_id")?),
        quantity_damaged: row.try_get("quantity_damaged")?,
        quantity_requested: row.try_get("quantity_requested")?,
        reason: row.try_get("reason")?,
        recorded_by: UserId::from_uuid(row.try_get("recorded_by")?),
        recorded_at,
    })
}

fn map_insert_error(err: sqlx::Error, batch: &StockBatch) -> StockError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => {
                return DomainError::validation(format!("batch {} already exists", batch.id())).into();
            }
            Some("23503") => {
                return DomainError::not_found(format!("ingredient {}", batch.ingredient_id())).into();
            }
            _ => {}
        }
    }
    err.into()
}

fn map_entry_error(err: sqlx::Error, entry: &DamageEntry) -> StockError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return DomainError::validation(format!("damage entry {} already recorded", entry.id)).into();
        }
    }
    err.into()
}

/// Conditional decrement inside `tx`. The caller commits.
async fn reduce_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    batch_id: BatchId,
    amount: i64,
) -> StockResult<StockBatch> {
    if amount <= 0 {
        return Err(DomainError::invalid_amount(format!("reduction must be positive (got {amount})")).into());
    }

    let sql = format!(
        "UPDATE stock_batches SET quantity_remaining = quantity_remaining - $2 \
         WHERE batch_id = $1 AND quantity_remaining >= $2 \
         RETURNING {BATCH_COLUMNS}"
    );
    let updated = sqlx::query(&sql)
        .bind(batch_id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some(row) = updated {
        return batch_from_row(&row);
    }

    // Nothing matched: tell a missing batch apart from an insufficient one.
    let remaining = sqlx::query("SELECT quantity_remaining FROM stock_batches WHERE batch_id = $1")
        .bind(batch_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

    match remaining {
        Some(row) => {
            let remaining: i64 = row.try_get("quantity_remaining")?;
            Err(DomainError::insufficient(amount, remaining).into())
        }
        None => Err(DomainError::not_found(format!("batch {batch_id}")).into()),
    }
}

#[async_trait]
impl IngredientCatalog for PostgresStockStore {
    #[instrument(skip(self), fields(ingredient_id = %ingredient_id), err)]
    async fn get_ingredient(&self, ingredient_id: IngredientId) -> StockResult<Ingredient> {
        let row = sqlx::query(
            r#"
            SELECT ingredient_id, name, category_id, unit, minimum_stock, expiry_warning_days
            FROM ingredients
            WHERE ingredient_id = $1
            "#,
        )
        .bind(ingredient_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;

        match row {
            Some(row) => ingredient_from_row(&row),
            None => Err(DomainError::not_found(format!("ingredient {ingredient_id}")).into()),
        }
    }

    async fn list_ingredients(&self) -> StockResult<Vec<Ingredient>> {
        let rows = sqlx::query(
            r#"
            SELECT ingredient_id, name, category_id, unit, minimum_stock, expiry_warning_days
            FROM ingredients
            ORDER BY name ASC, ingredient_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(ingredient_from_row).collect()
    }
}

#[async_trait]
impl BatchStore for PostgresStockStore {
    #[instrument(skip(self, batch), fields(batch_id = %batch.id()), err)]
    async fn insert_batch(&self, batch: StockBatch) -> StockResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_batches (
                batch_id, ingredient_id, received_on, expires_on,
                quantity_received, quantity_remaining
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(batch.id().as_uuid())
        .bind(batch.ingredient_id().as_uuid())
        .bind(batch.received_on())
        .bind(batch.expires_on())
        .bind(batch.quantity_received())
        .bind(batch.quantity_remaining())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error(e, &batch))?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: BatchId) -> StockResult<Option<StockBatch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM stock_batches WHERE batch_id = $1");
        let row = sqlx::query(&sql)
            .bind(batch_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    #[instrument(skip(self), fields(ingredient_id = %ingredient_id), err)]
    async fn list_batches(&self, ingredient_id: IngredientId) -> StockResult<Vec<StockBatch>> {
        if !self.ingredient_exists(ingredient_id).await? {
            return Err(DomainError::not_found(format!("ingredient {ingredient_id}")).into());
        }

        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE ingredient_id = $1 \
             ORDER BY expires_on ASC, received_on ASC, batch_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(ingredient_id.as_uuid())
            .fetch_all(&*self.pool)
            .await?;

        rows.iter().map(batch_from_row).collect()
    }

    async fn total_remaining(&self, ingredient_id: IngredientId) -> StockResult<i64> {
        if !self.ingredient_exists(ingredient_id).await? {
            return Err(DomainError::not_found(format!("ingredient {ingredient_id}")).into());
        }

        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity_remaining), 0)::BIGINT AS total \
             FROM stock_batches WHERE ingredient_id = $1",
        )
        .bind(ingredient_id.as_uuid())
        .fetch_one(&*self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    #[instrument(skip(self), fields(batch_id = %batch_id), err)]
    async fn apply_reduction(&self, batch_id: BatchId, amount: i64) -> StockResult<StockBatch> {
        let mut tx = self.pool.begin().await?;
        let batch = reduce_in_tx(&mut tx, batch_id, amount).await?;
        tx.commit().await?;
        Ok(batch)
    }
}

#[async_trait]
impl DamageLedger for PostgresStockStore {
    #[instrument(skip(self, entry), fields(entry_id = %entry.id, batch_id = %entry.batch_id), err)]
    async fn record_damage(&self, entry: DamageEntry) -> StockResult<StockBatch> {
        // Dropping the transaction on any early return rolls the reduction back.
        let mut tx = self.pool.begin().await?;
        let batch = reduce_in_tx(&mut tx, entry.batch_id, entry.quantity_damaged).await?;

        sqlx::query(
            r#"
            INSERT INTO damage_entries (
                entry_id, batch_id, ingredient_id, quantity_damaged,
                quantity_requested, reason, recorded_by, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.batch_id.as_uuid())
        .bind(entry.ingredient_id.as_uuid())
        .bind(entry.quantity_damaged)
        .bind(entry.quantity_requested)
        .bind(&entry.reason)
        .bind(entry.recorded_by.as_uuid())
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_entry_error(e, &entry))?;

        tx.commit().await?;
        Ok(batch)
    }

    async fn entries_for_ingredient(
        &self,
        ingredient_id: IngredientId,
    ) -> StockResult<Vec<DamageEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, batch_id, ingredient_id, quantity_damaged,
                   quantity_requested, reason, recorded_by, recorded_at
            FROM damage_entries
            WHERE ingredient_id = $1
            ORDER BY recorded_at ASC, entry_id ASC
            "#,
        )
        .bind(ingredient_id.as_uuid())
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}
