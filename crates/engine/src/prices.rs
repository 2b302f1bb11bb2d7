//! PostgreSQL-backed gold price table.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use goldie_common::error::AppError;
use goldie_common::types::ValueRow;

use crate::ports::ValueStore;

pub struct PgValueStore {
    pool: PgPool,
}

impl PgValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ValueStore for PgValueStore {
    async fn get_latest_value_rows(&self) -> Result<Vec<ValueRow>, AppError> {
        let rows: Vec<ValueRow> = sqlx::query_as(
            r#"
            SELECT price_date, weight, buy_price, sell_price
            FROM value_rows
            WHERE price_date = (SELECT MAX(price_date) FROM value_rows)
            ORDER BY weight
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_earliest_value_date(&self) -> Result<Option<NaiveDate>, AppError> {
        let earliest: Option<NaiveDate> = sqlx::query_scalar("SELECT MIN(price_date) FROM value_rows")
            .fetch_one(&self.pool)
            .await?;

        Ok(earliest)
    }

    async fn upsert_value_rows(&self, rows: &[ValueRow]) -> Result<u64, AppError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO value_rows (price_date, weight, buy_price, sell_price)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (price_date, weight)
                DO UPDATE SET buy_price = EXCLUDED.buy_price,
                              sell_price = EXCLUDED.sell_price,
                              updated_at = NOW()
                "#,
            )
            .bind(row.price_date)
            .bind(row.weight)
            .bind(row.buy_price)
            .bind(row.sell_price)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        tracing::debug!(rows = written, "Price rows upserted");
        Ok(written)
    }

    async fn exists_on(&self, date: NaiveDate) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM value_rows WHERE price_date = $1)")
                .bind(date)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}
