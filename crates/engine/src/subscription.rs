//! PostgreSQL-backed subscriber and purchase date storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, DateSelection, Subscriber, ValueRow};

use crate::ports::SubscriptionStore;

pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the subscriber row if the chat has never persisted anything.
    async fn ensure_subscriber<'e, E>(executor: E, chat_id: ChatId) -> Result<(), AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("INSERT INTO subscribers (chat_id) VALUES ($1) ON CONFLICT (chat_id) DO NOTHING")
            .bind(chat_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn get_subscriber(&self, chat_id: ChatId) -> Result<Option<Subscriber>, AppError> {
        let subscriber: Option<Subscriber> = sqlx::query_as(
            r#"
            SELECT chat_id, language, daily_alert, created_at, updated_at
            FROM subscribers
            WHERE chat_id = $1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscriber)
    }

    async fn upsert_alert_flag(&self, chat_id: ChatId, enabled: bool) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, daily_alert)
            VALUES ($1, $2)
            ON CONFLICT (chat_id)
            DO UPDATE SET daily_alert = EXCLUDED.daily_alert, updated_at = NOW()
            "#,
        )
        .bind(chat_id)
        .bind(enabled)
        .execute(&mut *tx)
        .await?;

        if !enabled {
            sqlx::query("DELETE FROM date_selections WHERE chat_id = $1")
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(chat_id, enabled, "Daily alert updated");
        Ok(())
    }

    async fn upsert_date_selection(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        Self::ensure_subscriber(&mut *tx, chat_id).await?;
        sqlx::query(
            r#"
            INSERT INTO date_selections (chat_id, selection_date)
            VALUES ($1, $2)
            ON CONFLICT (chat_id, selection_date) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(chat_id, date = %date, "Date selection saved");
        Ok(())
    }

    async fn delete_date_selection(
        &self,
        chat_id: ChatId,
        selection_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM date_selections WHERE id = $1 AND chat_id = $2")
            .bind(selection_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_date_selections_page(
        &self,
        chat_id: ChatId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DateSelection>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM date_selections WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;

        let selections: Vec<DateSelection> = sqlx::query_as(
            r#"
            SELECT id, chat_id, selection_date, created_at
            FROM date_selections
            WHERE chat_id = $1
            ORDER BY selection_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((selections, total))
    }

    async fn list_date_selections(&self, chat_id: ChatId) -> Result<Vec<DateSelection>, AppError> {
        let selections: Vec<DateSelection> = sqlx::query_as(
            r#"
            SELECT id, chat_id, selection_date, created_at
            FROM date_selections
            WHERE chat_id = $1
            ORDER BY selection_date ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(selections)
    }

    async fn list_eligible_subscribers(&self) -> Result<Vec<Subscriber>, AppError> {
        let mut subscribers: Vec<Subscriber> = sqlx::query_as(
            r#"
            SELECT s.chat_id, s.language, s.daily_alert, s.created_at, s.updated_at
            FROM subscribers s
            WHERE s.daily_alert
               OR EXISTS (SELECT 1 FROM date_selections d WHERE d.chat_id = s.chat_id)
            ORDER BY s.chat_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if subscribers.is_empty() {
            return Ok(subscribers);
        }

        let chat_ids: Vec<ChatId> = subscribers.iter().map(|s| s.chat_id).collect();
        let selections: Vec<DateSelection> = sqlx::query_as(
            r#"
            SELECT id, chat_id, selection_date, created_at
            FROM date_selections
            WHERE chat_id = ANY($1)
            ORDER BY chat_id, selection_date ASC
            "#,
        )
        .bind(&chat_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut dates: Vec<NaiveDate> = selections.iter().map(|s| s.selection_date).collect();
        dates.sort_unstable();
        dates.dedup();

        let mut prices_by_date: HashMap<NaiveDate, Vec<ValueRow>> = HashMap::new();
        if !dates.is_empty() {
            let rows: Vec<ValueRow> = sqlx::query_as(
                r#"
                SELECT price_date, weight, buy_price, sell_price
                FROM value_rows
                WHERE price_date = ANY($1)
                ORDER BY price_date, weight
                "#,
            )
            .bind(&dates)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                prices_by_date.entry(row.price_date).or_default().push(row);
            }
        }

        let mut selections_by_chat: HashMap<ChatId, Vec<DateSelection>> = HashMap::new();
        for mut selection in selections {
            selection.buying_prices = prices_by_date
                .get(&selection.selection_date)
                .cloned()
                .unwrap_or_default();
            selections_by_chat
                .entry(selection.chat_id)
                .or_default()
                .push(selection);
        }

        for subscriber in &mut subscribers {
            subscriber.selections = selections_by_chat
                .remove(&subscriber.chat_id)
                .unwrap_or_default();
        }

        Ok(subscribers)
    }

    async fn set_language(&self, chat_id: ChatId, language: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, language)
            VALUES ($1, $2)
            ON CONFLICT (chat_id)
            DO UPDATE SET language = EXCLUDED.language, updated_at = NOW()
            "#,
        )
        .bind(chat_id)
        .bind(language)
        .execute(&self.pool)
        .await?;

        tracing::info!(chat_id, language, "Language saved");
        Ok(())
    }

    async fn delete_subscriber(&self, chat_id: ChatId) -> Result<(), AppError> {
        // date_selections cascade
        let result = sqlx::query("DELETE FROM subscribers WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(chat_id, "Subscriber deleted");
        }

        Ok(())
    }
}
