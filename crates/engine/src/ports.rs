//! Collaborator contracts consumed by the calendar, the settings list and the
//! notification cycle.
//!
//! PostgreSQL implementations live in [`crate::subscription`] and [`crate::prices`];
//! the Telegram delivery sink lives in the notifier crate.

use async_trait::async_trait;
use chrono::NaiveDate;

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, DateSelection, MessageId, Subscriber, ValueRow};

use crate::keyboard::Keyboard;

/// Durable subscriber records and their purchase dates.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriber without its selections, if the chat ever persisted anything.
    async fn get_subscriber(&self, chat_id: ChatId) -> Result<Option<Subscriber>, AppError>;

    /// Create-or-update the daily alert flag. Disabling also drops every selection.
    async fn upsert_alert_flag(&self, chat_id: ChatId, enabled: bool) -> Result<(), AppError>;

    /// Create the subscriber if needed and record `date`. Idempotent on `(chat_id, date)`.
    async fn upsert_date_selection(&self, chat_id: ChatId, date: NaiveDate)
    -> Result<(), AppError>;

    /// Delete one selection owned by `chat_id`. Deleting an absent id is not an error.
    async fn delete_date_selection(
        &self,
        chat_id: ChatId,
        selection_id: i64,
    ) -> Result<(), AppError>;

    /// One page of selections, newest date first, plus the total count.
    async fn list_date_selections_page(
        &self,
        chat_id: ChatId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DateSelection>, i64), AppError>;

    /// All selections, oldest date first.
    async fn list_date_selections(&self, chat_id: ChatId) -> Result<Vec<DateSelection>, AppError>;

    /// Subscribers with the daily alert or at least one selection. Each selection
    /// carries the rows stored for its date in `buying_prices`.
    async fn list_eligible_subscribers(&self) -> Result<Vec<Subscriber>, AppError>;

    async fn set_language(&self, chat_id: ChatId, language: &str) -> Result<(), AppError>;

    /// Forget the chat and all of its selections.
    async fn delete_subscriber(&self, chat_id: ChatId) -> Result<(), AppError>;
}

/// Durable gold price table.
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// All rows of the most recent date, lightest bar first.
    async fn get_latest_value_rows(&self) -> Result<Vec<ValueRow>, AppError>;

    /// Date of the oldest stored row, `None` while the table is empty.
    async fn get_earliest_value_date(&self) -> Result<Option<NaiveDate>, AppError>;

    /// Upsert on `(price_date, weight)`. Returns the number of rows written.
    async fn upsert_value_rows(&self, rows: &[ValueRow]) -> Result<u64, AppError>;

    async fn exists_on(&self, date: NaiveDate) -> Result<bool, AppError>;
}

/// Transport used to talk to a chat.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, AppError>;

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), AppError>;

    /// Answer a button press, optionally with a short toast.
    async fn acknowledge(&self, interaction_id: &str, text: Option<&str>) -> Result<(), AppError>;
}
