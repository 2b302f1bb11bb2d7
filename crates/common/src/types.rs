use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Chat identity assigned by the messaging platform.
pub type ChatId = i64;

/// Message identity within a chat, used to edit a message in place.
pub type MessageId = i64;

/// One row of the gold price table: a denomination (bar weight in grams) on a date.
///
/// `(price_date, weight)` is unique; re-ingesting the pair overwrites the amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ValueRow {
    pub price_date: NaiveDate,
    pub weight: f64,
    /// Price the bank pays when buying a bar back
    pub buy_price: f64,
    /// Price the bank sells a bar for
    pub sell_price: f64,
}

/// A subscriber's chosen purchase date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DateSelection {
    pub id: i64,
    pub chat_id: ChatId,
    pub selection_date: NaiveDate,
    /// Audit only; display ordering is always by `selection_date`.
    pub created_at: DateTime<Utc>,
    /// Rows stored for `selection_date`, resolved only for the notification cycle.
    #[sqlx(skip)]
    #[serde(default)]
    pub buying_prices: Vec<ValueRow>,
}

/// A chat receiving notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub chat_id: ChatId,
    pub language: Option<String>,
    pub daily_alert: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub selections: Vec<DateSelection>,
}

impl Subscriber {
    /// Stored language, or `default` when the chat never picked one.
    pub fn language_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.language.as_deref() {
            Some(language) if !language.is_empty() => language,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(language: Option<&str>) -> Subscriber {
        Subscriber {
            chat_id: 1,
            language: language.map(str::to_string),
            daily_alert: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            selections: Vec::new(),
        }
    }

    #[test]
    fn test_language_or_uses_stored_language() {
        assert_eq!(subscriber(Some("ru")).language_or("en"), "ru");
    }

    #[test]
    fn test_language_or_falls_back() {
        assert_eq!(subscriber(None).language_or("en"), "en");
        assert_eq!(subscriber(Some("")).language_or("en"), "en");
    }
}
