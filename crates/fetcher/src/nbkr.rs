use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use goldie_common::error::AppError;
use goldie_common::types::ValueRow;

use crate::parser::parse_gold_prices;

/// Upstream of the price table.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Rows published between `begin` and `end`, both inclusive.
    async fn fetch_prices(&self, begin: NaiveDate, end: NaiveDate)
    -> Result<Vec<ValueRow>, AppError>;
}

/// Scrapes the National Bank of the Kyrgyz Republic gold bar page.
pub struct NbkrClient {
    client: reqwest::Client,
    url: String,
}

impl NbkrClient {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Fetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn period_query(begin: NaiveDate, end: NaiveDate) -> [(&'static str, String); 6] {
        [
            ("begin_day", format!("{:02}", begin.day())),
            ("begin_month", format!("{:02}", begin.month())),
            ("begin_year", begin.year().to_string()),
            ("end_day", format!("{:02}", end.day())),
            ("end_month", format!("{:02}", end.month())),
            ("end_year", end.year().to_string()),
        ]
    }
}

#[async_trait]
impl PriceSource for NbkrClient {
    async fn fetch_prices(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ValueRow>, AppError> {
        let response = self
            .client
            .get(&self.url)
            .query(&Self::period_query(begin, end))
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("NBKR request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("NBKR responded with {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read NBKR page: {e}")))?;

        let rows = parse_gold_prices(&body)?;
        tracing::debug!(begin = %begin, end = %end, rows = rows.len(), "Fetched NBKR prices");

        Ok(rows)
    }
}
