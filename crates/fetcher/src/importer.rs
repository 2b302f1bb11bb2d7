//! Moves NBKR prices into the price table.

use std::sync::Arc;

use chrono::{FixedOffset, Months, NaiveDate, Utc};

use goldie_common::error::AppError;
use goldie_engine::ports::ValueStore;

use crate::nbkr::PriceSource;

/// First day of the back-fill.
pub const HISTORY_START: (i32, u32, u32) = (2015, 1, 1);

/// Oldest date NBKR actually published; its presence means the back-fill already ran.
pub const FIRST_PRICE_DATE: (i32, u32, u32) = (2015, 7, 5);

pub struct PriceImporter {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn ValueStore>,
    offset: FixedOffset,
}

impl PriceImporter {
    pub fn new(source: Arc<dyn PriceSource>, store: Arc<dyn ValueStore>, offset: FixedOffset) -> Self {
        Self {
            source,
            store,
            offset,
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// Refresh the last year of prices. Returns the number of rows written.
    pub async fn update_prices(&self) -> Result<u64, AppError> {
        self.update_prices_until(self.today()).await
    }

    pub async fn update_prices_until(&self, today: NaiveDate) -> Result<u64, AppError> {
        let begin = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        let rows = self.source.fetch_prices(begin, today).await?;
        let written = self.store.upsert_value_rows(&rows).await?;

        tracing::info!(begin = %begin, end = %today, rows = written, "Prices updated");
        Ok(written)
    }

    /// Back-fill the whole history in yearly windows, unless it is already there.
    pub async fn first_import(&self) -> Result<u64, AppError> {
        self.first_import_until(self.today()).await
    }

    pub async fn first_import_until(&self, today: NaiveDate) -> Result<u64, AppError> {
        let (year, month, day) = FIRST_PRICE_DATE;
        let first_price = date(year, month, day)?;
        if self.store.exists_on(first_price).await? {
            tracing::info!("Price history already imported");
            return Ok(0);
        }

        let (year, month, day) = HISTORY_START;
        let mut begin = date(year, month, day)?;
        let mut total = 0u64;

        while begin <= today {
            let end = begin
                .checked_add_months(Months::new(12))
                .ok_or_else(|| AppError::Internal(format!("Date overflow after {begin}")))?;

            let rows = self.source.fetch_prices(begin, end).await?;
            if rows.is_empty() {
                break;
            }

            total += self.store.upsert_value_rows(&rows).await?;
            tracing::info!(begin = %begin, end = %end, rows = rows.len(), "Imported price window");
            begin = end;
        }

        tracing::info!(rows = total, "Price history imported");
        Ok(total)
    }
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::Internal(format!("Invalid date {year}-{month}-{day}")))
}
