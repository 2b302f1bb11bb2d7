//! Price table and gain table text.
//!
//! Tables are sent with Telegram's HTML parse mode: a bold title followed by a
//! fixed-width `<pre>` block.

use std::fmt::Write as _;
use std::sync::Arc;

use goldie_common::error::AppError;
use goldie_common::types::ValueRow;

use crate::i18n::Localizer;

/// Gain of one denomination against the subscriber's purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct GainRow {
    pub weight: f64,
    pub current_buy: f64,
    pub buying_sell: f64,
    /// `current_sell * 100 / buying_sell`
    pub gain: f64,
}

/// Renders the notification texts.
pub trait ReportRenderer: Send + Sync {
    /// The daily table. Identical for every subscriber sharing `language`.
    fn prices_table(&self, language: &str, rows: &[ValueRow]) -> Result<String, AppError>;

    /// The gain table against one purchase date.
    fn gain_table(
        &self,
        language: &str,
        rows: &[ValueRow],
        buying_prices: &[ValueRow],
    ) -> Result<String, AppError>;
}

/// Rows of the most recent date in `rows`, lightest bar first.
pub fn latest_rows(rows: &[ValueRow]) -> Vec<&ValueRow> {
    let Some(latest) = rows.iter().map(|row| row.price_date).max() else {
        return Vec::new();
    };

    let mut current: Vec<&ValueRow> = rows.iter().filter(|row| row.price_date == latest).collect();
    current.sort_by(|a, b| a.weight.total_cmp(&b.weight));
    current
}

/// Percentage of the current sell price against the sell price paid on the purchase
/// date. Denominations missing from `buying_prices` are skipped.
pub fn compute_gains(rows: &[ValueRow], buying_prices: &[ValueRow]) -> Vec<GainRow> {
    latest_rows(rows)
        .into_iter()
        .filter_map(|row| {
            let bought = buying_prices
                .iter()
                .find(|bought| bought.weight == row.weight && bought.sell_price > 0.0)?;

            Some(GainRow {
                weight: row.weight,
                current_buy: row.buy_price,
                buying_sell: bought.sell_price,
                gain: row.sell_price * 100.0 / bought.sell_price,
            })
        })
        .collect()
}

/// `31.1035` stays as is, `1.0` becomes `1`.
pub fn format_weight(weight: f64) -> String {
    let formatted = format!("{weight:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// [`ReportRenderer`] backed by a [`Localizer`].
pub struct HtmlTableRenderer {
    localizer: Arc<dyn Localizer>,
}

impl HtmlTableRenderer {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self { localizer }
    }

    /// Column headers are decorative: a missing translation leaves the cell empty.
    fn header(&self, language: &str, message_id: &str) -> String {
        self.localizer
            .render(language, message_id, &[])
            .unwrap_or_default()
    }
}

impl ReportRenderer for HtmlTableRenderer {
    fn prices_table(&self, language: &str, rows: &[ValueRow]) -> Result<String, AppError> {
        let current = latest_rows(rows);
        let Some(first) = current.first() else {
            return Err(AppError::Validation("No prices to render".to_string()));
        };

        let date = first.price_date.format("%Y-%m-%d").to_string();
        let title = self
            .localizer
            .render(language, "goldPricesTitle", &[("Date", &date)])?;

        let mut out = format!("<b>{title}</b>\n<pre>\n");
        let _ = writeln!(
            out,
            "{:<8} {:<12} {:<12}",
            self.header(language, "columnWeight"),
            self.header(language, "columnBuy"),
            self.header(language, "columnSell"),
        );
        for row in current {
            let _ = writeln!(
                out,
                "{:<8} {:<12.2} {:<12.2}",
                format_weight(row.weight),
                row.buy_price,
                row.sell_price
            );
        }
        out.push_str("</pre>");

        Ok(out)
    }

    fn gain_table(
        &self,
        language: &str,
        rows: &[ValueRow],
        buying_prices: &[ValueRow],
    ) -> Result<String, AppError> {
        let gains = compute_gains(rows, buying_prices);
        let (Some(current), Some(bought)) = (latest_rows(rows).first().copied(), buying_prices.first())
        else {
            return Err(AppError::Validation("No prices to compare".to_string()));
        };
        if gains.is_empty() {
            return Err(AppError::Validation(format!(
                "No common denominations between {} and {}",
                current.price_date, bought.price_date
            )));
        }

        let date = current.price_date.format("%Y-%m-%d").to_string();
        let buying_date = bought.price_date.format("%Y-%m-%d").to_string();
        let title = self.localizer.render(
            language,
            "goldGainTitle",
            &[("Date", &date), ("BuyingDate", &buying_date)],
        )?;

        let mut out = format!("<b>{title}</b>\n<pre>\n");
        let _ = writeln!(
            out,
            "{:<8} {:<12} {:<12} {:<8}",
            self.header(language, "columnWeight"),
            self.header(language, "columnBuy"),
            self.header(language, "columnBought"),
            self.header(language, "columnGain"),
        );
        for gain in &gains {
            let _ = writeln!(
                out,
                "{:<8} {:<12.2} {:<12.2} {:<8.2}",
                format_weight(gain.weight),
                gain.current_buy,
                gain.buying_sell,
                gain.gain
            );
        }
        out.push_str("</pre>");

        Ok(out)
    }
}
