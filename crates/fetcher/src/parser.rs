//! NBKR gold bar price table parsing.
//!
//! The page lists one row per (date, bar weight):
//!
//! ```text
//! <tr><td>07.11.2025</td><td>1,00</td><td>12 577,00</td><td>12 640,00</td></tr>
//! ```

use chrono::NaiveDate;
use scraper::{Html, Selector};

use goldie_common::error::AppError;
use goldie_common::types::ValueRow;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Extract price rows, sorted by date then weight.
///
/// Rows with fewer than four cells or with a zero/unreadable amount are skipped.
/// An unreadable date fails the whole page.
pub fn parse_gold_prices(html: &str) -> Result<Vec<ValueRow>, AppError> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("table tbody tr")
        .map_err(|e| AppError::Parse(format!("Invalid row selector: {e:?}")))?;
    let cell_selector =
        Selector::parse("td").map_err(|e| AppError::Parse(format!("Invalid cell selector: {e:?}")))?;

    let mut rows = Vec::new();
    for tr in document.select(&row_selector) {
        let cells: Vec<String> = tr
            .select(&cell_selector)
            .map(|td| td.text().collect::<String>())
            .collect();
        if cells.len() < 4 {
            continue;
        }

        let weight = parse_amount(&cells[1]);
        let buy_price = parse_amount(&cells[2]);
        let sell_price = parse_amount(&cells[3]);
        if weight == 0.0 || buy_price == 0.0 || sell_price == 0.0 {
            continue;
        }

        let raw_date = cells[0].trim();
        let price_date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| AppError::Parse(format!("Invalid date '{raw_date}': {e}")))?;

        rows.push(ValueRow {
            price_date,
            weight,
            buy_price,
            sell_price,
        });
    }

    rows.sort_by(|a, b| {
        a.price_date
            .cmp(&b.price_date)
            .then(a.weight.total_cmp(&b.weight))
    });

    Ok(rows)
}

/// `"12 577,50"` -> `12577.5`. Anything unreadable is `0.0`.
fn parse_amount(raw: &str) -> f64 {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect::<String>()
        .parse()
        .unwrap_or(0.0)
}
