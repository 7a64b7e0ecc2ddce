//! Split and dividend tables stored as JSON.
//!
//! Splits: `{"SYM": {"2024-06-10": 0.1, ...}, ...}`, each key a cutoff at
//! midnight UTC (a full RFC 3339 timestamp is also accepted).
//!
//! Dividends: `{"PAY-DATE": {"SYM": {"amount": 0.25, "ex_date": "..."}}}`,
//! keyed by pay-date and re-indexed here by ex-date.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::domain::corporate_actions::{DividendTable, SplitTable};
use crate::domain::error::PixelTraderError;
use crate::domain::panel::Timestamp;

#[derive(Debug, Deserialize)]
struct DividendEntry {
    amount: f64,
    ex_date: String,
}

fn bad_date(source_name: &str, value: &str) -> PixelTraderError {
    PixelTraderError::Data {
        source_name: source_name.to_string(),
        reason: format!("invalid date '{value}'"),
    }
}

/// `YYYY-MM-DD` as midnight UTC, or an RFC 3339 timestamp.
pub fn parse_instant(value: &str) -> Option<Timestamp> {
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// UTC calendar date of a date or timestamp string.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    parse_instant(value).map(|ts| ts.date_naive())
}

pub fn parse_splits(json: &str) -> Result<SplitTable, PixelTraderError> {
    let raw: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_str(json)?;
    let mut table = SplitTable::new();
    for (symbol, cutoffs) in &raw {
        for (date, factor) in cutoffs {
            let effective = parse_instant(date).ok_or_else(|| bad_date("splits", date))?;
            table.insert(symbol, effective, *factor)?;
        }
    }
    tracing::debug!(symbols = raw.len(), cutoffs = table.len(), "parsed split table");
    Ok(table)
}

pub fn parse_dividends(json: &str) -> Result<DividendTable, PixelTraderError> {
    let raw: BTreeMap<String, BTreeMap<String, DividendEntry>> = serde_json::from_str(json)?;
    let mut table = DividendTable::new();
    for (pay, entries) in &raw {
        let pay_date = parse_day(pay).ok_or_else(|| bad_date("dividends", pay))?;
        for (symbol, entry) in entries {
            let ex_date =
                parse_day(&entry.ex_date).ok_or_else(|| bad_date("dividends", &entry.ex_date))?;
            table.insert(ex_date, symbol, entry.amount, pay_date)?;
        }
    }
    tracing::debug!(events = table.len(), "parsed dividend table");
    Ok(table)
}
