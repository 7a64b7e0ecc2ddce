//! Split cutoffs, dividend events and the split adjustment of price panels.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::error::PixelTraderError;
use super::matrix::Matrix;
use super::panel::{PricePanel, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCutoff {
    pub effective: Timestamp,
    pub factor: f64,
}

/// Per-symbol split cutoffs, each list kept in ascending effective order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitTable {
    cutoffs: BTreeMap<String, Vec<SplitCutoff>>,
}

impl SplitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        symbol: &str,
        effective: Timestamp,
        factor: f64,
    ) -> Result<(), PixelTraderError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(PixelTraderError::Data {
                source_name: "split table".into(),
                reason: format!("{symbol} has non-positive factor {factor} at {effective}"),
            });
        }
        let list = self.cutoffs.entry(symbol.to_string()).or_default();
        let pos = list.partition_point(|c| c.effective <= effective);
        list.insert(pos, SplitCutoff { effective, factor });
        Ok(())
    }

    pub fn cutoffs(&self, symbol: &str) -> &[SplitCutoff] {
        self.cutoffs.get(symbol).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.cutoffs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cutoffs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cutoffs.is_empty()
    }
}

/// Multiply every mid strictly before each cutoff by that cutoff's factor.
/// Cutoffs compose multiplicatively. Returns the number of symbols touched.
pub fn apply_splits(panel: &mut PricePanel, splits: &SplitTable) -> usize {
    let mut adjusted = 0;
    for symbol in splits.symbols() {
        let Some(j) = panel.symbol_index(symbol) else {
            continue;
        };
        for cutoff in splits.cutoffs(symbol) {
            let end = panel.periods.partition_point(|p| *p < cutoff.effective);
            for t in 0..end {
                let v = panel.mid.get(t, j);
                panel.mid.set(t, j, v * cutoff.factor);
            }
        }
        adjusted += 1;
    }
    tracing::debug!(symbols = adjusted, cutoffs = splits.len(), "applied split cutoffs");
    adjusted
}

#[derive(Debug, Clone, PartialEq)]
pub struct DividendEvent {
    pub symbol: String,
    pub amount: f64,
    pub pay_date: NaiveDate,
}

/// Dividend events keyed by ex-date. Within an ex-date events are ordered by
/// symbol then pay-date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DividendTable {
    by_ex_date: BTreeMap<NaiveDate, Vec<DividendEvent>>,
}

impl DividendTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        ex_date: NaiveDate,
        symbol: &str,
        amount: f64,
        pay_date: NaiveDate,
    ) -> Result<(), PixelTraderError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PixelTraderError::Data {
                source_name: "dividend table".into(),
                reason: format!("{symbol} has non-positive amount {amount} on {ex_date}"),
            });
        }
        if pay_date < ex_date {
            return Err(PixelTraderError::Data {
                source_name: "dividend table".into(),
                reason: format!("{symbol} pays on {pay_date}, before ex-date {ex_date}"),
            });
        }
        let events = self.by_ex_date.entry(ex_date).or_default();
        let pos = events.partition_point(|e| {
            (e.symbol.as_str(), e.pay_date) <= (symbol, pay_date)
        });
        events.insert(
            pos,
            DividendEvent {
                symbol: symbol.to_string(),
                amount,
                pay_date,
            },
        );
        Ok(())
    }

    pub fn events_on(&self, ex_date: NaiveDate) -> &[DividendEvent] {
        self.by_ex_date.get(&ex_date).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &DividendEvent)> {
        self.by_ex_date
            .iter()
            .flat_map(|(d, events)| events.iter().map(move |e| (*d, e)))
    }

    pub fn len(&self) -> usize {
        self.by_ex_date.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ex_date.is_empty()
    }

    /// periods x symbols matrix of dividend cash, placed at the first period
    /// falling on each event's ex-date. Events for unknown symbols or for
    /// dates with no period are dropped.
    pub fn cash_by_period(&self, periods: &[Timestamp], symbols: &[String]) -> Matrix {
        let mut cash = Matrix::zeros(periods.len(), symbols.len());
        let mut first_period: HashMap<NaiveDate, usize> = HashMap::new();
        for (t, p) in periods.iter().enumerate() {
            first_period.entry(p.date_naive()).or_insert(t);
        }
        let columns: HashMap<&str, usize> = symbols
            .iter()
            .enumerate()
            .map(|(j, s)| (s.as_str(), j))
            .collect();
        for (ex_date, event) in self.iter() {
            if let (Some(&t), Some(&j)) = (
                first_period.get(&ex_date),
                columns.get(event.symbol.as_str()),
            ) {
                cash.set(t, j, event.amount);
            }
        }
        cash
    }
}
