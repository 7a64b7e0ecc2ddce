//! Period-indexed price and weight panels plus the alignment helpers the
//! pipeline uses to put them on a common axis.
//!
//! Missing prices and spreads are stored as `NaN`. Panels are validated on
//! construction: periods must be strictly increasing and every matrix must
//! match the period and column axes.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};

use super::error::PixelTraderError;
use super::matrix::Matrix;

pub type Timestamp = DateTime<Utc>;

/// Tolerance on the per-period weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    pub periods: Vec<Timestamp>,
    pub symbols: Vec<String>,
    /// periods x symbols
    pub mid: Matrix,
    /// periods x symbols
    pub spread_bps: Matrix,
}

impl PricePanel {
    pub fn new(
        periods: Vec<Timestamp>,
        symbols: Vec<String>,
        mid: Matrix,
        spread_bps: Matrix,
    ) -> Result<Self, PixelTraderError> {
        check_increasing(&periods, "price panel")?;
        check_shape("mid", &mid, periods.len(), symbols.len())?;
        check_shape("spread_bps", &spread_bps, periods.len(), symbols.len())?;
        Ok(PricePanel {
            periods,
            symbols,
            mid,
            spread_bps,
        })
    }

    pub fn num_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Carry each symbol's last known mid forward over missing cells.
    /// Leading gaps stay missing.
    pub fn forward_fill_mid(&mut self) {
        for j in 0..self.num_symbols() {
            let mut last = f64::NAN;
            for t in 0..self.num_periods() {
                let v = self.mid.get(t, j);
                if v.is_nan() {
                    self.mid.set(t, j, last);
                } else {
                    last = v;
                }
            }
        }
    }

    /// Restrict to the given periods, in order. Every requested period must
    /// exist in the panel.
    pub fn select_periods(&self, periods: &[Timestamp]) -> Result<PricePanel, PixelTraderError> {
        let rows = period_rows(&self.periods, periods, "price panel")?;
        PricePanel::new(
            periods.to_vec(),
            self.symbols.clone(),
            self.mid.select_rows(&rows),
            self.spread_bps.select_rows(&rows),
        )
    }

    /// Keep the symbols for which `keep` returns true, preserving order.
    pub fn retain_symbols<F>(&self, keep: F) -> PricePanel
    where
        F: Fn(&str) -> bool,
    {
        let cols: Vec<usize> = self
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| keep(s.as_str()))
            .map(|(i, _)| i)
            .collect();
        PricePanel {
            periods: self.periods.clone(),
            symbols: cols.iter().map(|&i| self.symbols[i].clone()).collect(),
            mid: self.mid.select_columns(&cols),
            spread_bps: self.spread_bps.select_columns(&cols),
        }
    }

    /// Lay the panel onto `symbols`, in that order. Symbols the panel does
    /// not carry get all-missing columns.
    pub fn reindex_symbols(&self, symbols: &[String]) -> PricePanel {
        let rows = self.num_periods();
        let mut mid = Matrix::filled(rows, symbols.len(), f64::NAN);
        let mut spread_bps = Matrix::filled(rows, symbols.len(), f64::NAN);
        for (j, symbol) in symbols.iter().enumerate() {
            let Some(src) = self.symbol_index(symbol) else {
                continue;
            };
            for t in 0..rows {
                mid.set(t, j, self.mid.get(t, src));
                spread_bps.set(t, j, self.spread_bps.get(t, src));
            }
        }
        PricePanel {
            periods: self.periods.clone(),
            symbols: symbols.to_vec(),
            mid,
            spread_bps,
        }
    }

    /// Periods whose UTC calendar date falls in `[first_day, last_day]`.
    pub fn valuation_window(&self, first_day: NaiveDate, last_day: NaiveDate) -> PricePanel {
        let rows: Vec<usize> = self
            .periods
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let d = p.date_naive();
                first_day <= d && d <= last_day
            })
            .map(|(i, _)| i)
            .collect();
        PricePanel {
            periods: rows.iter().map(|&i| self.periods[i]).collect(),
            symbols: self.symbols.clone(),
            mid: self.mid.select_rows(&rows),
            spread_bps: self.spread_bps.select_rows(&rows),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightPanel {
    pub periods: Vec<Timestamp>,
    /// periods x pixels
    pub weights: Matrix,
}

impl WeightPanel {
    /// Validates that every weight is finite and non-negative and that each
    /// period's weights sum to at most one.
    pub fn new(periods: Vec<Timestamp>, weights: Matrix) -> Result<Self, PixelTraderError> {
        check_increasing(&periods, "weight panel")?;
        if weights.rows() != periods.len() {
            return Err(PixelTraderError::ShapeMismatch {
                what: "weight panel periods".into(),
                expected: periods.len(),
                actual: weights.rows(),
            });
        }
        for (t, row) in weights.iter_rows().enumerate() {
            if let Some(i) = row.iter().position(|w| !w.is_finite() || *w < 0.0) {
                return Err(PixelTraderError::Data {
                    source_name: "weight panel".into(),
                    reason: format!("invalid weight {} at period {}, pixel {}", row[i], periods[t], i),
                });
            }
            let sum: f64 = row.iter().sum();
            if sum > 1.0 + WEIGHT_SUM_TOLERANCE {
                return Err(PixelTraderError::Data {
                    source_name: "weight panel".into(),
                    reason: format!("weights at {} sum to {sum}", periods[t]),
                });
            }
        }
        Ok(WeightPanel { periods, weights })
    }

    /// Normalise raw frame intensities: each pixel is divided by the number
    /// of active (`> 0`) pixels in its frame. A dark frame stays all zero.
    pub fn from_intensities(
        periods: Vec<Timestamp>,
        intensities: &Matrix,
    ) -> Result<Self, PixelTraderError> {
        let mut weights = intensities.clone();
        for t in 0..weights.rows() {
            let row = weights.row_mut(t);
            let active = row.iter().filter(|v| **v > 0.0).count().max(1) as f64;
            for v in row.iter_mut() {
                *v /= active;
            }
        }
        WeightPanel::new(periods, weights)
    }

    pub fn num_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn num_pixels(&self) -> usize {
        self.weights.cols()
    }

    /// Number of pixels with positive weight at period `t`.
    pub fn active_count(&self, t: usize) -> usize {
        self.weights.row(t).iter().filter(|w| **w > 0.0).count()
    }

    pub fn select_periods(&self, periods: &[Timestamp]) -> Result<WeightPanel, PixelTraderError> {
        let rows = period_rows(&self.periods, periods, "weight panel")?;
        Ok(WeightPanel {
            periods: periods.to_vec(),
            weights: self.weights.select_rows(&rows),
        })
    }
}

/// Per-period scale applied to the gross-return term.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSeries {
    pub periods: Vec<Timestamp>,
    pub values: Vec<f64>,
}

impl ScaleSeries {
    pub fn new(periods: Vec<Timestamp>, values: Vec<f64>) -> Result<Self, PixelTraderError> {
        check_increasing(&periods, "scale series")?;
        if values.len() != periods.len() {
            return Err(PixelTraderError::ShapeMismatch {
                what: "scale series".into(),
                expected: periods.len(),
                actual: values.len(),
            });
        }
        Ok(ScaleSeries { periods, values })
    }

    /// Scale values on the given periods. Every period must be present.
    pub fn values_on(&self, periods: &[Timestamp]) -> Result<Vec<f64>, PixelTraderError> {
        let rows = period_rows(&self.periods, periods, "scale series")?;
        Ok(rows.into_iter().map(|r| self.values[r]).collect())
    }
}

/// Sorted intersection of two period axes.
pub fn common_periods(a: &[Timestamp], b: &[Timestamp]) -> Vec<Timestamp> {
    let a: BTreeSet<Timestamp> = a.iter().copied().collect();
    let b: BTreeSet<Timestamp> = b.iter().copied().collect();
    a.intersection(&b).copied().collect()
}

/// Rows of `matrix`, indexed by `available`, at each of `wanted`.
pub fn select_period_rows(
    matrix: &Matrix,
    available: &[Timestamp],
    wanted: &[Timestamp],
) -> Result<Matrix, PixelTraderError> {
    let rows = period_rows(available, wanted, "period series")?;
    Ok(matrix.select_rows(&rows))
}

/// Fails unless both panels share an identical period axis.
pub fn ensure_same_periods(
    prices: &PricePanel,
    weights: &WeightPanel,
) -> Result<(), PixelTraderError> {
    if prices.num_periods() != weights.num_periods() {
        return Err(PixelTraderError::ShapeMismatch {
            what: "aligned periods".into(),
            expected: prices.num_periods(),
            actual: weights.num_periods(),
        });
    }
    if let Some(t) = (0..prices.num_periods()).find(|&t| prices.periods[t] != weights.periods[t]) {
        return Err(PixelTraderError::MisalignedPanels {
            reason: format!(
                "period {t} is {} in prices but {} in weights",
                prices.periods[t], weights.periods[t]
            ),
        });
    }
    Ok(())
}

fn period_rows(
    available: &[Timestamp],
    wanted: &[Timestamp],
    what: &str,
) -> Result<Vec<usize>, PixelTraderError> {
    let index: HashMap<Timestamp, usize> =
        available.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    wanted
        .iter()
        .map(|p| {
            index
                .get(p)
                .copied()
                .ok_or_else(|| PixelTraderError::MisalignedPanels {
                    reason: format!("{what} has no period {p}"),
                })
        })
        .collect()
}

fn check_increasing(periods: &[Timestamp], what: &str) -> Result<(), PixelTraderError> {
    if let Some(w) = periods.windows(2).find(|w| w[0] >= w[1]) {
        return Err(PixelTraderError::MisalignedPanels {
            reason: format!("{what} periods not strictly increasing at {}", w[1]),
        });
    }
    Ok(())
}

fn check_shape(
    what: &str,
    m: &Matrix,
    rows: usize,
    cols: usize,
) -> Result<(), PixelTraderError> {
    if m.rows() != rows {
        return Err(PixelTraderError::ShapeMismatch {
            what: format!("{what} rows"),
            expected: rows,
            actual: m.rows(),
        });
    }
    if m.cols() != cols {
        return Err(PixelTraderError::ShapeMismatch {
            what: format!("{what} columns"),
            expected: cols,
            actual: m.cols(),
        });
    }
    Ok(())
}
