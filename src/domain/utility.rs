//! Symbol x pixel utility matrix: expected gross return of holding a
//! pixel's weight path in a symbol, minus the spread cost of trading it.
//!
//! With `r` the per-period simple returns (T x N), `w` the pixel weights
//! (T x P), `k` the half-spreads (T x N) and `s` an optional per-period
//! scale, for every symbol `j` and pixel `i`:
//!
//! ```text
//! G[j,i] = sum_{t>=1} r[t,j] * s[t] * w[t-1,i]
//! C[j,i] = sum_{t>=1} |w[t,i] - w[t-1,i] * (1 + r[t,j])| * k[t,j]
//! U[j,i] = G[j,i] - C[j,i]
//! ```
//!
//! The cost term is accumulated per pixel column on the rayon pool; the
//! T x N x P tensor is never materialised.

use rayon::prelude::*;

use super::corporate_actions::DividendTable;
use super::error::PixelTraderError;
use super::matrix::Matrix;
use super::panel::{PricePanel, WeightPanel, ensure_same_periods};

/// `r[t,j] = (mid[t,j] + div[t,j]) / mid[t-1,j] - 1`, with `r[0,*] = 0`.
/// Non-finite results (missing or zero prices) become 0.
pub fn compute_returns(mid: &Matrix, dividend_cash: Option<&Matrix>) -> Matrix {
    let (periods, symbols) = mid.shape();
    let mut returns = Matrix::zeros(periods, symbols);
    for t in 1..periods {
        for j in 0..symbols {
            let div = dividend_cash.map_or(0.0, |d| d.get(t, j));
            let r = (mid.get(t, j) + div) / mid.get(t - 1, j) - 1.0;
            if r.is_finite() {
                returns.set(t, j, r);
            }
        }
    }
    returns
}

/// Fraction of mid lost crossing half the spread. Missing or negative
/// spreads cost nothing.
pub fn half_spreads(spread_bps: &Matrix) -> Matrix {
    let (periods, symbols) = spread_bps.shape();
    let mut k = Matrix::zeros(periods, symbols);
    for t in 0..periods {
        for j in 0..symbols {
            let bps = spread_bps.get(t, j);
            if bps.is_finite() && bps >= 0.0 {
                k.set(t, j, bps / 10_000.0 * 0.5);
            }
        }
    }
    k
}

/// `G = r[1..]^T * (s[1..] * w[..T-1])`, shape N x P.
pub fn gross_return_matrix(returns: &Matrix, weights: &Matrix, scale: &[f64]) -> Matrix {
    let (periods, symbols) = returns.shape();
    let pixels = weights.cols();
    let mut gross = Matrix::zeros(symbols, pixels);
    for t in 1..periods {
        let w_prev = weights.row(t - 1);
        for j in 0..symbols {
            let r = returns.get(t, j) * scale[t];
            if r == 0.0 {
                continue;
            }
            let out = gross.row_mut(j);
            for (g, w) in out.iter_mut().zip(w_prev) {
                *g += r * w;
            }
        }
    }
    gross
}

/// Drift-adjusted turnover cost, shape N x P. Each pixel column is summed
/// over time by one rayon task and the columns are gathered at the end.
pub fn cost_matrix(
    returns: &Matrix,
    weights: &Matrix,
    half_spread: &Matrix,
) -> Result<Matrix, PixelTraderError> {
    let (periods, symbols) = returns.shape();
    let pixels = weights.cols();

    let columns: Vec<Vec<f64>> = (0..pixels)
        .into_par_iter()
        .map(|i| {
            let mut column = vec![0.0; symbols];
            for (j, cost) in column.iter_mut().enumerate() {
                let mut acc = 0.0;
                for t in 1..periods {
                    let drifted = weights.get(t - 1, i) * (1.0 + returns.get(t, j));
                    acc += (weights.get(t, i) - drifted).abs() * half_spread.get(t, j);
                }
                *cost = acc;
            }
            column
        })
        .collect();

    Matrix::from_columns(symbols, columns)
}

/// Builds the utility matrix from panels that share one period axis.
pub struct UtilityMatrixBuilder<'a> {
    prices: &'a PricePanel,
    weights: &'a WeightPanel,
    dividends: Option<&'a DividendTable>,
    scale: Option<&'a [f64]>,
    returns: Option<&'a Matrix>,
}

impl<'a> UtilityMatrixBuilder<'a> {
    pub fn new(prices: &'a PricePanel, weights: &'a WeightPanel) -> Self {
        UtilityMatrixBuilder {
            prices,
            weights,
            dividends: None,
            scale: None,
            returns: None,
        }
    }

    pub fn with_dividends(mut self, dividends: &'a DividendTable) -> Self {
        self.dividends = Some(dividends);
        self
    }

    /// Per-period notional multiplier, one value per period.
    pub fn with_scale(mut self, scale: &'a [f64]) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Returns measured on the source price axis and selected onto these
    /// periods. When set, the builder neither differences adjacent rows nor
    /// places dividends itself.
    pub fn with_returns(mut self, returns: &'a Matrix) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn build(&self) -> Result<Matrix, PixelTraderError> {
        ensure_same_periods(self.prices, self.weights)?;
        let periods = self.prices.num_periods();

        let ones;
        let scale: &[f64] = match self.scale {
            Some(s) if s.len() != periods => {
                return Err(PixelTraderError::ShapeMismatch {
                    what: "scale series".into(),
                    expected: periods,
                    actual: s.len(),
                });
            }
            Some(s) => s,
            None => {
                ones = vec![1.0; periods];
                &ones[..]
            }
        };

        tracing::info!(
            periods,
            symbols = self.prices.num_symbols(),
            pixels = self.weights.num_pixels(),
            "building utility matrix"
        );

        let computed;
        let returns = match self.returns {
            Some(r) if r.shape() != self.prices.mid.shape() => {
                return Err(PixelTraderError::ShapeMismatch {
                    what: "return matrix".into(),
                    expected: periods * self.prices.num_symbols(),
                    actual: r.rows() * r.cols(),
                });
            }
            Some(r) => r,
            None => {
                let dividend_cash = self
                    .dividends
                    .map(|d| d.cash_by_period(&self.prices.periods, &self.prices.symbols));
                computed = compute_returns(&self.prices.mid, dividend_cash.as_ref());
                &computed
            }
        };
        let half_spread = half_spreads(&self.prices.spread_bps);
        let gross = gross_return_matrix(returns, &self.weights.weights, scale);
        let cost = cost_matrix(returns, &self.weights.weights, &half_spread)?;
        gross.sub(&cost)
    }
}
