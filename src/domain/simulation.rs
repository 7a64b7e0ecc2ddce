//! Minute-resolution execution simulator.
//!
//! Pixel target weights are replayed at the rebalance cadence against a
//! finer valuation series. Each valuation minute runs, in order: the date
//! boundary (dividend release then accrual), the rebalance if the minute is
//! a rebalance period, and the valuation snapshot.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::assignment::Assignment;
use super::corporate_actions::DividendTable;
use super::error::PixelTraderError;
use super::matrix::Matrix;
use super::panel::{PricePanel, Timestamp, WeightPanel, ensure_same_periods};

/// Capital the pipeline deploys when the config leaves it unset.
pub const DEFAULT_DEPLOYED_CAPITAL: f64 = 1_000_000.0;

/// Usable price: missing or non-positive mids count as zero.
fn usable(mid: f64) -> f64 {
    if mid.is_finite() && mid > 0.0 { mid } else { 0.0 }
}

/// Half of a quoted spread in price fraction. Missing spread means no cost.
fn half_spread(spread_bps: f64) -> f64 {
    if spread_bps.is_finite() && spread_bps >= 0.0 {
        spread_bps / 20_000.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub shares: Vec<f64>,
    /// pay-date -> accrued dividend cash
    pub pending_dividends: BTreeMap<NaiveDate, f64>,
}

impl PortfolioState {
    pub fn new(deployed_capital: f64, num_symbols: usize) -> Self {
        PortfolioState {
            cash: deployed_capital,
            shares: vec![0.0; num_symbols],
            pending_dividends: BTreeMap::new(),
        }
    }

    pub fn pending_total(&self) -> f64 {
        self.pending_dividends.values().sum()
    }

    /// Market value of the holdings at the given mids.
    pub fn positions_value(&self, mids: &[f64]) -> f64 {
        self.shares
            .iter()
            .zip(mids)
            .map(|(s, m)| s * usable(*m))
            .sum()
    }

    /// Move the cash due on `date` out of pending. Returns the amount.
    pub fn release_dividends(&mut self, date: NaiveDate) -> f64 {
        let released = self.pending_dividends.remove(&date).unwrap_or(0.0);
        self.cash += released;
        released
    }

    pub fn accrue_dividend(&mut self, pay_date: NaiveDate, amount: f64) {
        *self.pending_dividends.entry(pay_date).or_insert(0.0) += amount;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavRecord {
    pub period: Timestamp,
    pub nav: f64,
    pub liquid_nav: f64,
    pub cash: f64,
    pub positions: f64,
    pub pending_dividends: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceRecord {
    pub period: Timestamp,
    pub pre_nav: f64,
    pub post_nav: f64,
    pub pre_liquid_nav: f64,
    pub post_liquid_nav: f64,
    pub pre_cash: f64,
    pub post_cash: f64,
    pub pre_positions: f64,
    pub post_positions: f64,
    pub spread_cost: f64,
    /// Pixels with positive weight in this frame.
    pub active_count: usize,
    pub pending_dividends: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub symbols: Vec<String>,
    pub nav_history: Vec<NavRecord>,
    pub rebalance_history: Vec<RebalanceRecord>,
    /// valuation minutes x symbols
    pub shares_history: Matrix,
    /// valuation minutes x symbols, shares at the valuation mid
    pub values_history: Matrix,
}

impl SimulationResult {
    pub fn final_nav(&self) -> Option<f64> {
        self.nav_history.last().map(|r| r.nav)
    }

    /// Final NAV over first NAV, minus one.
    pub fn total_return(&self) -> Option<f64> {
        match (self.nav_history.first(), self.nav_history.last()) {
            (Some(first), Some(last)) if first.nav != 0.0 => Some(last.nav / first.nav - 1.0),
            _ => None,
        }
    }

    pub fn periods(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.nav_history.iter().map(|r| r.period)
    }

    pub fn total_spread_cost(&self) -> f64 {
        self.rebalance_history.iter().map(|r| r.spread_cost).sum()
    }
}

/// Validated inputs of one simulation run.
#[derive(Debug)]
pub struct ExecutionSimulator<'a> {
    rebalance: &'a PricePanel,
    weights: &'a WeightPanel,
    valuation: &'a PricePanel,
    assignment: &'a Assignment,
    dividends: &'a DividendTable,
    deployed_capital: f64,
    /// valuation minute -> rebalance row
    rebalance_rows: Vec<Option<usize>>,
}

impl<'a> ExecutionSimulator<'a> {
    pub fn new(
        rebalance: &'a PricePanel,
        weights: &'a WeightPanel,
        valuation: &'a PricePanel,
        assignment: &'a Assignment,
        dividends: &'a DividendTable,
        deployed_capital: f64,
    ) -> Result<Self, PixelTraderError> {
        if !deployed_capital.is_finite() || deployed_capital <= 0.0 {
            return Err(PixelTraderError::NonPositiveCapital {
                value: deployed_capital,
            });
        }
        if rebalance.symbols != valuation.symbols {
            return Err(PixelTraderError::MisalignedPanels {
                reason: format!(
                    "rebalance panel has {} symbols, valuation panel has {} (or a different order)",
                    rebalance.num_symbols(),
                    valuation.num_symbols()
                ),
            });
        }
        ensure_same_periods(rebalance, weights)?;
        if assignment.num_symbols() != rebalance.num_symbols() {
            return Err(PixelTraderError::ShapeMismatch {
                what: "assignment symbols".into(),
                expected: rebalance.num_symbols(),
                actual: assignment.num_symbols(),
            });
        }
        if assignment.num_pixels() != weights.num_pixels() {
            return Err(PixelTraderError::ShapeMismatch {
                what: "assignment pixels".into(),
                expected: weights.num_pixels(),
                actual: assignment.num_pixels(),
            });
        }

        let minute_index: HashMap<Timestamp, usize> = valuation
            .periods
            .iter()
            .enumerate()
            .map(|(k, p)| (*p, k))
            .collect();
        let mut rebalance_rows = vec![None; valuation.num_periods()];
        for (r, period) in rebalance.periods.iter().enumerate() {
            let k = minute_index
                .get(period)
                .ok_or_else(|| PixelTraderError::MisalignedPanels {
                    reason: format!("rebalance period {period} is not a valuation minute"),
                })?;
            rebalance_rows[*k] = Some(r);
        }

        Ok(ExecutionSimulator {
            rebalance,
            weights,
            valuation,
            assignment,
            dividends,
            deployed_capital,
            rebalance_rows,
        })
    }

    pub fn run(&self) -> Result<SimulationResult, PixelTraderError> {
        let n_symbols = self.valuation.num_symbols();
        let n_minutes = self.valuation.num_periods();
        let columns: HashMap<&str, usize> = self
            .valuation
            .symbols
            .iter()
            .enumerate()
            .map(|(j, s)| (s.as_str(), j))
            .collect();

        tracing::info!(
            symbols = n_symbols,
            rebalances = self.rebalance.num_periods(),
            minutes = n_minutes,
            capital = self.deployed_capital,
            "starting simulation"
        );

        let mut state = PortfolioState::new(self.deployed_capital, n_symbols);
        let mut nav_history = Vec::with_capacity(n_minutes);
        let mut rebalance_history = Vec::with_capacity(self.rebalance.num_periods());
        let mut shares_history = Matrix::zeros(n_minutes, n_symbols);
        let mut values_history = Matrix::zeros(n_minutes, n_symbols);
        let mut current_day: Option<NaiveDate> = None;

        for (k, &period) in self.valuation.periods.iter().enumerate() {
            let day = period.date_naive();
            if current_day != Some(day) {
                current_day = Some(day);
                self.cross_date_boundary(&mut state, day, &columns);
            }

            if let Some(r) = self.rebalance_rows[k] {
                let record = self.rebalance_at(&mut state, r)?;
                rebalance_history.push(record);
            }

            let val_mid = self.valuation.mid.row(k);
            let shares_row = shares_history.row_mut(k);
            shares_row.copy_from_slice(&state.shares);
            let values_row = values_history.row_mut(k);
            for j in 0..n_symbols {
                values_row[j] = state.shares[j] * usable(val_mid[j]);
            }
            let positions: f64 = values_row.iter().sum();
            let pending = state.pending_total();
            nav_history.push(NavRecord {
                period,
                nav: state.cash + positions + pending,
                liquid_nav: state.cash + positions,
                cash: state.cash,
                positions,
                pending_dividends: pending,
            });
        }

        let result = SimulationResult {
            symbols: self.valuation.symbols.clone(),
            nav_history,
            rebalance_history,
            shares_history,
            values_history,
        };
        if let (Some(nav), Some(ret)) = (result.final_nav(), result.total_return()) {
            tracing::info!(
                final_nav = nav,
                total_return_pct = ret * 100.0,
                spread_cost = result.total_spread_cost(),
                "simulation finished"
            );
        }
        Ok(result)
    }

    fn cross_date_boundary(
        &self,
        state: &mut PortfolioState,
        day: NaiveDate,
        columns: &HashMap<&str, usize>,
    ) {
        let released = state.release_dividends(day);
        if released > 0.0 {
            tracing::debug!(%day, released, "dividends paid");
        }
        for event in self.dividends.events_on(day) {
            let Some(&j) = columns.get(event.symbol.as_str()) else {
                continue;
            };
            let held = state.shares[j];
            if held > 0.0 {
                state.accrue_dividend(event.pay_date, held * event.amount);
                tracing::debug!(
                    symbol = %event.symbol,
                    ex_date = %day,
                    pay_date = %event.pay_date,
                    amount = held * event.amount,
                    "dividend accrued"
                );
            }
        }
    }

    fn rebalance_at(
        &self,
        state: &mut PortfolioState,
        r: usize,
    ) -> Result<RebalanceRecord, PixelTraderError> {
        let period = self.rebalance.periods[r];
        let mids: Vec<f64> = self.rebalance.mid.row(r).iter().map(|m| usable(*m)).collect();
        if !mids.iter().any(|m| *m > 0.0) {
            return Err(PixelTraderError::NoPricedSymbols {
                period: period.to_rfc3339(),
            });
        }
        let spreads = self.rebalance.spread_bps.row(r);

        let pre_cash = state.cash;
        let pre_positions = state.positions_value(&mids);
        let pre_liquid_nav = pre_cash + pre_positions;
        let pending = state.pending_total();

        let targets = self.assignment.symbol_weights(self.weights.weights.row(r));
        let target_sum: f64 = targets.iter().sum();

        let mut spread_cost = 0.0;
        if target_sum > 0.0 {
            let mut sell_proceeds = 0.0;
            let mut sell_value = 0.0;
            let mut buy_cost = 0.0;
            let mut buy_value = 0.0;
            for j in 0..mids.len() {
                let mid = mids[j];
                let target = if mid > 0.0 {
                    targets[j] * pre_liquid_nav / mid
                } else {
                    0.0
                };
                let delta = target - state.shares[j];
                let h = half_spread(spreads[j]);
                if delta < 0.0 {
                    sell_proceeds += -delta * mid * (1.0 - h);
                    sell_value += -delta * mid;
                } else if delta > 0.0 {
                    buy_cost += delta * mid * (1.0 + h);
                    buy_value += delta * mid;
                }
                state.shares[j] = target;
            }
            state.cash += sell_proceeds - buy_cost;
            spread_cost = (sell_value - sell_proceeds) + (buy_cost - buy_value);
        } else {
            let mut proceeds = 0.0;
            for j in 0..mids.len() {
                let held = state.shares[j];
                proceeds += held * mids[j] * (1.0 - half_spread(spreads[j]));
                spread_cost += held * mids[j] * half_spread(spreads[j]);
                state.shares[j] = 0.0;
            }
            state.cash += proceeds;
            tracing::debug!(%period, proceeds, "dark frame, liquidated");
        }

        let post_positions = state.positions_value(&mids);
        let post_liquid_nav = state.cash + post_positions;
        Ok(RebalanceRecord {
            period,
            pre_nav: pre_liquid_nav + pending,
            post_nav: post_liquid_nav + pending,
            pre_liquid_nav,
            post_liquid_nav,
            pre_cash,
            post_cash: state.cash,
            pre_positions,
            post_positions,
            spread_cost,
            active_count: self.weights.active_count(r),
            pending_dividends: pending,
        })
    }
}
