//! The two batch steps: solve the symbol-to-pixel assignment, then simulate
//! execution under a persisted assignment.

use std::collections::HashSet;

use super::assignment::{Assignment, resolve_forced, solve_assignment};
use super::corporate_actions::apply_splits;
use super::error::PixelTraderError;
use super::matrix::Matrix;
use super::panel::{PricePanel, WeightPanel, common_periods, select_period_rows};
use super::simulation::{ExecutionSimulator, SimulationResult};
use super::utility::{UtilityMatrixBuilder, compute_returns};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub width: usize,
    pub height: usize,
    pub forced: Vec<(String, usize)>,
    pub deployed_capital: f64,
}

impl PipelineConfig {
    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }
}

#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub symbols: Vec<String>,
    pub utility: Matrix,
    pub assignment: Assignment,
}

/// Load, split-adjust and forward-fill a price panel.
fn adjusted(mut panel: PricePanel, data: &dyn DataPort) -> Result<PricePanel, PixelTraderError> {
    let splits = data.load_splits()?;
    apply_splits(&mut panel, &splits);
    panel.forward_fill_mid();
    Ok(panel)
}

/// Put rebalance prices and weights on their shared periods.
fn align(
    prices: PricePanel,
    weights: WeightPanel,
    num_pixels: usize,
) -> Result<(PricePanel, WeightPanel), PixelTraderError> {
    if weights.num_pixels() != num_pixels {
        return Err(PixelTraderError::ShapeMismatch {
            what: "frame pixels".into(),
            expected: num_pixels,
            actual: weights.num_pixels(),
        });
    }
    let common = common_periods(&prices.periods, &weights.periods);
    if common.is_empty() {
        return Err(PixelTraderError::MisalignedPanels {
            reason: "prices and frames share no period".into(),
        });
    }
    tracing::info!(
        periods = common.len(),
        dropped_price_periods = prices.num_periods() - common.len(),
        dropped_frames = weights.num_periods() - common.len(),
        "aligned prices and frames"
    );
    Ok((prices.select_periods(&common)?, weights.select_periods(&common)?))
}

pub fn run_assignment(
    data: &dyn DataPort,
    config: &PipelineConfig,
) -> Result<AssignmentOutcome, PixelTraderError> {
    let num_pixels = config.num_pixels();
    let prices = adjusted(data.load_rebalance_prices()?, data)?;

    // Returns and dividend placement use every price period, so a bar with
    // no frame still links its neighbours.
    let dividends = data.load_dividends()?;
    let dividend_cash = dividends.cash_by_period(&prices.periods, &prices.symbols);
    let full_returns = compute_returns(&prices.mid, Some(&dividend_cash));
    let price_periods = prices.periods.clone();

    let (prices, weights) = align(prices, data.load_weights()?, num_pixels)?;
    let returns = select_period_rows(&full_returns, &price_periods, &prices.periods)?;
    let scale = data
        .load_scale()?
        .map(|s| s.values_on(&prices.periods))
        .transpose()?;
    let mut builder = UtilityMatrixBuilder::new(&prices, &weights).with_returns(&returns);
    if let Some(scale) = scale.as_deref() {
        builder = builder.with_scale(scale);
    }
    let utility = builder.build()?;

    let forced = resolve_forced(&prices.symbols, &config.forced, num_pixels)?;
    let assignment = solve_assignment(&utility, &forced)?;
    Ok(AssignmentOutcome {
        symbols: prices.symbols,
        utility,
        assignment,
    })
}

pub fn run_simulation(
    data: &dyn DataPort,
    config: &PipelineConfig,
) -> Result<SimulationResult, PixelTraderError> {
    let num_pixels = config.num_pixels();
    let rebalance = adjusted(data.load_rebalance_prices()?, data)?;
    let (rebalance, weights) = align(rebalance, data.load_weights()?, num_pixels)?;

    let table = data.load_assignment()?;
    let assigned: HashSet<&str> = table
        .iter()
        .filter(|(_, slot)| *slot < num_pixels)
        .map(|(symbol, _)| symbol.as_str())
        .collect();
    let rebalance = rebalance.retain_symbols(|s| assigned.contains(s));
    if rebalance.num_symbols() < assigned.len() {
        tracing::warn!(
            assigned = assigned.len(),
            priced = rebalance.num_symbols(),
            "some assigned symbols have no rebalance prices"
        );
    }
    let assignment = Assignment::from_table(&rebalance.symbols, &table, num_pixels)?;

    let (first_day, last_day) = match (rebalance.periods.first(), rebalance.periods.last()) {
        (Some(first), Some(last)) => (first.date_naive(), last.date_naive()),
        _ => {
            return Err(PixelTraderError::MisalignedPanels {
                reason: "no rebalance periods".into(),
            });
        }
    };
    let valuation = adjusted(data.load_valuation_prices()?, data)?;
    let unpriced = rebalance
        .symbols
        .iter()
        .filter(|s| valuation.symbol_index(s).is_none())
        .count();
    if unpriced > 0 {
        tracing::warn!(unpriced, "assigned symbols missing from valuation prices");
    }
    let valuation = valuation
        .reindex_symbols(&rebalance.symbols)
        .valuation_window(first_day, last_day);
    tracing::info!(
        symbols = rebalance.num_symbols(),
        rebalances = rebalance.num_periods(),
        minutes = valuation.num_periods(),
        "prepared simulation universe"
    );

    let dividends = data.load_dividends()?;
    ExecutionSimulator::new(
        &rebalance,
        &weights,
        &valuation,
        &assignment,
        &dividends,
        config.deployed_capital,
    )?
    .run()
}
