#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use pixeltrader::domain::corporate_actions::{DividendTable, SplitTable};
use pixeltrader::domain::error::PixelTraderError;
use pixeltrader::domain::matrix::Matrix;
use pixeltrader::domain::panel::{PricePanel, ScaleSeries, Timestamp, WeightPanel};
use pixeltrader::domain::pipeline::PipelineConfig;
use pixeltrader::ports::data_port::DataPort;
use std::collections::HashMap;

/// In-memory DataPort. Loaders for panels that were never supplied fail
/// with a data error, tables default to empty.
#[derive(Default)]
pub struct MockDataPort {
    pub rebalance: Option<PricePanel>,
    pub valuation: Option<PricePanel>,
    pub weights: Option<WeightPanel>,
    pub scale: Option<ScaleSeries>,
    pub splits: SplitTable,
    pub dividends: DividendTable,
    pub assignment: Vec<(String, usize)>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rebalance_prices(mut self, panel: PricePanel) -> Self {
        self.rebalance = Some(panel);
        self
    }

    pub fn with_valuation_prices(mut self, panel: PricePanel) -> Self {
        self.valuation = Some(panel);
        self
    }

    pub fn with_weights(mut self, weights: WeightPanel) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_scale(mut self, scale: ScaleSeries) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_splits(mut self, splits: SplitTable) -> Self {
        self.splits = splits;
        self
    }

    pub fn with_dividends(mut self, dividends: DividendTable) -> Self {
        self.dividends = dividends;
        self
    }

    pub fn with_assignment(mut self, rows: &[(&str, usize)]) -> Self {
        self.assignment = rows.iter().map(|(s, p)| (s.to_string(), *p)).collect();
        self
    }

    pub fn with_error(mut self, loader: &str, reason: &str) -> Self {
        self.errors.insert(loader.to_string(), reason.to_string());
        self
    }

    fn check(&self, loader: &str) -> Result<(), PixelTraderError> {
        match self.errors.get(loader) {
            Some(reason) => Err(PixelTraderError::Data {
                source_name: loader.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn missing(loader: &str) -> PixelTraderError {
        PixelTraderError::Data {
            source_name: loader.to_string(),
            reason: "not supplied".to_string(),
        }
    }
}

impl DataPort for MockDataPort {
    fn load_rebalance_prices(&self) -> Result<PricePanel, PixelTraderError> {
        self.check("rebalance")?;
        self.rebalance.clone().ok_or_else(|| Self::missing("rebalance"))
    }

    fn load_valuation_prices(&self) -> Result<PricePanel, PixelTraderError> {
        self.check("valuation")?;
        self.valuation.clone().ok_or_else(|| Self::missing("valuation"))
    }

    fn load_weights(&self) -> Result<WeightPanel, PixelTraderError> {
        self.check("weights")?;
        self.weights.clone().ok_or_else(|| Self::missing("weights"))
    }

    fn load_scale(&self) -> Result<Option<ScaleSeries>, PixelTraderError> {
        self.check("scale")?;
        Ok(self.scale.clone())
    }

    fn load_splits(&self) -> Result<SplitTable, PixelTraderError> {
        self.check("splits")?;
        Ok(self.splits.clone())
    }

    fn load_dividends(&self) -> Result<DividendTable, PixelTraderError> {
        self.check("dividends")?;
        Ok(self.dividends.clone())
    }

    fn load_assignment(&self) -> Result<Vec<(String, usize)>, PixelTraderError> {
        self.check("assignment")?;
        Ok(self.assignment.clone())
    }
}

/// 2025-03-`day` `hour`:`minute` UTC.
pub fn ts(day: u32, hour: u32, minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

/// `count` timestamps `step_minutes` apart starting at `start`.
pub fn periods_from(start: Timestamp, count: usize, step_minutes: i64) -> Vec<Timestamp> {
    (0..count)
        .map(|i| start + Duration::minutes(step_minutes * i as i64))
        .collect()
}

pub fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn price_panel(
    periods: Vec<Timestamp>,
    names: &[&str],
    mids: Vec<Vec<f64>>,
    spread_bps: f64,
) -> PricePanel {
    let rows = periods.len();
    PricePanel::new(
        periods,
        symbols(names),
        Matrix::from_rows(mids).unwrap(),
        Matrix::filled(rows, names.len(), spread_bps),
    )
    .unwrap()
}

pub fn weight_panel(periods: Vec<Timestamp>, rows: Vec<Vec<f64>>) -> WeightPanel {
    WeightPanel::new(periods, Matrix::from_rows(rows).unwrap()).unwrap()
}

pub fn pipeline_config(width: usize, height: usize) -> PipelineConfig {
    PipelineConfig {
        width,
        height,
        forced: Vec::new(),
        deployed_capital: 1_000_000.0,
    }
}
