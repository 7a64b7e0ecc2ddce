//! CSV and JSON file data adapter.
//!
//! Price files are long form (`period,symbol,mid,spread_bps`). For the
//! rebalance panel, rows with a negative spread are dropped, then any symbol
//! without a row for every period is dropped, so the panel is
//! symbol-complete. The valuation panel keeps every symbol and stores gaps as
//! missing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapters::json_tables::{parse_dividends, parse_instant, parse_splits};
use crate::domain::corporate_actions::{DividendTable, SplitTable};
use crate::domain::error::PixelTraderError;
use crate::domain::matrix::Matrix;
use crate::domain::panel::{PricePanel, ScaleSeries, Timestamp, WeightPanel};
use crate::ports::data_port::DataPort;

/// Input file locations. Optional tables default to empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPaths {
    pub prices: PathBuf,
    pub valuation_prices: Option<PathBuf>,
    pub frames: PathBuf,
    pub scale: Option<PathBuf>,
    pub splits: Option<PathBuf>,
    pub dividends: Option<PathBuf>,
    pub assignment: Option<PathBuf>,
}

pub struct CsvAdapter {
    paths: DataPaths,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    period: String,
    symbol: String,
    mid: Option<f64>,
    spread_bps: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ScaleRow {
    timestamp: String,
    s: f64,
}

#[derive(Debug, Deserialize)]
struct AssignmentRow {
    symbol: String,
    pixel_index: usize,
}

fn data_error(path: &Path, reason: impl Into<String>) -> PixelTraderError {
    PixelTraderError::Data {
        source_name: path.display().to_string(),
        reason: reason.into(),
    }
}

fn read_file(path: &Path) -> Result<String, PixelTraderError> {
    fs::read_to_string(path).map_err(|e| data_error(path, format!("failed to read: {e}")))
}

fn parse_period(path: &Path, value: &str) -> Result<Timestamp, PixelTraderError> {
    parse_instant(value.trim()).ok_or_else(|| data_error(path, format!("invalid timestamp '{value}'")))
}

/// Long-form rows gathered per symbol, each symbol's cells keyed by period.
struct LongRows {
    periods: Vec<Timestamp>,
    by_symbol: BTreeMap<String, BTreeMap<Timestamp, (f64, f64)>>,
    negative_spreads: usize,
}

/// With `drop_negative_spread` a row with a negative spread is skipped
/// entirely; otherwise its mid is kept and its spread stored as missing.
fn read_long_rows(path: &Path, drop_negative_spread: bool) -> Result<LongRows, PixelTraderError> {
    let content = read_file(path)?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());

    let mut by_symbol: BTreeMap<String, BTreeMap<Timestamp, (f64, f64)>> = BTreeMap::new();
    let mut periods = BTreeSet::new();
    let mut negative_spreads = 0usize;
    for result in rdr.deserialize() {
        let row: PriceRow = result?;
        let mut spread = row.spread_bps.unwrap_or(f64::NAN);
        if spread < 0.0 {
            negative_spreads += 1;
            if drop_negative_spread {
                continue;
            }
            spread = f64::NAN;
        }
        let period = parse_period(path, &row.period)?;
        periods.insert(period);
        let mid = row.mid.unwrap_or(f64::NAN);
        if !by_symbol.contains_key(&row.symbol) {
            by_symbol.insert(row.symbol.clone(), BTreeMap::new());
        }
        let Some(cells) = by_symbol.get_mut(&row.symbol) else {
            continue;
        };
        if cells.insert(period, (mid, spread)).is_some() {
            return Err(data_error(
                path,
                format!("duplicate row for {} at {period}", row.symbol),
            ));
        }
    }
    Ok(LongRows {
        periods: periods.into_iter().collect(),
        by_symbol,
        negative_spreads,
    })
}

/// Lay per-symbol cells onto the period axis; absent cells stay `NaN`.
fn assemble(
    periods: Vec<Timestamp>,
    columns: Vec<(String, BTreeMap<Timestamp, (f64, f64)>)>,
) -> Result<PricePanel, PixelTraderError> {
    let row_of: HashMap<Timestamp, usize> =
        periods.iter().enumerate().map(|(t, p)| (*p, t)).collect();
    let mut mid = Matrix::filled(periods.len(), columns.len(), f64::NAN);
    let mut spread_bps = Matrix::filled(periods.len(), columns.len(), f64::NAN);
    let mut symbols = Vec::with_capacity(columns.len());
    for (j, (symbol, cells)) in columns.into_iter().enumerate() {
        for (period, (m, s)) in cells {
            if let Some(&t) = row_of.get(&period) {
                mid.set(t, j, m);
                spread_bps.set(t, j, s);
            }
        }
        symbols.push(symbol);
    }
    PricePanel::new(periods, symbols, mid, spread_bps)
}

/// Build a symbol-complete panel from long-form price rows.
pub fn read_price_panel(path: &Path) -> Result<PricePanel, PixelTraderError> {
    let LongRows {
        periods,
        by_symbol,
        negative_spreads,
    } = read_long_rows(path, true)?;
    let total = by_symbol.len();
    let complete: Vec<(String, BTreeMap<Timestamp, (f64, f64)>)> = by_symbol
        .into_iter()
        .filter(|(_, cells)| cells.len() == periods.len())
        .collect();
    let incomplete = total - complete.len();
    if negative_spreads > 0 || incomplete > 0 {
        tracing::warn!(
            file = %path.display(),
            negative_spreads,
            incomplete_symbols = incomplete,
            "dropped price rows"
        );
    }
    tracing::info!(
        file = %path.display(),
        periods = periods.len(),
        symbols = complete.len(),
        "loaded price panel"
    );
    assemble(periods, complete)
}

/// Build a valuation panel that keeps every symbol. Minutes a symbol has no
/// row for are stored as missing and left to the forward fill.
pub fn read_valuation_panel(path: &Path) -> Result<PricePanel, PixelTraderError> {
    let LongRows {
        periods,
        by_symbol,
        negative_spreads,
    } = read_long_rows(path, false)?;
    let gaps: usize = by_symbol
        .values()
        .map(|cells| periods.len() - cells.len())
        .sum();
    tracing::info!(
        file = %path.display(),
        periods = periods.len(),
        symbols = by_symbol.len(),
        gaps,
        negative_spreads,
        "loaded valuation panel"
    );
    assemble(periods, by_symbol.into_iter().collect())
}

/// Wide frame file `timestamp,p0,...` normalised to target weights.
pub fn read_frames(path: &Path) -> Result<WeightPanel, PixelTraderError> {
    let content = read_file(path)?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let num_pixels = rdr.headers()?.len().saturating_sub(1);

    let mut frames: Vec<(Timestamp, Vec<f64>)> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let stamp = record
            .get(0)
            .ok_or_else(|| data_error(path, "missing timestamp column"))?;
        let period = parse_period(path, stamp)?;
        let values = record
            .iter()
            .skip(1)
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| data_error(path, format!("invalid intensity '{v}' at {stamp}: {e}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if values.len() != num_pixels {
            return Err(PixelTraderError::ShapeMismatch {
                what: format!("frame at {stamp}"),
                expected: num_pixels,
                actual: values.len(),
            });
        }
        frames.push((period, values));
    }
    frames.sort_by_key(|(p, _)| *p);

    let periods: Vec<Timestamp> = frames.iter().map(|(p, _)| *p).collect();
    let intensities = Matrix::from_rows(frames.into_iter().map(|(_, v)| v).collect())?;
    let intensities = if intensities.rows() == 0 {
        Matrix::zeros(0, num_pixels)
    } else {
        intensities
    };
    tracing::info!(
        file = %path.display(),
        frames = periods.len(),
        pixels = num_pixels,
        "loaded frames"
    );
    WeightPanel::from_intensities(periods, &intensities)
}

pub fn read_scale(path: &Path) -> Result<ScaleSeries, PixelTraderError> {
    let content = read_file(path)?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: ScaleRow = result?;
        rows.push((parse_period(path, &row.timestamp)?, row.s));
    }
    rows.sort_by_key(|(p, _)| *p);
    let (periods, values) = rows.into_iter().unzip();
    ScaleSeries::new(periods, values)
}

pub fn read_assignment(path: &Path) -> Result<Vec<(String, usize)>, PixelTraderError> {
    let content = read_file(path)?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: AssignmentRow = result?;
        rows.push((row.symbol, row.pixel_index));
    }
    Ok(rows)
}

impl CsvAdapter {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    fn required<'a>(path: Option<&'a PathBuf>, key: &str) -> Result<&'a PathBuf, PixelTraderError> {
        path.ok_or_else(|| PixelTraderError::ConfigMissing {
            section: "data".to_string(),
            key: key.to_string(),
        })
    }
}

impl DataPort for CsvAdapter {
    fn load_rebalance_prices(&self) -> Result<PricePanel, PixelTraderError> {
        read_price_panel(&self.paths.prices)
    }

    fn load_valuation_prices(&self) -> Result<PricePanel, PixelTraderError> {
        read_valuation_panel(Self::required(
            self.paths.valuation_prices.as_ref(),
            "valuation_prices",
        )?)
    }

    fn load_weights(&self) -> Result<WeightPanel, PixelTraderError> {
        read_frames(&self.paths.frames)
    }

    fn load_scale(&self) -> Result<Option<ScaleSeries>, PixelTraderError> {
        self.paths.scale.as_deref().map(read_scale).transpose()
    }

    fn load_splits(&self) -> Result<SplitTable, PixelTraderError> {
        match &self.paths.splits {
            Some(path) => parse_splits(&read_file(path)?),
            None => Ok(SplitTable::new()),
        }
    }

    fn load_dividends(&self) -> Result<DividendTable, PixelTraderError> {
        match &self.paths.dividends {
            Some(path) => parse_dividends(&read_file(path)?),
            None => Ok(DividendTable::new()),
        }
    }

    fn load_assignment(&self) -> Result<Vec<(String, usize)>, PixelTraderError> {
        read_assignment(Self::required(self.paths.assignment.as_ref(), "assignment")?)
    }
}
