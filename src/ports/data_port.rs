//! Data access port trait.
//!
//! Every loader returns domain types; where the data comes from is the
//! adapter's business.

use crate::domain::corporate_actions::{DividendTable, SplitTable};
use crate::domain::error::PixelTraderError;
use crate::domain::panel::{PricePanel, ScaleSeries, WeightPanel};

pub trait DataPort {
    /// Rebalance-cadence mids and spreads, symbol-complete.
    fn load_rebalance_prices(&self) -> Result<PricePanel, PixelTraderError>;

    /// Valuation-cadence mids and spreads for every symbol; gaps are `NaN`.
    fn load_valuation_prices(&self) -> Result<PricePanel, PixelTraderError>;

    /// Normalised pixel target weights.
    fn load_weights(&self) -> Result<WeightPanel, PixelTraderError>;

    /// Optional per-period gross-return scale.
    fn load_scale(&self) -> Result<Option<ScaleSeries>, PixelTraderError>;

    fn load_splits(&self) -> Result<SplitTable, PixelTraderError>;

    fn load_dividends(&self) -> Result<DividendTable, PixelTraderError>;

    /// Persisted `(symbol, slot)` rows.
    fn load_assignment(&self) -> Result<Vec<(String, usize)>, PixelTraderError>;
}
