//! Domain error types.

/// Top-level error type for pixeltrader.
#[derive(Debug, thiserror::Error)]
pub enum PixelTraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error in {source_name}: {reason}")]
    Data { source_name: String, reason: String },

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("misaligned panels: {reason}")]
    MisalignedPanels { reason: String },

    #[error("forced pixel {pixel} for {symbol} is outside [0, {num_pixels})")]
    ForcedPixelOutOfRange {
        symbol: String,
        pixel: usize,
        num_pixels: usize,
    },

    #[error("forced symbol index {index} is outside [0, {num_symbols})")]
    ForcedSymbolOutOfRange { index: usize, num_symbols: usize },

    #[error("duplicate forced assignment: {reason}")]
    DuplicateForced { reason: String },

    #[error("utility matrix has a non-finite entry at ({row}, {col})")]
    InvalidUtility { row: usize, col: usize },

    #[error("no symbol has a positive mid price at rebalance {period}")]
    NoPricedSymbols { period: String },

    #[error("deployed capital must be positive, got {value}")]
    NonPositiveCapital { value: f64 },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PixelTraderError> for std::process::ExitCode {
    fn from(err: &PixelTraderError) -> Self {
        let code: u8 = match err {
            PixelTraderError::Io(_) => 1,
            PixelTraderError::ConfigParse { .. }
            | PixelTraderError::ConfigMissing { .. }
            | PixelTraderError::ConfigInvalid { .. } => 2,
            PixelTraderError::Data { .. }
            | PixelTraderError::Json(_)
            | PixelTraderError::Csv(_) => 3,
            PixelTraderError::ShapeMismatch { .. } | PixelTraderError::MisalignedPanels { .. } => 4,
            PixelTraderError::ForcedPixelOutOfRange { .. }
            | PixelTraderError::ForcedSymbolOutOfRange { .. }
            | PixelTraderError::DuplicateForced { .. }
            | PixelTraderError::InvalidUtility { .. } => 5,
            PixelTraderError::NoPricedSymbols { .. }
            | PixelTraderError::NonPositiveCapital { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
