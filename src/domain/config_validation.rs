//! Configuration validation.
//!
//! Validates every config field a run reads before any data is loaded.

use std::collections::HashSet;

use crate::domain::error::PixelTraderError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_WIDTH: i64 = 64;
pub const DEFAULT_HEIGHT: i64 = 48;

pub fn validate_assign_config(config: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    require_path(config, "data", "prices")?;
    require_path(config, "data", "frames")?;
    require_path(config, "output", "dir")?;
    let num_pixels = validate_pixels(config)?;
    validate_forced(config, num_pixels)?;
    validate_threads(config)?;
    Ok(())
}

pub fn validate_simulate_config(config: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    require_path(config, "data", "prices")?;
    require_path(config, "data", "valuation_prices")?;
    require_path(config, "data", "frames")?;
    require_path(config, "output", "dir")?;
    validate_pixels(config)?;
    validate_capital(config)?;
    validate_threads(config)?;
    Ok(())
}

/// Parse a forced list of the form `AAPL:0, NVDA:1`. Blank input is an empty
/// list.
pub fn parse_forced(value: &str) -> Result<Vec<(String, usize)>, PixelTraderError> {
    let invalid = |reason: String| PixelTraderError::ConfigInvalid {
        section: "assignment".to_string(),
        key: "forced".to_string(),
        reason,
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, pixel) = entry
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected SYMBOL:PIXEL, got '{entry}'")))?;
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(invalid(format!("empty symbol in '{entry}'")));
            }
            let pixel = pixel
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid(format!("invalid pixel index in '{entry}'")))?;
            Ok((symbol.to_string(), pixel))
        })
        .collect()
}

fn require_path(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), PixelTraderError> {
    match config.get_path(section, key) {
        Some(_) => Ok(()),
        None => Err(PixelTraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_pixels(config: &dyn ConfigPort) -> Result<usize, PixelTraderError> {
    let width = config.get_int("pixels", "width", DEFAULT_WIDTH);
    let height = config.get_int("pixels", "height", DEFAULT_HEIGHT);
    for (key, value) in [("width", width), ("height", height)] {
        if value < 1 {
            return Err(PixelTraderError::ConfigInvalid {
                section: "pixels".to_string(),
                key: key.to_string(),
                reason: format!("{key} must be at least 1"),
            });
        }
    }
    Ok((width * height) as usize)
}

fn validate_forced(config: &dyn ConfigPort, num_pixels: usize) -> Result<(), PixelTraderError> {
    let Some(raw) = config.get_string("assignment", "forced") else {
        return Ok(());
    };
    let forced = parse_forced(&raw)?;
    let mut symbols = HashSet::new();
    let mut pixels = HashSet::new();
    for (symbol, pixel) in &forced {
        if *pixel >= num_pixels {
            return Err(PixelTraderError::ForcedPixelOutOfRange {
                symbol: symbol.clone(),
                pixel: *pixel,
                num_pixels,
            });
        }
        if !symbols.insert(symbol.as_str()) {
            return Err(PixelTraderError::DuplicateForced {
                reason: format!("{symbol} listed more than once"),
            });
        }
        if !pixels.insert(*pixel) {
            return Err(PixelTraderError::DuplicateForced {
                reason: format!("pixel {pixel} listed more than once"),
            });
        }
    }
    Ok(())
}

fn validate_capital(config: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    let value = config.get_double(
        "simulation",
        "deployed_capital",
        crate::domain::simulation::DEFAULT_DEPLOYED_CAPITAL,
    );
    if !value.is_finite() || value <= 0.0 {
        return Err(PixelTraderError::ConfigInvalid {
            section: "simulation".to_string(),
            key: "deployed_capital".to_string(),
            reason: "deployed_capital must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_threads(config: &dyn ConfigPort) -> Result<(), PixelTraderError> {
    if config.get_int("runtime", "threads", 0) < 0 {
        return Err(PixelTraderError::ConfigInvalid {
            section: "runtime".to_string(),
            key: "threads".to_string(),
            reason: "threads must be non-negative".to_string(),
        });
    }
    Ok(())
}
