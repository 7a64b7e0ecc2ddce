//! CSV output adapter implementing ReportPort.
//!
//! Writes `assignment.csv`, `nav.csv`, `rebalances.csv` and the wide
//! `shares.csv` / `values.csv` (one column per symbol) into an output
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::assignment::Assignment;
use crate::domain::error::PixelTraderError;
use crate::domain::matrix::Matrix;
use crate::domain::panel::Timestamp;
use crate::domain::simulation::SimulationResult;
use crate::ports::report_port::ReportPort;

pub const ASSIGNMENT_FILE: &str = "assignment.csv";
pub const NAV_FILE: &str = "nav.csv";
pub const REBALANCES_FILE: &str = "rebalances.csv";
pub const SHARES_FILE: &str = "shares.csv";
pub const VALUES_FILE: &str = "values.csv";

#[derive(Serialize)]
struct AssignmentRow<'a> {
    symbol: &'a str,
    pixel_index: usize,
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
    assignment_path: Option<PathBuf>,
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            assignment_path: None,
        }
    }

    /// Write the assignment somewhere other than the output directory.
    pub fn with_assignment_path(mut self, path: PathBuf) -> Self {
        self.assignment_path = Some(path);
        self
    }

    pub fn assignment_path(&self) -> PathBuf {
        self.assignment_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(ASSIGNMENT_FILE))
    }

    fn ensure_dir(path: &Path) -> Result<(), PixelTraderError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PixelTraderError> {
        Self::ensure_dir(path)?;
        let mut wtr = csv::Writer::from_path(path)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_wide(
        path: &Path,
        symbols: &[String],
        periods: &[Timestamp],
        values: &Matrix,
    ) -> Result<(), PixelTraderError> {
        Self::ensure_dir(path)?;
        let mut wtr = csv::Writer::from_path(path)?;
        let mut header = vec!["period".to_string()];
        header.extend(symbols.iter().cloned());
        wtr.write_record(&header)?;
        for (period, row) in periods.iter().zip(values.iter_rows()) {
            let mut record = vec![period.to_rfc3339()];
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_assignment(
        &self,
        symbols: &[String],
        assignment: &Assignment,
    ) -> Result<(), PixelTraderError> {
        let rows: Vec<AssignmentRow> = assignment
            .rows(symbols)
            .map(|(symbol, pixel_index)| AssignmentRow {
                symbol,
                pixel_index,
            })
            .collect();
        let path = self.assignment_path();
        Self::write_rows(&path, &rows)?;
        tracing::info!(path = %path.display(), rows = rows.len(), "wrote assignment");
        Ok(())
    }

    fn write_simulation(&self, result: &SimulationResult) -> Result<(), PixelTraderError> {
        let dir = &self.output_dir;
        Self::write_rows(&dir.join(NAV_FILE), &result.nav_history)?;
        Self::write_rows(&dir.join(REBALANCES_FILE), &result.rebalance_history)?;
        let periods: Vec<Timestamp> = result.periods().collect();
        Self::write_wide(
            &dir.join(SHARES_FILE),
            &result.symbols,
            &periods,
            &result.shares_history,
        )?;
        Self::write_wide(
            &dir.join(VALUES_FILE),
            &result.symbols,
            &periods,
            &result.values_history,
        )?;
        tracing::info!(dir = %dir.display(), minutes = periods.len(), "wrote simulation results");
        Ok(())
    }
}
