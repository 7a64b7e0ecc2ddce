//! Output port trait.

use crate::domain::assignment::Assignment;
use crate::domain::error::PixelTraderError;
use crate::domain::simulation::SimulationResult;

/// Port for persisting the assignment and simulation outputs.
pub trait ReportPort {
    fn write_assignment(
        &self,
        symbols: &[String],
        assignment: &Assignment,
    ) -> Result<(), PixelTraderError>;

    fn write_simulation(&self, result: &SimulationResult) -> Result<(), PixelTraderError>;
}
