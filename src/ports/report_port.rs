//! Report generation port.

use std::path::Path;

use crate::domain::error::FxRiskError;
use crate::domain::metrics::Metrics;
use crate::domain::simulation::BacktestResult;

pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_path: &Path,
    ) -> Result<(), FxRiskError>;
}
