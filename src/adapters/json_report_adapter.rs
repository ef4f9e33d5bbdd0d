//! JSON report adapter implementing ReportPort.
//!
//! Writes metrics, the trade history, the equity curve and gate rejections as
//! one pretty-printed JSON document. Non-finite ratios serialize as `null`.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::domain::error::FxRiskError;
use crate::domain::ledger::EquityPoint;
use crate::domain::metrics::Metrics;
use crate::domain::position::TradeRecord;
use crate::domain::simulation::{BacktestResult, Rejection};
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct Report<'a> {
    initial_balance: f64,
    final_balance: f64,
    steps: usize,
    metrics: &'a Metrics,
    trades: Vec<TradeRecord>,
    equity_curve: &'a [EquityPoint],
    rejections: &'a [Rejection],
}

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    pub fn render(result: &BacktestResult, metrics: &Metrics) -> Result<String, FxRiskError> {
        let report = Report {
            initial_balance: result.ledger.account().initial_balance,
            final_balance: result.ledger.balance(),
            steps: result.steps,
            metrics,
            trades: result.ledger.closed_trades(),
            equity_curve: result.ledger.equity_curve(),
            rejections: &result.rejections,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_path: &Path,
    ) -> Result<(), FxRiskError> {
        let json = Self::render(result, metrics)?;
        fs::write(output_path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::config::SimulationConfig;
    use crate::domain::signal::{Action, Signal};
    use crate::domain::simulation::run_backtest;
    use crate::domain::symbol_data::SymbolData;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn t(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn bar(hour: i64, low: f64, high: f64, close: f64) -> Bar {
        Bar {
            timestamp: t(hour),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
            atr: None,
        }
    }

    fn sample_result() -> BacktestResult {
        let data = SymbolData::new(
            "EURUSD",
            vec![
                bar(0, 1.0995, 1.1005, 1.1000),
                bar(1, 1.0990, 1.1120, 1.1100),
            ],
        )
        .with_signals([(
            t(0),
            Signal {
                action: Action::Buy,
                price: 1.1000,
                stop_loss: 1.0950,
                take_profit: 1.1100,
                confidence: 90.0,
            },
        )]);
        run_backtest(&[data], &SimulationConfig::default()).unwrap()
    }

    #[test]
    fn report_contains_all_sections() {
        let result = sample_result();
        let metrics = result.metrics(252.0);
        let json = JsonReportAdapter::render(&result, &metrics).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["trades"].as_array().unwrap().len(), 1);
        assert_eq!(value["trades"][0]["symbol"], "EURUSD");
        assert_eq!(value["equity_curve"].as_array().unwrap().len(), 2);
        assert!(value["rejections"].as_array().unwrap().is_empty());
        assert_eq!(value["metrics"]["total_trades"], 1);
        assert_eq!(value["steps"], 2);
    }

    #[test]
    fn infinite_profit_factor_is_null() {
        let result = sample_result();
        let metrics = result.metrics(252.0);
        assert!(metrics.profit_factor.is_infinite());
        let json = JsonReportAdapter::render(&result, &metrics).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["metrics"]["profit_factor"].is_null());
    }

    #[test]
    fn write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let result = sample_result();
        let metrics = result.metrics(252.0);

        JsonReportAdapter::new()
            .write(&result, &metrics, &path)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"final_balance\""));
    }

    #[test]
    fn write_to_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let result = sample_result();
        let metrics = result.metrics(252.0);
        let err = JsonReportAdapter::new()
            .write(&result, &metrics, &path)
            .unwrap_err();
        assert!(matches!(err, FxRiskError::Io(_)));
    }
}
