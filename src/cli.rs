//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::{CsvBarSource, CsvSignalSource};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::config::SimulationConfig;
use crate::domain::config_validation::{build_simulation_config, build_symbol_table};
use crate::domain::error::FxRiskError;
use crate::domain::metrics::Metrics;
use crate::domain::simulation::{BacktestResult, run_backtest};
use crate::domain::symbol::{CurrencyPair, SymbolTable, normalize};
use crate::domain::symbol_data::SymbolData;
use crate::ports::data_port::{DataPort, SignalPort};
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "fxrisk", about = "Risk-gated forex position and portfolio simulator")]
pub struct Cli {
    /// Log filter, e.g. `info` or `fxrisk=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over CSV bars and signals
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding `<SYMBOL>.csv` and `<SYMBOL>_signals.csv`
        #[arg(short, long)]
        data: PathBuf,
        /// Comma-separated symbols; defaults to every bar file in the data directory
        #[arg(short, long)]
        symbols: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show pip metadata for a symbol
    PipInfo {
        symbol: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            symbols,
            output,
        } => run_backtest_command(&config, &data, symbols.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::PipInfo { symbol, config } => run_pip_info(&symbol, config.as_deref()),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FxRiskError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: FxRiskError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

fn run_backtest_command(
    config_path: &Path,
    data_dir: &Path,
    symbols_arg: Option<&str>,
    output_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_simulation_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let bars = CsvBarSource::new(data_dir);
    let signals = CsvSignalSource::new(data_dir);
    let symbols = match resolve_symbols(symbols_arg, &bars) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let output = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("report.json"));

    match run_backtest_pipeline(&bars, &signals, &JsonReportAdapter::new(), &config, &symbols, &output) {
        Ok(_) => {
            eprintln!("\nReport written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Symbols from a comma-separated argument, or every bar file the source knows.
pub fn resolve_symbols(
    symbols_arg: Option<&str>,
    source: &dyn DataPort,
) -> Result<Vec<String>, FxRiskError> {
    let mut symbols: Vec<String> = match symbols_arg {
        Some(list) => list
            .split(',')
            .map(normalize)
            .filter(|s| !s.is_empty())
            .collect(),
        None => source.list_symbols()?,
    };
    let mut seen = HashSet::new();
    symbols.retain(|s| seen.insert(s.clone()));
    if symbols.is_empty() {
        return Err(FxRiskError::Data {
            reason: "no symbols to backtest".to_string(),
        });
    }
    Ok(symbols)
}

/// Load each symbol's bars and signals. Symbols that fail to load are skipped.
pub fn load_symbol_data(
    bars: &dyn DataPort,
    signals: &dyn SignalPort,
    symbols: &[String],
    config: &SimulationConfig,
) -> Vec<SymbolData> {
    let mut data = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if !config.symbols.contains(symbol) {
            warn!(symbol = %symbol, "no pip metadata, entries will be skipped");
        }
        let series = match bars.fetch_bars(symbol, config.start, config.end) {
            Ok(series) if series.is_empty() => {
                eprintln!("warning: skipping {symbol} (no bars in range)");
                continue;
            }
            Ok(series) => series,
            Err(e) => {
                eprintln!("warning: skipping {symbol} ({e})");
                continue;
            }
        };
        let symbol_signals = match signals.fetch_signals(symbol) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("warning: skipping {symbol} ({e})");
                continue;
            }
        };
        info!(symbol = %symbol, bars = series.len(), signals = symbol_signals.len(), "symbol loaded");
        data.push(SymbolData::new(symbol, series).with_signals(symbol_signals));
    }
    data
}

pub fn run_backtest_pipeline(
    bars: &dyn DataPort,
    signals: &dyn SignalPort,
    report: &dyn ReportPort,
    config: &SimulationConfig,
    symbols: &[String],
    output_path: &Path,
) -> Result<Metrics, FxRiskError> {
    let data = load_symbol_data(bars, signals, symbols, config);
    if data.is_empty() {
        return Err(FxRiskError::Data {
            reason: "no symbols with data to backtest".to_string(),
        });
    }

    let bar_total: usize = data.iter().map(SymbolData::bar_count).sum();
    eprintln!(
        "Running backtest: {} symbols, {} bars, initial balance {:.2}",
        data.len(),
        bar_total,
        config.initial_balance
    );

    let result = run_backtest(&data, config)?;
    let metrics = result.metrics(config.periods_per_year);
    print_summary(&result, &metrics);

    report.write(&result, &metrics, output_path)?;
    Ok(metrics)
}

fn print_summary(result: &BacktestResult, metrics: &Metrics) {
    eprintln!("\n=== Results ===");
    eprintln!("Final Balance:    {:.2}", result.ledger.balance());
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
    eprintln!("Max Drawdown:     {:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!(
        "Streaks:          {} wins / {} losses",
        metrics.max_consecutive_wins, metrics.max_consecutive_losses
    );
    eprintln!("Rejections:       {}", result.rejections.len());

    if !metrics.monthly_pnl.is_empty() {
        eprintln!("\n=== Monthly P&L ===");
        for (month, pnl) in &metrics.monthly_pnl {
            let sign = if *pnl >= 0.0 { "+" } else { "" };
            eprintln!("  {month}:  {sign}{pnl:.2}");
        }
    }
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_simulation_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let l = &config.limits;
    eprintln!("\nAccount:");
    eprintln!("  initial_balance:  {:.2}", config.initial_balance);
    eprintln!("\nRisk limits:");
    eprintln!("  per trade:        {:.2}%", l.max_risk_per_trade * 100.0);
    eprintln!(
        "  daily/weekly/monthly: {:.2}% / {:.2}% / {:.2}%",
        l.max_daily_risk * 100.0,
        l.max_weekly_risk * 100.0,
        l.max_monthly_risk * 100.0
    );
    eprintln!("  max drawdown:     {:.2}%", l.max_drawdown * 100.0);
    eprintln!("  max positions:    {}", l.max_positions);
    eprintln!("  currency exposure: {:.2}%", l.max_exposure_per_currency * 100.0);
    eprintln!("\nSizing:");
    eprintln!("  lots:             {} .. {}", config.sizing.min_lot, config.sizing.max_lot);
    eprintln!("\nSimulation:");
    eprintln!("  confidence:       {}", config.confidence_threshold);
    eprintln!("  open positions:   {}", config.max_open_positions);
    eprintln!("  trigger mode:     {:?}", config.trigger_mode);
    eprintln!("  symbols:          {}", config.symbols.symbols().collect::<Vec<_>>().join(", "));

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

/// Pip metadata line for a symbol: pip size, pip cost and legs.
pub fn describe_symbol(symbol: &str, table: &SymbolTable) -> Result<String, FxRiskError> {
    let pair = CurrencyPair::parse(symbol).ok_or_else(|| FxRiskError::UnknownSymbol {
        symbol: symbol.to_string(),
    })?;
    let spec = table.lookup(&pair.symbol())?;
    Ok(format!(
        "{}: base {}, quote {}, pip size {}, pip cost {:.2} per lot",
        pair.symbol(),
        pair.base,
        pair.quote,
        spec.pip_size,
        spec.pip_cost
    ))
}

fn run_pip_info(symbol: &str, config_path: Option<&Path>) -> ExitCode {
    let table = match config_path {
        Some(path) => {
            let adapter = match load_config(path) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match build_symbol_table(&adapter) {
                Ok(t) => t,
                Err(e) => return fail(e),
            }
        }
        None => SymbolTable::default(),
    };

    match describe_symbol(symbol, &table) {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
