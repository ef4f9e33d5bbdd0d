//! Performance statistics over closed trades and the equity curve.
//!
//! Everything here is a pure function of its inputs. Empty inputs produce
//! all-zero metrics rather than errors.

use chrono::Datelike;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use super::ledger::EquityPoint;
use super::position::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Positive magnitude.
    pub gross_loss: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Worst peak-to-trough move of the equity curve, as a value <= 0.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub avg_trade_duration_hours: f64,
    pub avg_winning_duration_hours: f64,
    pub avg_losing_duration_hours: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Realised P&L keyed by exit month (`YYYY-MM`).
    pub monthly_pnl: BTreeMap<String, f64>,
    pub winning_months: usize,
    pub total_months: usize,
    pub monthly_win_rate: f64,
    /// Initial balance plus realised P&L. Zero when no trade has closed.
    pub final_balance: f64,
    /// Highest balance reached across closed trades. Zero when no trade has closed.
    pub peak_balance: f64,
}

impl Metrics {
    /// `trades` should be in close order; open records are ignored.
    pub fn compute(
        trades: &[TradeRecord],
        equity_curve: &[EquityPoint],
        initial_balance: f64,
        periods_per_year: f64,
    ) -> Self {
        let closed: Vec<(&TradeRecord, f64)> = trades
            .iter()
            .filter_map(|t| t.pnl.map(|pnl| (t, pnl)))
            .collect();

        let trade_stats = TradeStats::from_trades(&closed);
        let (max_consecutive_wins, max_consecutive_losses) = streaks(&closed);
        let monthly_pnl = monthly_pnl(&closed);
        let winning_months = monthly_pnl.values().filter(|pnl| **pnl > 0.0).count();
        let total_months = monthly_pnl.len();

        let realized_balance = initial_balance + trade_stats.total_pnl;
        let realized_peak = closed
            .iter()
            .scan(initial_balance, |balance, (_, pnl)| {
                *balance += pnl;
                Some(*balance)
            })
            .fold(initial_balance, f64::max);

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(realized_balance);
        let total_return = if initial_balance > 0.0 {
            (final_equity - initial_balance) / initial_balance
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / periods_per_year;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (final_balance, peak_balance) = if closed.is_empty() {
            (0.0, 0.0)
        } else {
            (realized_balance, realized_peak)
        };

        let max_drawdown = max_drawdown(equity_curve);
        let returns = step_returns(equity_curve);
        let sharpe_ratio = sharpe(&returns, periods_per_year);
        let sortino_ratio = sortino(&returns, periods_per_year);
        let calmar_ratio = if max_drawdown < 0.0 {
            total_return / max_drawdown.abs()
        } else {
            0.0
        };

        Metrics {
            total_trades: closed.len(),
            winning_trades: trade_stats.wins,
            losing_trades: trade_stats.losses,
            breakeven_trades: trade_stats.breakeven,
            win_rate: ratio(trade_stats.wins as f64, closed.len() as f64),
            gross_profit: trade_stats.gross_profit,
            gross_loss: trade_stats.gross_loss,
            total_pnl: trade_stats.total_pnl,
            profit_factor: trade_stats.profit_factor(),
            avg_win: ratio(trade_stats.gross_profit, trade_stats.wins as f64),
            avg_loss: ratio(trade_stats.gross_loss, trade_stats.losses as f64),
            largest_win: trade_stats.largest_win,
            largest_loss: trade_stats.largest_loss,
            max_drawdown,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            total_return,
            annualized_return,
            avg_trade_duration_hours: mean_or_zero(&trade_stats.durations),
            avg_winning_duration_hours: mean_or_zero(&trade_stats.win_durations),
            avg_losing_duration_hours: mean_or_zero(&trade_stats.loss_durations),
            max_consecutive_wins,
            max_consecutive_losses,
            monthly_pnl,
            winning_months,
            total_months,
            monthly_win_rate: ratio(winning_months as f64, total_months as f64),
            final_balance,
            peak_balance,
        }
    }

    /// Flat name to value map of every scalar metric.
    pub fn summary(&self) -> BTreeMap<String, f64> {
        let entries: [(&str, f64); 29] = [
            ("total_trades", self.total_trades as f64),
            ("winning_trades", self.winning_trades as f64),
            ("losing_trades", self.losing_trades as f64),
            ("breakeven_trades", self.breakeven_trades as f64),
            ("win_rate", self.win_rate),
            ("gross_profit", self.gross_profit),
            ("gross_loss", self.gross_loss),
            ("total_pnl", self.total_pnl),
            ("profit_factor", self.profit_factor),
            ("avg_win", self.avg_win),
            ("avg_loss", self.avg_loss),
            ("largest_win", self.largest_win),
            ("largest_loss", self.largest_loss),
            ("max_drawdown", self.max_drawdown),
            ("sharpe_ratio", self.sharpe_ratio),
            ("sortino_ratio", self.sortino_ratio),
            ("calmar_ratio", self.calmar_ratio),
            ("total_return", self.total_return),
            ("annualized_return", self.annualized_return),
            ("avg_trade_duration_hours", self.avg_trade_duration_hours),
            ("avg_winning_duration_hours", self.avg_winning_duration_hours),
            ("avg_losing_duration_hours", self.avg_losing_duration_hours),
            ("max_consecutive_wins", self.max_consecutive_wins as f64),
            ("max_consecutive_losses", self.max_consecutive_losses as f64),
            ("winning_months", self.winning_months as f64),
            ("total_months", self.total_months as f64),
            ("monthly_win_rate", self.monthly_win_rate),
            ("final_balance", self.final_balance),
            ("peak_balance", self.peak_balance),
        ];
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

#[derive(Default)]
struct TradeStats {
    wins: usize,
    losses: usize,
    breakeven: usize,
    gross_profit: f64,
    gross_loss: f64,
    total_pnl: f64,
    largest_win: f64,
    largest_loss: f64,
    durations: Vec<f64>,
    win_durations: Vec<f64>,
    loss_durations: Vec<f64>,
}

impl TradeStats {
    fn from_trades(closed: &[(&TradeRecord, f64)]) -> Self {
        let mut stats = TradeStats::default();
        for (trade, pnl) in closed {
            let pnl = *pnl;
            let duration = trade.duration_hours();
            stats.total_pnl += pnl;
            if let Some(hours) = duration {
                stats.durations.push(hours);
            }

            if pnl > 0.0 {
                stats.wins += 1;
                stats.gross_profit += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
                stats.win_durations.extend(duration);
            } else if pnl < 0.0 {
                stats.losses += 1;
                stats.gross_loss += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
                stats.loss_durations.extend(duration);
            } else {
                stats.breakeven += 1;
            }
        }
        stats
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().mean()
    }
}

/// Longest runs of winning and losing trades. A breakeven trade ends both.
fn streaks(closed: &[(&TradeRecord, f64)]) -> (usize, usize) {
    let mut wins = 0usize;
    let mut losses = 0usize;
    let mut max_wins = 0usize;
    let mut max_losses = 0usize;

    for (_, pnl) in closed {
        if *pnl > 0.0 {
            wins += 1;
            losses = 0;
        } else if *pnl < 0.0 {
            losses += 1;
            wins = 0;
        } else {
            wins = 0;
            losses = 0;
        }
        max_wins = max_wins.max(wins);
        max_losses = max_losses.max(losses);
    }

    (max_wins, max_losses)
}

fn monthly_pnl(closed: &[(&TradeRecord, f64)]) -> BTreeMap<String, f64> {
    let mut months = BTreeMap::new();
    for (trade, pnl) in closed {
        let Some(exit) = trade.exit_time else {
            continue;
        };
        let key = format!("{:04}-{:02}", exit.year(), exit.month());
        *months.entry(key).or_insert(0.0) += pnl;
    }
    months
}

fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut worst = 0.0_f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.min((point.equity - peak) / peak);
        }
    }
    worst
}

fn step_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn sharpe(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.iter().copied().std_dev();
    if std_dev > 0.0 && std_dev.is_finite() {
        returns.iter().copied().mean() / std_dev * periods_per_year.sqrt()
    } else {
        0.0
    }
}

fn sortino(returns: &[f64], periods_per_year: f64) -> f64 {
    let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negative.len() < 2 {
        return 0.0;
    }
    let downside = negative.iter().copied().std_dev();
    if downside > 0.0 && downside.is_finite() {
        returns.iter().copied().mean() / downside * periods_per_year.sqrt()
    } else {
        0.0
    }
}
