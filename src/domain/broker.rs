//! Stateful broker: cash, positions, and the trade ledger.
//!
//! Every portfolio mutation goes through [`Broker`]. Risk exits
//! ([`Broker::apply_risk_management`]) liquidate whole positions; rebalancing
//! ([`Broker::execute_portfolio`]) trades each asset toward its target dollar
//! allocation, sells before buys, charging a proportional transaction cost on
//! every fill. Targets are sized on the portfolio value left after the
//! rebalance's own costs. Quantities are fractional.
//!
//! Shorts are margin-funded: covering one debits cash with no funding check,
//! so cash can go negative while shorting is enabled.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::error::EngineError;
use super::portfolio::Portfolio;
use super::position::{ExitTrigger, Position};
use super::price_series::PriceRow;

/// Trades smaller than this notional are not worth a ledger entry.
const MIN_TRADE_VALUE: f64 = 1e-8;
/// Holdings smaller than this are treated as closed.
const QUANTITY_EPSILON: f64 = 1e-12;
/// Cash shortfall tolerated as floating-point noise.
const CASH_EPSILON: f64 = 1e-9;
/// Shortfall tolerated per unit of portfolio value.
const CASH_RELATIVE_EPSILON: f64 = 1e-12;
const NET_VALUE_MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
    Exit(ExitTrigger),
}

impl Side {
    pub fn is_exit(&self) -> bool {
        matches!(self, Side::Exit(_))
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
            Side::Exit(trigger) => write!(f, "exit:{}", trigger.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub asset: String,
    pub side: Side,
    /// Units traded, always positive; direction is in `side`.
    pub quantity: f64,
    pub price: f64,
    pub cost: f64,
}

/// What to do when a buy needs more cash than is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FundingPolicy {
    /// Trim the buy to what cash allows.
    #[default]
    PartialFill,
    /// Abandon the whole rebalance with [`EngineError::InsufficientFunds`].
    Reject,
}

impl FromStr for FundingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partial_fill" | "partial" => Ok(FundingPolicy::PartialFill),
            "reject" => Ok(FundingPolicy::Reject),
            other => Err(format!("unknown funding policy '{other}'")),
        }
    }
}

/// Which records [`Broker::get_transaction_log`] hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Records added since the previous call.
    #[default]
    Incremental,
    /// The whole ledger every time.
    Cumulative,
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(LogMode::Incremental),
            "cumulative" | "all" => Ok(LogMode::Cumulative),
            other => Err(format!("unknown log mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Fraction of traded notional charged per fill.
    pub transaction_cost: f64,
    pub allow_shorting: bool,
    pub funding: FundingPolicy,
    pub log_mode: LogMode,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            transaction_cost: 0.0,
            allow_shorting: false,
            funding: FundingPolicy::PartialFill,
            log_mode: LogMode::Incremental,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerState {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    pub transaction_log: Vec<TransactionRecord>,
}

/// Outcome of one successful rebalance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionReport {
    pub trades: usize,
    pub costs: f64,
    /// Assets whose buy was trimmed to available cash.
    pub partial_fills: Vec<String>,
}

/// Fills applied to a scratch state, committed only when the whole rebalance succeeds.
struct Fill {
    realized: f64,
    cost: f64,
}

pub struct Broker {
    state: BrokerState,
    config: BrokerConfig,
    log_cursor: usize,
    realized_pnl: f64,
    costs_paid: f64,
    exited: BTreeSet<String>,
    last_prices: BTreeMap<String, f64>,
}

impl Broker {
    pub fn new(initial_cash: f64, config: BrokerConfig) -> Self {
        Self {
            state: BrokerState {
                cash: initial_cash,
                positions: BTreeMap::new(),
                transaction_log: Vec::new(),
            },
            config,
            log_cursor: 0,
            realized_pnl: 0.0,
            costs_paid: 0.0,
            exited: BTreeSet::new(),
            last_prices: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    pub fn cash(&self) -> f64 {
        self.state.cash
    }

    pub fn position(&self, asset: &str) -> Option<&Position> {
        self.state.positions.get(asset)
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.state.positions
    }

    /// Price P&L realized by reductions and exits, before transaction costs.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn costs_paid(&self) -> f64 {
        self.costs_paid
    }

    /// Assets force-liquidated by a risk exit at any point in the run.
    pub fn exited_assets(&self) -> &BTreeSet<String> {
        &self.exited
    }

    /// Liquidate every position whose loss exceeds `stop_loss_pct` or whose
    /// gain exceeds `take_profit_pct` against its cost basis.
    ///
    /// Returns the liquidated assets with their trigger. Positions without a
    /// price in `prices` are left alone.
    pub fn apply_risk_management(
        &mut self,
        prices: &PriceRow,
        stop_loss_pct: f64,
        take_profit_pct: f64,
        date: NaiveDate,
    ) -> Vec<(String, ExitTrigger)> {
        self.remember_prices(prices);

        let triggered: Vec<(String, f64, ExitTrigger)> = self
            .state
            .positions
            .values()
            .filter_map(|pos| {
                let price = prices.get(&pos.asset)?;
                pos.exit_trigger(price, stop_loss_pct, take_profit_pct)
                    .map(|t| (pos.asset.clone(), price, t))
            })
            .collect();

        let mut exits = Vec::with_capacity(triggered.len());
        for (asset, price, trigger) in triggered {
            let Some(pos) = self.state.positions.remove(&asset) else {
                continue;
            };
            let cost = pos.quantity.abs() * price * self.config.transaction_cost;
            self.state.cash += pos.quantity * price - cost;
            self.realized_pnl += pos.unrealized_pnl(price);
            self.costs_paid += cost;
            self.state.transaction_log.push(TransactionRecord {
                date,
                asset: asset.clone(),
                side: Side::Exit(trigger),
                quantity: pos.quantity.abs(),
                price,
                cost,
            });
            info!(
                %date,
                asset = %asset,
                trigger = trigger.as_str(),
                return_pct = pos.unrealized_return(price) * 100.0,
                "risk exit"
            );
            self.exited.insert(asset.clone());
            exits.push((asset, trigger));
        }
        exits
    }

    /// Trade every asset toward `target_weights × net value`, where the net
    /// value is the total value less the costs of this rebalance.
    ///
    /// Assets held but absent from the target are closed. The rebalance is
    /// atomic: on error no fill is applied.
    pub fn execute_portfolio(
        &mut self,
        target_weights: &Portfolio,
        prices: &PriceRow,
        date: NaiveDate,
    ) -> Result<ExecutionReport, EngineError> {
        if !self.config.allow_shorting && target_weights.has_short() {
            return Err(EngineError::InvalidPortfolio {
                reason: "negative target weight while shorting is disabled".into(),
            });
        }

        let assets: BTreeSet<&String> = target_weights
            .assets()
            .chain(self.state.positions.keys())
            .collect();

        let mut plan: Vec<(String, f64, f64)> = Vec::with_capacity(assets.len());
        for asset in assets {
            let weight = target_weights.weight(asset);
            let held = self.state.positions.get(asset).map_or(0.0, |p| p.quantity);
            if weight == 0.0 && held == 0.0 {
                continue;
            }
            let price = prices
                .get(asset)
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| EngineError::InvalidPortfolio {
                    reason: format!("no valid price for {asset} on {date}"),
                })?;
            plan.push((asset.clone(), held, price));
        }

        self.remember_prices(prices);
        let total = self.get_portfolio_value(prices);
        let base = self.net_of_costs(target_weights, &plan, total);
        let tolerance = CASH_EPSILON.max(total.abs() * CASH_RELATIVE_EPSILON);

        let mut orders: Vec<(String, f64, f64)> = plan
            .into_iter()
            .filter_map(|(asset, held, price)| {
                let delta_value = target_weights.weight(&asset) * base - held * price;
                (delta_value.abs() >= MIN_TRADE_VALUE).then(|| (asset, delta_value / price, price))
            })
            .collect();
        // Sells free cash for the buys.
        orders.sort_by(|a, b| {
            (a.1 > 0.0)
                .cmp(&(b.1 > 0.0))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut next = self.state.clone();
        let mut report = ExecutionReport::default();
        let mut realized = 0.0;

        for (asset, mut delta, price) in orders {
            if delta > 0.0 {
                let required = delta * price * (1.0 + self.config.transaction_cost);
                if required > next.cash + tolerance {
                    match self.config.funding {
                        FundingPolicy::Reject => {
                            return Err(EngineError::InsufficientFunds {
                                asset,
                                required,
                                available: next.cash,
                            });
                        }
                        FundingPolicy::PartialFill => {
                            delta = next.cash.max(0.0)
                                / (price * (1.0 + self.config.transaction_cost));
                            report.partial_fills.push(asset.clone());
                            if delta * price < MIN_TRADE_VALUE {
                                continue;
                            }
                        }
                    }
                }
            }

            let fill = self.fill(&mut next, &asset, delta, price, date);
            realized += fill.realized;
            report.costs += fill.cost;
            report.trades += 1;
        }

        self.state = next;
        self.realized_pnl += realized;
        self.costs_paid += report.costs;
        Ok(report)
    }

    /// Solves `v = total - c·Σ|w_i·v - h_i·p_i|` for the value left to allocate
    /// once the rebalance has paid its costs.
    fn net_of_costs(&self, target: &Portfolio, plan: &[(String, f64, f64)], total: f64) -> f64 {
        let c = self.config.transaction_cost;
        if c <= 0.0 {
            return total;
        }
        let mut value = total;
        for _ in 0..NET_VALUE_MAX_ITERATIONS {
            let turnover: f64 = plan
                .iter()
                .map(|(asset, held, price)| (target.weight(asset) * value - held * price).abs())
                .sum();
            let next = total - c * turnover;
            let converged = (next - value).abs() <= f64::EPSILON * total.abs();
            value = next;
            if converged {
                break;
            }
        }
        value
    }

    /// Cash plus the signed market value of every position.
    ///
    /// A position missing from `prices` is marked at the last price the broker
    /// saw for it, or its cost basis if it has never been priced.
    pub fn get_portfolio_value(&self, prices: &PriceRow) -> f64 {
        let holdings: f64 = self
            .state
            .positions
            .values()
            .map(|pos| {
                let price = prices
                    .get(&pos.asset)
                    .or_else(|| self.last_prices.get(&pos.asset).copied())
                    .unwrap_or(pos.cost_basis);
                pos.market_value(price)
            })
            .sum();
        self.state.cash + holdings
    }

    /// Ledger records per the configured [`LogMode`].
    pub fn get_transaction_log(&mut self) -> Vec<TransactionRecord> {
        match self.config.log_mode {
            LogMode::Cumulative => self.state.transaction_log.clone(),
            LogMode::Incremental => {
                let fresh = self.state.transaction_log[self.log_cursor..].to_vec();
                self.log_cursor = self.state.transaction_log.len();
                fresh
            }
        }
    }

    fn fill(
        &self,
        state: &mut BrokerState,
        asset: &str,
        delta: f64,
        price: f64,
        date: NaiveDate,
    ) -> Fill {
        let cost = delta.abs() * price * self.config.transaction_cost;
        state.cash -= delta * price + cost;

        let position = state
            .positions
            .entry(asset.to_string())
            .or_insert_with(|| Position {
                asset: asset.to_string(),
                quantity: 0.0,
                cost_basis: price,
                opened: date,
            });
        let realized = position.apply_fill(delta, price, date);
        if position.quantity.abs() < QUANTITY_EPSILON {
            state.positions.remove(asset);
        }

        let side = if delta > 0.0 { Side::Buy } else { Side::Sell };
        debug!(%date, asset, %side, quantity = delta.abs(), price, cost, "fill");
        state.transaction_log.push(TransactionRecord {
            date,
            asset: asset.to_string(),
            side,
            quantity: delta.abs(),
            price,
            cost,
        });

        Fill { realized, cost }
    }

    fn remember_prices(&mut self, prices: &PriceRow) {
        for (asset, price) in &prices.prices {
            if let Some(p) = price.filter(|p| p.is_finite() && *p > 0.0) {
                self.last_prices.insert(asset.clone(), p);
            }
        }
    }
}
