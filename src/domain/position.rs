//! Held positions and risk-exit triggers.

use chrono::NaiveDate;

/// A signed holding in one asset. Negative quantity is a short.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub asset: String,
    pub quantity: f64,
    /// Weighted-average entry price of the current holding.
    pub cost_basis: f64,
    pub opened: NaiveDate,
}

/// What fired a forced liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
}

impl ExitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitTrigger::StopLoss => "stop_loss",
            ExitTrigger::TakeProfit => "take_profit",
        }
    }
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Signed value: shorts are a liability.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.cost_basis)
    }

    /// Return on the cost basis from the holder's side (a falling price is a gain for a short).
    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.cost_basis <= 0.0 {
            return 0.0;
        }
        let raw = (price - self.cost_basis) / self.cost_basis;
        if self.is_short() { -raw } else { raw }
    }

    /// Stop-loss fires when the loss strictly exceeds `stop_loss_pct`;
    /// take-profit when the gain strictly exceeds `take_profit_pct`.
    pub fn exit_trigger(
        &self,
        price: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Option<ExitTrigger> {
        let r = self.unrealized_return(price);
        if -r > stop_loss_pct {
            Some(ExitTrigger::StopLoss)
        } else if r > take_profit_pct {
            Some(ExitTrigger::TakeProfit)
        } else {
            None
        }
    }

    /// Apply a fill of `delta` units at `price` and return the realized P&L
    /// (before costs) of any part that reduced the holding.
    ///
    /// Adding in the same direction moves the cost basis to the weighted
    /// average; reducing keeps it; flipping through zero restarts it at `price`.
    pub fn apply_fill(&mut self, delta: f64, price: f64, date: NaiveDate) -> f64 {
        let old = self.quantity;
        let new = old + delta;

        if old == 0.0 || old.signum() == delta.signum() {
            let total = old.abs() + delta.abs();
            if total > 0.0 {
                self.cost_basis = (old.abs() * self.cost_basis + delta.abs() * price) / total;
            }
            if old == 0.0 {
                self.opened = date;
            }
            self.quantity = new;
            return 0.0;
        }

        let closed = delta.abs().min(old.abs());
        let realized = closed * (price - self.cost_basis) * old.signum();
        if new != 0.0 && new.signum() != old.signum() {
            self.cost_basis = price;
            self.opened = date;
        }
        self.quantity = new;
        realized
    }
}
