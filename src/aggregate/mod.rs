//! Account-level aggregation of per-item P/L results
//!
//! Totals are plain sums. Combined percentage / ratio / difference are
//! recomputed from the summed magnitudes with [`RiskMetrics::compute`],
//! never averaged from per-item ratios.


use crate::pnl::{OrderPnl, PositionPnl, RiskMetrics};
use crate::utils::share_pct;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

/// Totals over open positions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionTotals {
    pub count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_current_pl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_volume: Decimal,
    #[serde(flatten)]
    pub metrics: RiskMetrics,
}

impl PositionTotals {
    pub fn from_positions(positions: &[PositionPnl]) -> Self {
        let mut totals = positions.iter().fold(Self::default(), |mut acc, p| {
            acc.count += 1;
            acc.total_current_pl += p.current_pl;
            acc.total_potential_loss += p.figures.potential_loss;
            acc.total_potential_profit += p.figures.potential_profit;
            acc.total_volume += p.volume;
            acc
        });
        totals.metrics = RiskMetrics::compute(totals.total_potential_profit, totals.total_potential_loss);
        totals
    }
}

/// Totals over pending orders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderTotals {
    pub count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_volume: Decimal,
    #[serde(flatten)]
    pub metrics: RiskMetrics,
}

impl OrderTotals {
    pub fn from_orders(orders: &[OrderPnl]) -> Self {
        let mut totals = orders.iter().fold(Self::default(), |mut acc, o| {
            acc.count += 1;
            acc.total_potential_loss += o.figures.potential_loss;
            acc.total_potential_profit += o.figures.potential_profit;
            acc.total_volume += o.volume;
            acc
        });
        totals.metrics = RiskMetrics::compute(totals.total_potential_profit, totals.total_potential_loss);
        totals
    }
}

/// Positions and orders together
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedTotals {
    pub total_items: usize,
    /// Positions only; orders have no floating P/L
    #[serde(with = "rust_decimal::serde::float")]
    pub total_current_pl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_profit: Decimal,
    #[serde(flatten)]
    pub metrics: RiskMetrics,
}

impl CombinedTotals {
    pub fn combine(positions: &PositionTotals, orders: &OrderTotals) -> Self {
        let total_potential_loss = positions.total_potential_loss + orders.total_potential_loss;
        let total_potential_profit = positions.total_potential_profit + orders.total_potential_profit;
        Self {
            total_items: positions.count + orders.count,
            total_current_pl: positions.total_current_pl,
            total_potential_loss,
            total_potential_profit,
            metrics: RiskMetrics::compute(total_potential_profit, total_potential_loss),
        }
    }
}

/// How open positions split by current P/L sign
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlDistribution {
    pub profitable: usize,
    pub losing: usize,
    pub breakeven: usize,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub profitable_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub losing_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub breakeven_pct: Option<Decimal>,
}

impl PlDistribution {
    pub fn from_positions(positions: &[PositionPnl]) -> Self {
        let mut dist = Self::default();
        for p in positions {
            if p.current_pl > Decimal::ZERO {
                dist.profitable += 1;
            } else if p.current_pl < Decimal::ZERO {
                dist.losing += 1;
            } else {
                dist.breakeven += 1;
            }
        }
        let n = positions.len();
        dist.profitable_pct = share_pct(dist.profitable, n);
        dist.losing_pct = share_pct(dist.losing, n);
        dist.breakeven_pct = share_pct(dist.breakeven, n);
        dist
    }
}

/// Volume and risk exposure statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExposureStats {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub position_volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub order_volume: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub average_volume: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub average_position_volume: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub average_order_volume: Option<Decimal>,
    /// Union of position and order symbols
    pub distinct_symbols: usize,
    /// |combined potential loss| as a multiple of |current P/L|
    #[serde(with = "rust_decimal::serde::float_option")]
    pub current_risk_exposure: Option<Decimal>,
    /// Loss if every stop is hit, plus the current floating loss if any
    #[serde(with = "rust_decimal::serde::float")]
    pub max_potential_drawdown: Decimal,
    /// Combined potential profit as a multiple of |current P/L|
    #[serde(with = "rust_decimal::serde::float_option")]
    pub profit_potential_multiplier: Option<Decimal>,
}

impl ExposureStats {
    pub fn compute(
        positions: &[PositionPnl],
        orders: &[OrderPnl],
        position_totals: &PositionTotals,
        order_totals: &OrderTotals,
        combined: &CombinedTotals,
    ) -> Self {
        let symbols: BTreeSet<&str> = positions
            .iter()
            .map(|p| p.symbol.as_str())
            .chain(orders.iter().map(|o| o.symbol.as_str()))
            .collect();

        let total_volume = position_totals.total_volume + order_totals.total_volume;
        let current_pl = combined.total_current_pl;
        let combined_loss = combined.total_potential_loss.abs();

        let current_risk_exposure = if current_pl.is_zero() || combined_loss.is_zero() {
            None
        } else {
            Some((combined_loss / current_pl.abs()).round_dp(2))
        };

        let max_potential_drawdown = if current_pl < Decimal::ZERO {
            combined_loss + current_pl.abs()
        } else {
            combined_loss
        };

        let profit_potential_multiplier = if current_pl.is_zero() {
            None
        } else {
            Some((combined.total_potential_profit / current_pl.abs()).round_dp(2))
        };

        Self {
            total_volume,
            position_volume: position_totals.total_volume,
            order_volume: order_totals.total_volume,
            average_volume: average(total_volume, combined.total_items),
            average_position_volume: average(position_totals.total_volume, position_totals.count),
            average_order_volume: average(order_totals.total_volume, order_totals.count),
            distinct_symbols: symbols.len(),
            current_risk_exposure,
            max_potential_drawdown,
            profit_potential_multiplier,
        }
    }
}

fn average(total: Decimal, count: usize) -> Option<Decimal> {
    if count == 0 {
        None
    } else {
        Some(total / Decimal::from(count))
    }
}

/// Everything the reporters need for one account
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountSummary {
    /// Floating P/L over open positions
    #[serde(with = "rust_decimal::serde::float")]
    pub total_profit_loss: Decimal,
    pub positions_count: usize,
    pub pending_orders_count: usize,
    pub profitable_positions: usize,
    pub losing_positions: usize,
    pub breakeven_positions: usize,
    pub positions: PositionTotals,
    pub pending_orders: OrderTotals,
    pub combined: CombinedTotals,
    pub distribution: PlDistribution,
    pub exposure: ExposureStats,
}

impl AccountSummary {
    /// Fold per-item results; the outcome does not depend on item order
    pub fn build(positions: &[PositionPnl], orders: &[OrderPnl]) -> Self {
        let position_totals = PositionTotals::from_positions(positions);
        let order_totals = OrderTotals::from_orders(orders);
        let combined = CombinedTotals::combine(&position_totals, &order_totals);
        let distribution = PlDistribution::from_positions(positions);
        let exposure = ExposureStats::compute(positions, orders, &position_totals, &order_totals, &combined);

        Self {
            total_profit_loss: position_totals.total_current_pl,
            positions_count: position_totals.count,
            pending_orders_count: order_totals.count,
            profitable_positions: distribution.profitable,
            losing_positions: distribution.losing,
            breakeven_positions: distribution.breakeven,
            positions: position_totals,
            pending_orders: order_totals,
            combined,
            distribution,
            exposure,
        }
    }
}
