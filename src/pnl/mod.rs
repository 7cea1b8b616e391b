//! Profit/loss engine
//!
//! Pure computation over one position or pending order plus its live quote:
//!
//! - `current_pl` is the broker-reported floating P/L (positions only)
//! - `potential_loss` is what the item loses if its stop-loss is hit (≤ 0)
//! - `potential_profit` is what it gains if its take-profit is hit (≥ 0)
//! - percentage / ratio / difference are derived from the two, and are
//!   undefined whenever the potential loss is zero
//!
//! Arithmetic is checked: figures that overflow `Decimal` make the item a
//! malformed record instead of aborting the run.
//!
//! ```rust,ignore
//! let engine = PnlEngine::new(RateTable::standard(), EngineOptions::default());
//! let pnl = engine.evaluate_position(&position, &quote)?;
//! ```


use crate::error::{CalcError, Result};
use crate::rates::{RateLookup, RateTable};
use crate::types::{OrderKind, PendingOrder, Position, Quote, Side, TradeItem};
use crate::utils::{round2, serialize_nonzero};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

/// Ratios derived from a potential profit / potential loss pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskMetrics {
    /// ((profit - |loss|) / |loss|) * 100, two decimals
    #[serde(with = "rust_decimal::serde::float_option")]
    pub profit_loss_percentage: Option<Decimal>,
    /// profit / |loss|, two decimals
    #[serde(with = "rust_decimal::serde::float_option")]
    pub risk_reward_ratio: Option<Decimal>,
    /// profit - |loss|
    #[serde(with = "rust_decimal::serde::float_option")]
    pub profit_loss_difference: Option<Decimal>,
}

impl RiskMetrics {
    /// Same formulas for a single item and for summed totals.
    /// A zero loss leaves every figure undefined, even with a non-zero profit;
    /// so does a quotient too large for `Decimal`.
    pub fn compute(potential_profit: Decimal, potential_loss: Decimal) -> Self {
        if potential_loss.is_zero() {
            return Self::default();
        }

        let abs_loss = potential_loss.abs();
        let difference = potential_profit.checked_sub(abs_loss);

        Self {
            profit_loss_percentage: difference
                .and_then(|d| d.checked_div(abs_loss))
                .and_then(|q| q.checked_mul(Decimal::ONE_HUNDRED))
                .map(round2),
            risk_reward_ratio: potential_profit.checked_div(abs_loss).map(round2),
            profit_loss_difference: difference,
        }
    }
}

/// (from - to) * volume * rate, `None` on overflow
fn exposure(from: Decimal, to: Decimal, volume: Decimal, rate: Decimal) -> Option<Decimal> {
    from.checked_sub(to)?.checked_mul(volume)?.checked_mul(rate)
}

/// Potential loss if the stop-loss is hit; zero when no stop is set.
/// A stop beyond entry on the profit side carries no risk and yields zero.
/// `None` when the figure overflows.
pub fn potential_loss(
    side: Side,
    entry: Decimal,
    stop_loss: Option<Decimal>,
    volume: Decimal,
    rate: Decimal,
) -> Option<Decimal> {
    let Some(stop) = stop_loss.filter(|sl| *sl > Decimal::ZERO) else {
        return Some(Decimal::ZERO);
    };

    let risk = match side {
        Side::Buy => exposure(entry, stop, volume, rate)?,
        Side::Sell => exposure(stop, entry, volume, rate)?,
    };
    if risk <= Decimal::ZERO {
        Some(Decimal::ZERO)
    } else {
        Some(-risk)
    }
}

/// Potential profit if the take-profit is hit; zero when no target is set.
/// `None` when the figure overflows.
pub fn potential_profit(
    side: Side,
    entry: Decimal,
    take_profit: Option<Decimal>,
    volume: Decimal,
    rate: Decimal,
) -> Option<Decimal> {
    let Some(target) = take_profit.filter(|tp| *tp > Decimal::ZERO) else {
        return Some(Decimal::ZERO);
    };

    let gain = match side {
        Side::Buy => exposure(target, entry, volume, rate)?,
        Side::Sell => exposure(entry, target, volume, rate)?,
    };
    Some(gain.max(Decimal::ZERO))
}

/// Hypothetical outcome of one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PnlFigures {
    /// ≤ 0, rendered as null when no stop-loss applies
    #[serde(serialize_with = "serialize_nonzero")]
    pub potential_loss: Decimal,
    /// ≥ 0, rendered as null when no take-profit applies
    #[serde(serialize_with = "serialize_nonzero")]
    pub potential_profit: Decimal,
    #[serde(flatten)]
    pub metrics: RiskMetrics,
}

impl PnlFigures {
    pub fn from_levels(
        side: Side,
        entry: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        volume: Decimal,
        rate: Decimal,
    ) -> Option<Self> {
        let loss = potential_loss(side, entry, stop_loss, volume, rate)?;
        let profit = potential_profit(side, entry, take_profit, volume, rate)?;
        Some(Self {
            potential_loss: loss,
            potential_profit: profit,
            metrics: RiskMetrics::compute(profit, loss),
        })
    }
}

/// Per-position result, shaped for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPnl {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_open: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(rename = "sl", with = "rust_decimal::serde::float_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(rename = "tp", with = "rust_decimal::serde::float_option")]
    pub take_profit: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_pl: Decimal,
    #[serde(flatten)]
    pub figures: PnlFigures,
    pub magic: i64,
    pub comment: String,
    #[serde(rename = "time")]
    pub opened_at: Option<DateTime<Utc>>,
    /// Symbol missing from the rate table, default rate applied
    pub fallback_rate: bool,
}

/// Per-order result, shaped for reporting. Orders have no current P/L.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPnl {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_open: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(rename = "sl", with = "rust_decimal::serde::float_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(rename = "tp", with = "rust_decimal::serde::float_option")]
    pub take_profit: Option<Decimal>,
    #[serde(flatten)]
    pub figures: PnlFigures,
    pub magic: i64,
    pub comment: String,
    #[serde(rename = "time_setup")]
    pub setup_at: Option<DateTime<Utc>>,
    #[serde(rename = "time_expiration")]
    pub expires_at: Option<DateTime<Utc>>,
    pub fallback_rate: bool,
}

impl OrderPnl {
    pub fn side(&self) -> Side {
        self.kind.side()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemPnl {
    Position(PositionPnl),
    Order(OrderPnl),
}

/// Behaviour for symbols missing from the rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Drop the item instead of using `DEFAULT_RATE`
    pub skip_unmapped_symbols: bool,
    pub log_missing_symbol_warnings: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            skip_unmapped_symbols: false,
            log_missing_symbol_warnings: true,
        }
    }
}

pub struct PnlEngine {
    rates: RateTable,
    options: EngineOptions,
}

impl PnlEngine {
    pub fn new(rates: RateTable, options: EngineOptions) -> Self {
        Self { rates, options }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// `None` when the symbol is unmapped and unmapped symbols are skipped
    fn rate_for(&self, symbol: &str, ticket: u64) -> Option<RateLookup> {
        let lookup = self.rates.lookup(symbol);
        if lookup.is_fallback() {
            if self.options.skip_unmapped_symbols {
                warn!("No rate configured for {} (ticket {}), skipping", symbol, ticket);
                return None;
            }
            if self.options.log_missing_symbol_warnings {
                warn!(
                    "No rate configured for {} (ticket {}), using default {}",
                    symbol,
                    ticket,
                    lookup.value()
                );
            }
        }
        Some(lookup)
    }

    /// `Ok(None)` when the symbol is skipped as unmapped
    pub fn evaluate_position(&self, position: &Position, quote: &Quote) -> Result<Option<PositionPnl>> {
        let Some(rate) = self.rate_for(&position.symbol, position.ticket) else {
            return Ok(None);
        };
        let figures = PnlFigures::from_levels(
            position.side,
            position.price_open,
            position.stop_loss,
            position.take_profit,
            position.volume,
            rate.value(),
        )
        .ok_or_else(|| overflow("position", position.ticket))?;

        debug!(
            "Position {} {} {} {}: loss {} profit {}",
            position.ticket,
            position.symbol,
            position.side,
            position.volume,
            figures.potential_loss,
            figures.potential_profit
        );

        Ok(Some(PositionPnl {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            side: position.side,
            volume: position.volume,
            price_open: position.price_open,
            current_price: quote.price_for(position.side),
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            current_pl: position.profit,
            figures,
            magic: position.magic,
            comment: position.comment.clone(),
            opened_at: position.opened_at,
            fallback_rate: rate.is_fallback(),
        }))
    }

    pub fn evaluate_order(&self, order: &PendingOrder, quote: &Quote) -> Result<Option<OrderPnl>> {
        let Some(rate) = self.rate_for(&order.symbol, order.ticket) else {
            return Ok(None);
        };
        let side = order.side();
        let figures = PnlFigures::from_levels(
            side,
            order.price_open,
            order.stop_loss,
            order.take_profit,
            order.volume,
            rate.value(),
        )
        .ok_or_else(|| overflow("order", order.ticket))?;

        debug!(
            "Order {} {} {} {}: loss {} profit {}",
            order.ticket,
            order.symbol,
            order.kind,
            order.volume,
            figures.potential_loss,
            figures.potential_profit
        );

        Ok(Some(OrderPnl {
            ticket: order.ticket,
            symbol: order.symbol.clone(),
            kind: order.kind,
            volume: order.volume,
            price_open: order.price_open,
            current_price: quote.price_for(side),
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            figures,
            magic: order.magic,
            comment: order.comment.clone(),
            setup_at: order.setup_at,
            expires_at: order.expires_at,
            fallback_rate: rate.is_fallback(),
        }))
    }

    pub fn evaluate(&self, item: &TradeItem, quote: &Quote) -> Result<Option<ItemPnl>> {
        Ok(match item {
            TradeItem::Position(p) => self.evaluate_position(p, quote)?.map(ItemPnl::Position),
            TradeItem::PendingOrder(o) => self.evaluate_order(o, quote)?.map(ItemPnl::Order),
        })
    }
}

fn overflow(kind: &'static str, ticket: u64) -> CalcError {
    CalcError::malformed(kind, Some(ticket), "price, volume or rate out of range")
}
