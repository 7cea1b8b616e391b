//! Console text report
//!
//! Per successful account, six sections:
//!
//! 1. all open positions summary
//! 2. individual open positions
//! 3. all pending orders summary
//! 4. individual pending orders
//! 5. combined positions + orders
//! 6. additional statistics

use crate::account::{AccountReport, BatchSummary};
use crate::aggregate::AccountSummary;
use crate::pnl::{OrderPnl, PnlFigures, PositionPnl, RiskMetrics};
use rust_decimal::Decimal;
use std::fmt::Write;

const WIDE: usize = 100;
const NARROW: usize = 50;

fn money(value: Decimal) -> String {
    format!("${:.2}", value.round_dp(2))
}

fn price(value: Decimal) -> String {
    format!("{:.5}", value.round_dp(5))
}

fn fixed2(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Render the whole batch
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = write_summary(&mut out, summary);
    out
}

fn write_summary(out: &mut String, summary: &BatchSummary) -> std::fmt::Result {
    let info = &summary.processing_info;

    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(WIDE))?;
    writeln!(out, "MT5 COMPREHENSIVE PROFIT/LOSS ANALYSIS")?;
    writeln!(out, "{}", "=".repeat(WIDE))?;

    writeln!(out)?;
    writeln!(out, "Processing Summary:")?;
    writeln!(out, "  Run: {}", info.run_id)?;
    writeln!(out, "  Total Accounts: {}", info.total_accounts)?;
    writeln!(out, "  Successful: {}", info.accounts_processed_successfully)?;
    writeln!(out, "  Failed: {}", info.accounts_failed)?;
    writeln!(out, "  Start Time: {}", info.processing_start_time.to_rfc3339())?;
    match info.processing_end_time {
        Some(end) => writeln!(out, "  End Time: {}", end.to_rfc3339())?,
        None => writeln!(out, "  End Time: N/A")?,
    }

    if let Some(message) = &summary.error_message {
        writeln!(out, "  Error: {}", message)?;
    }

    if summary.accounts.is_empty() {
        writeln!(out)?;
        writeln!(out, "No account data available.")?;
        return Ok(());
    }

    for account in &summary.accounts {
        write_account(out, account)?;
    }

    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(WIDE))?;
    Ok(())
}

fn write_account(out: &mut String, account: &AccountReport) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", "-".repeat(WIDE))?;
    writeln!(
        out,
        "ACCOUNT: {} ({})",
        account.account_info.login, account.account_info.server
    )?;
    let status = if account.is_success() { "success" } else { "failed" };
    writeln!(out, "Status: {}", status)?;
    writeln!(out, "{}", "-".repeat(WIDE))?;

    if !account.is_success() {
        writeln!(
            out,
            "Error: {}",
            account.error_message.as_deref().unwrap_or("Unknown error")
        )?;
        return Ok(());
    }

    if let (Some(balance), Some(equity)) = (account.account_info.balance, account.account_info.equity) {
        writeln!(out, "Balance: {} | Equity: {}", money(balance), money(equity))?;
    }
    if account.skipped_items > 0 {
        writeln!(out, "Skipped items: {}", account.skipped_items)?;
    }

    let mut positions: Vec<&PositionPnl> = account.positions.iter().collect();
    positions.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.ticket.cmp(&b.ticket)));
    let mut orders: Vec<&OrderPnl> = account.pending_orders.iter().collect();
    orders.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.ticket.cmp(&b.ticket)));

    let summary = &account.summary;
    write_positions_summary(out, summary)?;
    write_positions(out, &positions)?;
    write_orders_summary(out, summary)?;
    write_orders(out, &orders)?;
    write_combined(out, summary)?;
    write_statistics(out, summary)?;
    Ok(())
}

fn section(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", "-".repeat(NARROW))
}

fn write_metrics(out: &mut String, prefix: &str, metrics: &RiskMetrics, indent: &str) -> std::fmt::Result {
    if let Some(pct) = metrics.profit_loss_percentage {
        writeln!(out, "{}{}Percentage Difference: {}%", indent, prefix, fixed2(pct))?;
    }
    if let Some(diff) = metrics.profit_loss_difference {
        writeln!(out, "{}{}USD Amount Difference: {}", indent, prefix, money(diff))?;
    }
    if let Some(ratio) = metrics.risk_reward_ratio {
        writeln!(out, "{}{}Risk/Reward Ratio: {}", indent, prefix, fixed2(ratio))?;
    }
    Ok(())
}

fn write_positions_summary(out: &mut String, summary: &AccountSummary) -> std::fmt::Result {
    section(out, "[1] ALL OPEN POSITIONS SUMMARY")?;
    let totals = &summary.positions;
    if totals.count == 0 {
        return writeln!(out, "  No open positions");
    }
    writeln!(out, "  Total Positions: {}", totals.count)?;
    writeln!(out, "  Current Unrealized P/L: {}", money(totals.total_current_pl))?;
    writeln!(out, "  Potential Loss (if all SL hit): {}", money(totals.total_potential_loss))?;
    writeln!(out, "  Potential Profit (if all TP hit): {}", money(totals.total_potential_profit))?;
    write_metrics(out, "", &totals.metrics, "  ")
}

fn write_levels(out: &mut String, stop_loss: Option<Decimal>, take_profit: Option<Decimal>, figures: &PnlFigures) -> std::fmt::Result {
    if let Some(sl) = stop_loss {
        writeln!(out, "    Stop Loss: {}", price(sl))?;
    }
    if let Some(tp) = take_profit {
        writeln!(out, "    Take Profit: {}", price(tp))?;
    }
    if !figures.potential_loss.is_zero() {
        writeln!(out, "    Potential Loss: {}", money(figures.potential_loss))?;
    }
    if !figures.potential_profit.is_zero() {
        writeln!(out, "    Potential Profit: {}", money(figures.potential_profit))?;
    }
    write_metrics(out, "", &figures.metrics, "    ")
}

fn write_positions(out: &mut String, positions: &[&PositionPnl]) -> std::fmt::Result {
    section(out, "[2] INDIVIDUAL OPEN POSITIONS")?;
    if positions.is_empty() {
        return writeln!(out, "  No individual positions to display");
    }
    for (i, pos) in positions.iter().enumerate() {
        writeln!(out, "  Position {}: {} | {} {} lots", i + 1, pos.symbol, pos.side, pos.volume)?;
        writeln!(
            out,
            "    Ticket: {} | Open: {} | Current: {}",
            pos.ticket,
            price(pos.price_open),
            price(pos.current_price)
        )?;
        writeln!(out, "    Current P/L: {}", money(pos.current_pl))?;
        write_levels(out, pos.stop_loss, pos.take_profit, &pos.figures)?;
        if pos.fallback_rate {
            writeln!(out, "    (default rate applied for {})", pos.symbol)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_orders_summary(out: &mut String, summary: &AccountSummary) -> std::fmt::Result {
    section(out, "[3] ALL PENDING ORDERS SUMMARY")?;
    let totals = &summary.pending_orders;
    if totals.count == 0 {
        return writeln!(out, "  No pending orders");
    }
    writeln!(out, "  Total Pending Orders: {}", totals.count)?;
    writeln!(out, "  Potential Loss (if all SL hit): {}", money(totals.total_potential_loss))?;
    writeln!(out, "  Potential Profit (if all TP hit): {}", money(totals.total_potential_profit))?;
    write_metrics(out, "", &totals.metrics, "  ")
}

fn write_orders(out: &mut String, orders: &[&OrderPnl]) -> std::fmt::Result {
    section(out, "[4] INDIVIDUAL PENDING ORDERS")?;
    if orders.is_empty() {
        return writeln!(out, "  No individual pending orders to display");
    }
    for (i, order) in orders.iter().enumerate() {
        writeln!(out, "  Order {}: {} | {} {} lots", i + 1, order.symbol, order.kind, order.volume)?;
        writeln!(
            out,
            "    Ticket: {} | Entry: {} | Current: {}",
            order.ticket,
            price(order.price_open),
            price(order.current_price)
        )?;
        write_levels(out, order.stop_loss, order.take_profit, &order.figures)?;
        if let Some(expires) = order.expires_at {
            writeln!(out, "    Expires: {}", expires.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if order.fallback_rate {
            writeln!(out, "    (default rate applied for {})", order.symbol)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_combined(out: &mut String, summary: &AccountSummary) -> std::fmt::Result {
    section(out, "[5] COMBINED POSITIONS + ORDERS SUMMARY")?;
    let combined = &summary.combined;
    writeln!(
        out,
        "  Total Items: {} ({} positions + {} orders)",
        combined.total_items, summary.positions_count, summary.pending_orders_count
    )?;
    writeln!(out, "  Current Unrealized P/L: {} (positions only)", money(combined.total_current_pl))?;
    writeln!(out, "  Combined Potential Loss: {}", money(combined.total_potential_loss))?;
    writeln!(out, "  Combined Potential Profit: {}", money(combined.total_potential_profit))?;
    write_metrics(out, "Combined ", &combined.metrics, "  ")
}

fn write_statistics(out: &mut String, summary: &AccountSummary) -> std::fmt::Result {
    section(out, "[6] ADDITIONAL USEFUL STATISTICS")?;
    let exposure = &summary.exposure;
    let dist = &summary.distribution;

    writeln!(out, "  Total Volume Exposure: {} lots", fixed2(exposure.total_volume))?;
    writeln!(out, "    Open Positions: {} lots", fixed2(exposure.position_volume))?;
    writeln!(out, "    Pending Orders: {} lots", fixed2(exposure.order_volume))?;
    writeln!(out, "  Symbol Diversification: {} unique symbols", exposure.distinct_symbols)?;

    if let (Some(p), Some(l), Some(b)) = (dist.profitable_pct, dist.losing_pct, dist.breakeven_pct) {
        writeln!(out, "  Position P/L Distribution:")?;
        writeln!(out, "    Profitable: {} ({:.1}%)", dist.profitable, p)?;
        writeln!(out, "    Losing: {} ({:.1}%)", dist.losing, l)?;
        writeln!(out, "    Breakeven: {} ({:.1}%)", dist.breakeven, b)?;
    }

    if let Some(avg) = exposure.average_position_volume {
        writeln!(out, "  Average Position Size: {} lots", fixed2(avg))?;
    }
    if let Some(avg) = exposure.average_order_volume {
        writeln!(out, "  Average Order Size: {} lots", fixed2(avg))?;
    }
    if let Some(ratio) = exposure.current_risk_exposure {
        writeln!(out, "  Current Risk Exposure: {}x current P/L", fixed2(ratio))?;
    }
    writeln!(out, "  Maximum Potential Drawdown: {}", money(exposure.max_potential_drawdown))?;
    if let Some(multiplier) = exposure.profit_potential_multiplier {
        writeln!(out, "  Profit Potential Multiplier: {}x current P/L", fixed2(multiplier))?;
    }
    Ok(())
}
