//! MT5 Profit/Loss Calculator
//!
//! Connects to trading accounts one at a time, reads open positions and
//! pending orders, and reports current and hypothetical (stop-loss /
//! take-profit) profit and loss per item and per account.
//!
//! ## Architecture
//!
//! ```text
//! Terminal → SnapshotCache → PnlEngine (per item) → AccountSummary (per account)
//!                                                         ↓
//!                                AccountRunner (per batch) → Reporters (JSON / console)
//! ```

pub mod account;
pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod pnl;
pub mod rates;
pub mod report;
pub mod retry;
pub mod terminal;
pub mod types;
pub mod utils;
