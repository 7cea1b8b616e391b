//! Account batch runner
//!
//! Walks the configured accounts one at a time over a single terminal
//! session:
//!
//! ```text
//! pending -> connecting -> connected -> computing -> done
//!                 \                         \
//!                  `-> failed                `-> failed
//! ```
//!
//! Item-level problems (malformed records, missing quotes, unmapped
//! symbols when skipping) drop the item and are counted. Account-level
//! problems mark the account failed. Nothing aborts the batch.

#[cfg(test)]
mod tests;

use crate::aggregate::AccountSummary;
use crate::cache::SnapshotCache;
use crate::error::{CalcError, Result};
use crate::pnl::{ItemPnl, OrderPnl, PnlEngine, PositionPnl};
pub use crate::retry::RetryPolicy;
use crate::terminal::{AccountCredentials, TradingTerminal};
use crate::types::{AccountInfo, PendingOrder, Position, Quote, TradeItem};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Pending,
    Connecting,
    Connected,
    Computing,
    Done,
    Failed,
}

impl AccountState {
    fn advance(&mut self, next: AccountState, login: u64) {
        debug!("Account {}: {:?} -> {:?}", login, self, next);
        *self = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failed,
}

/// Identity of a processed account, plus balances once connected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReportInfo {
    pub login: u64,
    pub server: String,
    pub processed_at: DateTime<Utc>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub balance: Option<Decimal>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub equity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReport {
    pub account_info: AccountReportInfo,
    pub positions: Vec<PositionPnl>,
    pub pending_orders: Vec<OrderPnl>,
    pub summary: AccountSummary,
    /// Records dropped for being malformed, unquoted, or unmapped
    pub skipped_items: usize,
    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
}

impl AccountReport {
    fn failed(credentials: &AccountCredentials, message: String) -> Self {
        Self {
            account_info: AccountReportInfo {
                login: credentials.login,
                server: credentials.server.clone(),
                processed_at: Utc::now(),
                balance: None,
                equity: None,
            },
            positions: Vec::new(),
            pending_orders: Vec::new(),
            summary: AccountSummary::default(),
            skipped_items: 0,
            processing_status: ProcessingStatus::Failed,
            error_message: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.processing_status == ProcessingStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingInfo {
    pub run_id: Uuid,
    pub total_accounts: usize,
    pub accounts_processed_successfully: usize,
    pub accounts_failed: usize,
    pub processing_start_time: DateTime<Utc>,
    pub processing_end_time: Option<DateTime<Utc>>,
}

/// Result of a whole run, in account order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processing_info: ProcessingInfo,
    pub accounts: Vec<AccountReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    Partial,
    NoneSucceeded,
}

impl BatchOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            BatchOutcome::AllSucceeded => 0,
            BatchOutcome::NoneSucceeded => 1,
            BatchOutcome::Partial => 2,
        }
    }
}

impl BatchSummary {
    pub fn outcome(&self) -> BatchOutcome {
        let info = &self.processing_info;
        if info.accounts_processed_successfully == 0 {
            BatchOutcome::NoneSucceeded
        } else if info.accounts_failed == 0 {
            BatchOutcome::AllSucceeded
        } else {
            BatchOutcome::Partial
        }
    }
}

struct EvaluatedBooks {
    positions: Vec<PositionPnl>,
    orders: Vec<OrderPnl>,
    skipped: usize,
}

pub struct AccountRunner {
    terminal: Arc<dyn TradingTerminal>,
    engine: PnlEngine,
    cache: SnapshotCache,
    retry: RetryPolicy,
    account_delay: Duration,
}

impl AccountRunner {
    pub fn new(
        terminal: Arc<dyn TradingTerminal>,
        engine: PnlEngine,
        cache: SnapshotCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            terminal,
            engine,
            cache,
            retry,
            account_delay: Duration::ZERO,
        }
    }

    /// Pause inserted between accounts (never before the first)
    pub fn with_account_delay(mut self, delay: Duration) -> Self {
        self.account_delay = delay;
        self
    }

    /// Shared handle, for a best-effort disconnect on interrupt
    pub fn terminal(&self) -> Arc<dyn TradingTerminal> {
        self.terminal.clone()
    }

    /// Process every configured account, or only `only_login` when given
    pub async fn run(&mut self, accounts: &[AccountCredentials], only_login: Option<u64>) -> BatchSummary {
        let start = Utc::now();
        let run_id = Uuid::new_v4();

        let selected: Vec<&AccountCredentials> = accounts
            .iter()
            .filter(|a| only_login.map_or(true, |login| a.login == login))
            .collect();

        if let Some(login) = only_login.filter(|_| selected.is_empty()) {
            let message = format!("Account {} not found in configuration", login);
            error!("{}", message);
            return BatchSummary {
                processing_info: ProcessingInfo {
                    run_id,
                    total_accounts: 0,
                    accounts_processed_successfully: 0,
                    accounts_failed: 0,
                    processing_start_time: start,
                    processing_end_time: Some(Utc::now()),
                },
                accounts: Vec::new(),
                error_message: Some(message),
            };
        }

        info!("Starting processing of {} accounts (run {})", selected.len(), run_id);

        let mut reports = Vec::with_capacity(selected.len());
        let mut succeeded = 0;
        let mut failed = 0;

        for (i, credentials) in selected.iter().enumerate() {
            if i > 0 && !self.account_delay.is_zero() {
                info!(
                    "Waiting {:?} before processing next account...",
                    self.account_delay
                );
                tokio::time::sleep(self.account_delay).await;
            }

            let report = self.process_account(credentials).await;
            if report.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
            reports.push(report);
        }

        info!("Processing completed: {} successful, {} failed", succeeded, failed);

        BatchSummary {
            processing_info: ProcessingInfo {
                run_id,
                total_accounts: selected.len(),
                accounts_processed_successfully: succeeded,
                accounts_failed: failed,
                processing_start_time: start,
                processing_end_time: Some(Utc::now()),
            },
            accounts: reports,
            error_message: None,
        }
    }

    /// One account, start to finish. The terminal is always disconnected
    /// afterwards and the cache never outlives the account.
    pub async fn process_account(&mut self, credentials: &AccountCredentials) -> AccountReport {
        let login = credentials.login;
        let mut state = AccountState::Pending;
        info!("Processing account {} ({})", login, credentials.server);

        self.cache.clear();
        state.advance(AccountState::Connecting, login);

        let terminal = self.terminal.clone();
        let connected = self
            .retry
            .run(&format!("Connect to {}", login), |_| {
                connect_checked(terminal.as_ref(), credentials)
            })
            .await;

        let report = match connected {
            Ok(info) => {
                state.advance(AccountState::Connected, login);
                state.advance(AccountState::Computing, login);
                match self.evaluate_books().await {
                    Ok(books) => {
                        state.advance(AccountState::Done, login);
                        info!(
                            "Successfully processed account {}: {} positions, {} orders, {} skipped",
                            login,
                            books.positions.len(),
                            books.orders.len(),
                            books.skipped
                        );
                        success_report(credentials, &info, books)
                    }
                    Err(e) => {
                        state.advance(AccountState::Failed, login);
                        let message = format!("Error processing account {}: {}", login, e);
                        error!("{}", message);
                        AccountReport::failed(credentials, message)
                    }
                }
            }
            Err(e) => {
                state.advance(AccountState::Failed, login);
                let message = format!("Failed to connect to account {}: {}", login, e);
                error!("{}", message);
                AccountReport::failed(credentials, message)
            }
        };

        if let Err(e) = self.terminal.disconnect().await {
            warn!("Error disconnecting from account {}: {}", login, e);
        }
        self.cache.clear();

        report
    }

    async fn evaluate_books(&mut self) -> Result<EvaluatedBooks> {
        let terminal = self.terminal.clone();
        let now = Utc::now();
        let raw_positions = self.cache.positions(terminal.as_ref(), &self.retry, now).await?;
        let raw_orders = self.cache.orders(terminal.as_ref(), &self.retry, now).await?;

        let mut skipped = 0;
        let mut items = Vec::with_capacity(raw_positions.len() + raw_orders.len());

        for raw in raw_positions {
            match raw.into_parsed().and_then(Position::try_from) {
                Ok(p) => items.push(TradeItem::Position(p)),
                Err(e) if e.is_item_level() => {
                    warn!("Skipping position: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        for raw in raw_orders {
            match raw.into_parsed().and_then(PendingOrder::try_from) {
                Ok(o) => items.push(TradeItem::PendingOrder(o)),
                Err(e) if e.is_item_level() => {
                    warn!("Skipping order: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let mut quotes: HashMap<String, Option<Quote>> = HashMap::new();
        let mut positions = Vec::new();
        let mut orders = Vec::new();

        for item in &items {
            let quote = quote_for(terminal.as_ref(), &self.retry, &mut quotes, item.symbol()).await?;
            let Some(quote) = quote else {
                warn!("Skipping ticket {}: no quote for {}", item.ticket(), item.symbol());
                skipped += 1;
                continue;
            };
            match self.engine.evaluate(item, &quote) {
                Ok(Some(ItemPnl::Position(p))) => positions.push(p),
                Ok(Some(ItemPnl::Order(o))) => orders.push(o),
                Ok(None) => skipped += 1,
                Err(e) if e.is_item_level() => {
                    warn!("Skipping ticket {}: {}", item.ticket(), e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(EvaluatedBooks {
            positions,
            orders,
            skipped,
        })
    }
}

/// Connect and make sure the terminal really is on the requested account
async fn connect_checked(
    terminal: &dyn TradingTerminal,
    credentials: &AccountCredentials,
) -> Result<AccountInfo> {
    let info = terminal.connect(credentials).await?;
    if info.login != credentials.login {
        if let Err(e) = terminal.disconnect().await {
            warn!("Error disconnecting wrong account {}: {}", info.login, e);
        }
        return Err(CalcError::ConnectionFailure(format!(
            "terminal is logged into account {} (expected {})",
            info.login, credentials.login
        )));
    }
    info!(
        "Connected to {} on {} (balance {}, equity {})",
        info.login, info.server, info.balance, info.equity
    );
    Ok(info)
}

/// Quotes are fetched once per symbol per account; item-level failures
/// are remembered as `None`, anything else fails the account
async fn quote_for(
    terminal: &dyn TradingTerminal,
    retry: &RetryPolicy,
    memo: &mut HashMap<String, Option<Quote>>,
    symbol: &str,
) -> Result<Option<Quote>> {
    if let Some(cached) = memo.get(symbol) {
        return Ok(*cached);
    }
    let quote = match retry
        .run(&format!("Quote {}", symbol), move |_| terminal.quote(symbol))
        .await
    {
        Ok(q) => Some(q),
        Err(e) if e.is_item_level() => {
            warn!("{}", e);
            None
        }
        Err(e) => return Err(e),
    };
    memo.insert(symbol.to_string(), quote);
    Ok(quote)
}

fn success_report(credentials: &AccountCredentials, info: &AccountInfo, books: EvaluatedBooks) -> AccountReport {
    let summary = AccountSummary::build(&books.positions, &books.orders);
    AccountReport {
        account_info: AccountReportInfo {
            login: info.login,
            server: if info.server.is_empty() {
                credentials.server.clone()
            } else {
                info.server.clone()
            },
            processed_at: Utc::now(),
            balance: Some(info.balance),
            equity: Some(info.equity),
        },
        positions: books.positions,
        pending_orders: books.orders,
        summary,
        skipped_items: books.skipped,
        processing_status: ProcessingStatus::Success,
        error_message: None,
    }
}
