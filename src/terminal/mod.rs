//! Trading terminal access
//!
//! The terminal holds exactly one logged-in account at a time. Everything
//! above this module talks to it through [`TradingTerminal`]; two adapters
//! are provided:
//!
//! - [`SnapshotTerminal`] replays per-account JSON snapshots from a directory
//! - [`BridgeTerminal`] talks to an MT5 HTTP bridge

mod bridge;
mod snapshot;
#[cfg(test)]
mod tests;

pub use bridge::BridgeTerminal;
pub use snapshot::{AccountSnapshot, SnapshotTerminal};

use crate::error::Result;
use crate::types::{AccountInfo, Quote, RawOrder, RawPosition, RawRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Login details for one account
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub login: u64,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub server: String,
    /// Terminal installation to attach to, if the bridge needs one
    #[serde(default)]
    pub terminal_path: Option<String>,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("login", &self.login)
            .field("password", &"***")
            .field("server", &self.server)
            .field("terminal_path", &self.terminal_path)
            .finish()
    }
}

/// One exclusive terminal session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingTerminal: Send + Sync {
    /// Log into an account, replacing any current session
    async fn connect(&self, credentials: &AccountCredentials) -> Result<AccountInfo>;

    /// End the current session; a no-op when not connected
    async fn disconnect(&self) -> Result<()>;

    /// Open positions of the connected account, one record per element
    async fn positions(&self) -> Result<Vec<RawRecord<RawPosition>>>;

    /// Pending orders of the connected account
    async fn orders(&self) -> Result<Vec<RawRecord<RawOrder>>>;

    /// Current bid/ask for a symbol
    async fn quote(&self, symbol: &str) -> Result<Quote>;
}
