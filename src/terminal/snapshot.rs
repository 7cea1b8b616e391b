//! File-backed terminal
//!
//! Each account lives in `<dir>/<login>.json`:
//!
//! ```json
//! {
//!   "account": { "login": 12345678, "server": "Demo-Server", "balance": 10000.0 },
//!   "password": "optional, checked on connect when present",
//!   "positions": [ { "ticket": 1, "symbol": "EURUSD", "type": 0, ... } ],
//!   "orders": [ { "ticket": 2, "symbol": "GBPUSD", "type": "SELL_LIMIT", ... } ],
//!   "quotes": { "EURUSD": { "bid": 1.1020, "ask": 1.1022 } }
//! }
//! ```

use super::{AccountCredentials, TradingTerminal};
use crate::error::{CalcError, Result};
use crate::types::{AccountInfo, Quote, RawOrder, RawPosition, RawRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Contents of one snapshot file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: Option<AccountInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub positions: Vec<RawRecord<RawPosition>>,
    #[serde(default)]
    pub orders: Vec<RawRecord<RawOrder>>,
    #[serde(default)]
    pub quotes: HashMap<String, Quote>,
}

pub struct SnapshotTerminal {
    dir: PathBuf,
    session: RwLock<Option<AccountSnapshot>>,
}

impl SnapshotTerminal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            session: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, login: u64) -> PathBuf {
        self.dir.join(format!("{}.json", login))
    }

    async fn load(&self, login: u64) -> Result<AccountSnapshot> {
        let path = self.snapshot_path(login);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CalcError::ConnectionFailure(format!(
                    "no snapshot for account {} at {}",
                    login,
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| {
            CalcError::ConnectionFailure(format!("unreadable snapshot {}: {}", path.display(), e))
        })
    }

    async fn with_session<T>(&self, f: impl FnOnce(&AccountSnapshot) -> Result<T>) -> Result<T> {
        let session = self.session.read().await;
        match session.as_ref() {
            Some(snapshot) => f(snapshot),
            None => Err(CalcError::Terminal("not connected".to_string())),
        }
    }
}

#[async_trait]
impl TradingTerminal for SnapshotTerminal {
    async fn connect(&self, credentials: &AccountCredentials) -> Result<AccountInfo> {
        // A new login always tears down the previous session first
        *self.session.write().await = None;

        let snapshot = self.load(credentials.login).await?;

        if let Some(expected) = &snapshot.password {
            if *expected != credentials.password {
                return Err(CalcError::ConnectionFailure(format!(
                    "authorization failed for account {}",
                    credentials.login
                )));
            }
        }

        let account = snapshot.account.clone().unwrap_or_else(|| AccountInfo {
            login: credentials.login,
            server: credentials.server.clone(),
            balance: Default::default(),
            equity: Default::default(),
            trade_allowed: true,
        });

        info!(
            "Snapshot session opened for {} ({} positions, {} orders)",
            account.login,
            snapshot.positions.len(),
            snapshot.orders.len()
        );
        *self.session.write().await = Some(snapshot);
        Ok(account)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.session.write().await.take().is_some() {
            debug!("Snapshot session closed");
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<RawRecord<RawPosition>>> {
        self.with_session(|s| Ok(s.positions.clone())).await
    }

    async fn orders(&self) -> Result<Vec<RawRecord<RawOrder>>> {
        self.with_session(|s| Ok(s.orders.clone())).await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.with_session(|s| {
            s.quotes
                .get(symbol)
                .copied()
                .ok_or_else(|| CalcError::QuoteUnavailable {
                    symbol: symbol.to_string(),
                    reason: "symbol not in snapshot".to_string(),
                })
        })
        .await
    }
}
