//! MT5 HTTP bridge client
//!
//! Endpoints:
//! - `POST /connect` with login, password, server, path; returns account info
//! - `POST /disconnect`
//! - `GET /positions`, `GET /orders`
//! - `GET /symbols/{symbol}/tick`; returns `{ "bid": .., "ask": .. }`

use super::{AccountCredentials, TradingTerminal};
use crate::error::{CalcError, Result};
use crate::types::{AccountInfo, Quote, RawOrder, RawPosition, RawRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    login: u64,
    password: &'a str,
    server: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
}

#[derive(Clone)]
pub struct BridgeTerminal {
    http: Client,
    base_url: String,
}

impl BridgeTerminal {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_list<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let resp = self.http.get(self.url(path)).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CalcError::Terminal(format!("GET {} failed ({}): {}", path, status, body)));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TradingTerminal for BridgeTerminal {
    async fn connect(&self, credentials: &AccountCredentials) -> Result<AccountInfo> {
        let body = ConnectRequest {
            login: credentials.login,
            password: &credentials.password,
            server: &credentials.server,
            path: credentials.terminal_path.as_deref(),
        };

        let resp = self
            .http
            .post(self.url("/connect"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CalcError::ConnectionFailure(format!("bridge unreachable: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CalcError::ConnectionFailure(format!(
                "login {} rejected ({}): {}",
                credentials.login, status, text
            )));
        }

        let info: AccountInfo = resp.json().await?;
        debug!("Bridge connected to {} on {}", info.login, info.server);
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        let resp = self.http.post(self.url("/disconnect")).send().await?;
        if !resp.status().is_success() {
            return Err(CalcError::Terminal(format!("disconnect failed: {}", resp.status())));
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<RawRecord<RawPosition>>> {
        self.get_list("/positions").await
    }

    async fn orders(&self) -> Result<Vec<RawRecord<RawOrder>>> {
        self.get_list("/orders").await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let unavailable = |reason: String| CalcError::QuoteUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(self.url(&format!("/symbols/{}/tick", symbol)))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(unavailable(format!("bridge returned {}", resp.status())));
        }

        resp.json().await.map_err(|e| unavailable(e.to_string()))
    }
}
