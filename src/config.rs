//! Configuration management
//!
//! Loaded from a TOML file, then overridden by `PLCALC__SECTION__KEY`
//! environment variables. Passwords and paths go through `shellexpand`,
//! so `~` and `$VAR` / `${VAR}` work in them.

use crate::retry::RetryPolicy;
use crate::cache::{CachePolicy, MagicFilter};
use crate::error::{CalcError, Result};
use crate::pnl::EngineOptions;
use crate::rates::RateTable;
use crate::terminal::AccountCredentials;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "PLCALC";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub magic_filter: MagicFilterConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    pub login: u64,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub terminal_path: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("login", &self.login)
            .field("password", &"***")
            .field("server", &self.server)
            .field("terminal_path", &self.terminal_path)
            .finish()
    }
}

impl AccountConfig {
    /// Credentials with `~` / `$VAR` expanded in password and terminal path
    pub fn credentials(&self) -> Result<AccountCredentials> {
        Ok(AccountCredentials {
            login: self.login,
            password: expand(&self.password)?,
            server: self.server.clone(),
            terminal_path: self.terminal_path.as_deref().map(expand).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    #[default]
    Snapshot,
    Bridge,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub kind: TerminalKind,
    /// Directory of `<login>.json` files for the snapshot terminal
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_snapshot_dir() -> String {
    "snapshots".to_string()
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8228".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            kind: TerminalKind::default(),
            snapshot_dir: default_snapshot_dir(),
            bridge_url: default_bridge_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl TerminalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand(&self.snapshot_dir)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_account_delay")]
    pub account_delay_secs: f64,
    #[serde(default = "default_true")]
    pub enable_account_delay: bool,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
}

fn default_account_delay() -> f64 {
    5.0
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            account_delay_secs: default_account_delay(),
            enable_account_delay: true,
            connect_attempts: default_connect_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

impl ProcessingConfig {
    /// Zero when the delay is disabled
    pub fn account_delay(&self) -> Duration {
        if self.enable_account_delay {
            secs(self.account_delay_secs)
        } else {
            Duration::ZERO
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, secs(self.retry_delay_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl")]
    pub position_ttl_secs: u32,
    #[serde(default = "default_ttl")]
    pub order_ttl_secs: u32,
}

fn default_ttl() -> u32 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            position_ttl_secs: default_ttl(),
            order_ttl_secs: default_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            position_ttl: chrono::Duration::seconds(self.position_ttl_secs.into()),
            order_ttl: chrono::Duration::seconds(self.order_ttl_secs.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    /// Start from the built-in symbol table
    #[serde(default = "default_true")]
    pub use_standard: bool,
    /// Added to, or overriding, the starting table
    #[serde(default)]
    pub symbols: HashMap<String, Decimal>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            use_standard: true,
            symbols: HashMap::new(),
        }
    }
}

impl RatesConfig {
    pub fn table(&self) -> RateTable {
        let mut table = if self.use_standard {
            RateTable::standard()
        } else {
            RateTable::new()
        };
        table.extend(self.symbols.iter().map(|(s, r)| (s.as_str(), *r)));
        table
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub skip_unmapped_symbols: bool,
    #[serde(default = "default_true")]
    pub log_missing_symbol_warnings: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            skip_unmapped_symbols: false,
            log_missing_symbol_warnings: true,
        }
    }
}

impl ValidationConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            skip_unmapped_symbols: self.skip_unmapped_symbols,
            log_missing_symbol_warnings: self.log_missing_symbol_warnings,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MagicFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Empty means everything passes, even when enabled
    #[serde(default)]
    pub numbers: Vec<i64>,
}

impl MagicFilterConfig {
    pub fn filter(&self) -> MagicFilter {
        if self.enabled && !self.numbers.is_empty() {
            MagicFilter::only(self.numbers.iter().copied())
        } else {
            MagicFilter::allow_all()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default = "default_true")]
    pub json: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            console: true,
            json: true,
            output_dir: default_output_dir(),
        }
    }
}

impl OutputConfig {
    pub fn output_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand(&self.output_dir)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub to_file: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: true,
            log_dir: default_log_dir(),
        }
    }
}

impl LoggingConfig {
    pub fn log_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand(&self.log_dir)?))
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn expand(value: &str) -> Result<String> {
    shellexpand::full(value)
        .map(|v| v.into_owned())
        .map_err(|e| CalcError::Config(format!("cannot expand {:?}: {}", value, e)))
}

impl Config {
    /// Load from a TOML file, with `PLCALC__` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Every problem found, empty when the configuration is usable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.accounts.is_empty() {
            errors.push("no accounts configured".to_string());
        }
        let mut seen = BTreeSet::new();
        for (i, account) in self.accounts.iter().enumerate() {
            if account.login == 0 {
                errors.push(format!("account {} has no login", i + 1));
            } else if !seen.insert(account.login) {
                errors.push(format!("account {} is configured twice", account.login));
            }
            if account.server.trim().is_empty() {
                errors.push(format!("account {} has no server", account.login));
            }
            if let Err(e) = account.credentials() {
                errors.push(format!("account {}: {}", account.login, e));
            }
        }

        let processing = &self.processing;
        if !processing.account_delay_secs.is_finite() || processing.account_delay_secs < 0.0 {
            errors.push("processing.account_delay_secs must be a non-negative number".to_string());
        }
        if !processing.retry_delay_secs.is_finite() || processing.retry_delay_secs < 0.0 {
            errors.push("processing.retry_delay_secs must be a non-negative number".to_string());
        }
        if processing.connect_attempts == 0 {
            errors.push("processing.connect_attempts must be at least 1".to_string());
        }

        if let Err(e) = self.rates.table().validate() {
            errors.push(e.to_string());
        }

        match self.terminal.kind {
            TerminalKind::Bridge if self.terminal.bridge_url.trim().is_empty() => {
                errors.push("terminal.bridge_url is required for the bridge terminal".to_string());
            }
            TerminalKind::Snapshot if self.terminal.snapshot_dir.trim().is_empty() => {
                errors.push("terminal.snapshot_dir is required for the snapshot terminal".to_string());
            }
            _ => {}
        }
        if self.terminal.timeout_ms == 0 {
            errors.push("terminal.timeout_ms must be positive".to_string());
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level {:?} is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        errors
    }

    /// Credentials for every configured account, in order
    pub fn credentials(&self) -> Result<Vec<AccountCredentials>> {
        self.accounts.iter().map(AccountConfig::credentials).collect()
    }
}
