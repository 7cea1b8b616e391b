//! Core types: terminal records, validated positions/orders, quotes

use crate::error::{CalcError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Direction of a position, or the side a pending order will open on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    BuyStopLimit,
    SellStopLimit,
}

impl OrderKind {
    pub fn side(&self) -> Side {
        match self {
            OrderKind::BuyLimit | OrderKind::BuyStop | OrderKind::BuyStopLimit => Side::Buy,
            OrderKind::SellLimit | OrderKind::SellStop | OrderKind::SellStopLimit => Side::Sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::BuyLimit => "BUY_LIMIT",
            OrderKind::SellLimit => "SELL_LIMIT",
            OrderKind::BuyStop => "BUY_STOP",
            OrderKind::SellStop => "SELL_STOP",
            OrderKind::BuyStopLimit => "BUY_STOP_LIMIT",
            OrderKind::SellStopLimit => "SELL_STOP_LIMIT",
        }
    }

    /// MT5 `ORDER_TYPE_*` numbering
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(OrderKind::BuyLimit),
            3 => Some(OrderKind::SellLimit),
            4 => Some(OrderKind::BuyStop),
            5 => Some(OrderKind::SellStop),
            6 => Some(OrderKind::BuyStopLimit),
            7 => Some(OrderKind::SellStopLimit),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BUY_LIMIT" => Some(OrderKind::BuyLimit),
            "SELL_LIMIT" => Some(OrderKind::SellLimit),
            "BUY_STOP" => Some(OrderKind::BuyStop),
            "SELL_STOP" => Some(OrderKind::SellStop),
            "BUY_STOP_LIMIT" => Some(OrderKind::BuyStopLimit),
            "SELL_STOP_LIMIT" => Some(OrderKind::SellStopLimit),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live bid/ask for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// Buys are marked at the ask, sells at the bid
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

/// Account details reported by the terminal after login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub equity: Decimal,
    #[serde(default = "default_true")]
    pub trade_allowed: bool,
}

fn default_true() -> bool {
    true
}

/// Terminal type field: numeric code or name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawKind {
    Code(i64),
    Name(String),
}

/// Open position as delivered by the terminal, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub ticket: Option<u64>,
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<RawKind>,
    pub volume: Option<Decimal>,
    pub price_open: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub tp: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub magic: Option<i64>,
    pub comment: Option<String>,
    pub time: Option<i64>,
}

/// Pending order as delivered by the terminal, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub ticket: Option<u64>,
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<RawKind>,
    pub volume_initial: Option<Decimal>,
    pub price_open: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub tp: Option<Decimal>,
    pub magic: Option<i64>,
    pub comment: Option<String>,
    pub time_setup: Option<i64>,
    pub time_expiration: Option<i64>,
}

/// Record type delivered in terminal lists
pub trait TerminalRecord {
    /// Record kind used in error messages
    const KIND: &'static str;

    fn magic_or_default(&self) -> i64;
}

impl TerminalRecord for RawPosition {
    const KIND: &'static str = "position";

    fn magic_or_default(&self) -> i64 {
        self.magic.unwrap_or(0)
    }
}

impl TerminalRecord for RawOrder {
    const KIND: &'static str = "order";

    fn magic_or_default(&self) -> i64 {
        self.magic.unwrap_or(0)
    }
}

/// One element of a positions/orders list.
///
/// Elements are parsed one by one, so a record with a wrongly typed field
/// is kept as `Unparsed` and skipped later instead of failing the list.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord<T> {
    Parsed(T),
    Unparsed { value: Value, reason: String },
}

impl<T: TerminalRecord> RawRecord<T> {
    /// Strategy tag, read from the raw JSON when the record did not parse
    pub fn magic_or_default(&self) -> i64 {
        match self {
            RawRecord::Parsed(record) => record.magic_or_default(),
            RawRecord::Unparsed { value, .. } => {
                value.get("magic").and_then(Value::as_i64).unwrap_or(0)
            }
        }
    }

    pub fn into_parsed(self) -> Result<T> {
        match self {
            RawRecord::Parsed(record) => Ok(record),
            RawRecord::Unparsed { value, reason } => Err(CalcError::malformed(
                T::KIND,
                value.get("ticket").and_then(Value::as_u64),
                reason,
            )),
        }
    }
}

impl<T> From<T> for RawRecord<T> {
    fn from(record: T) -> Self {
        RawRecord::Parsed(record)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for RawRecord<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match serde_json::from_value::<T>(value.clone()) {
            Ok(record) => RawRecord::Parsed(record),
            Err(e) => RawRecord::Unparsed {
                value,
                reason: e.to_string(),
            },
        })
    }
}

impl<T: Serialize> Serialize for RawRecord<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RawRecord::Parsed(record) => record.serialize(serializer),
            RawRecord::Unparsed { value, .. } => value.serialize(serializer),
        }
    }
}

/// Validated open position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Broker-reported floating P/L
    pub profit: Decimal,
    pub magic: i64,
    pub comment: String,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Validated pending order
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub ticket: u64,
    pub symbol: String,
    pub kind: OrderKind,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub magic: i64,
    pub comment: String,
    pub setup_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingOrder {
    pub fn side(&self) -> Side {
        self.kind.side()
    }
}

/// Either kind of item the engine evaluates
#[derive(Debug, Clone, PartialEq)]
pub enum TradeItem {
    Position(Position),
    PendingOrder(PendingOrder),
}

impl TradeItem {
    pub fn ticket(&self) -> u64 {
        match self {
            TradeItem::Position(p) => p.ticket,
            TradeItem::PendingOrder(o) => o.ticket,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            TradeItem::Position(p) => &p.symbol,
            TradeItem::PendingOrder(o) => &o.symbol,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            TradeItem::Position(p) => p.side,
            TradeItem::PendingOrder(o) => o.side(),
        }
    }

}

impl TryFrom<RawPosition> for Position {
    type Error = CalcError;

    fn try_from(raw: RawPosition) -> Result<Self> {
        const KIND: &str = RawPosition::KIND;
        let ticket = raw.ticket;
        let missing = |field: &str| CalcError::malformed(KIND, ticket, format!("missing {}", field));

        let ticket_id = ticket.ok_or_else(|| missing("ticket"))?;
        let symbol = non_empty_symbol(raw.symbol).ok_or_else(|| missing("symbol"))?;
        let side = match raw.kind.ok_or_else(|| missing("type"))? {
            RawKind::Code(0) => Side::Buy,
            RawKind::Code(1) => Side::Sell,
            RawKind::Name(name) if name.eq_ignore_ascii_case("BUY") => Side::Buy,
            RawKind::Name(name) if name.eq_ignore_ascii_case("SELL") => Side::Sell,
            other => {
                return Err(CalcError::malformed(
                    KIND,
                    ticket,
                    format!("unsupported position type {:?}", other),
                ))
            }
        };
        let volume = positive(raw.volume).ok_or_else(|| missing("positive volume"))?;
        let price_open = raw.price_open.ok_or_else(|| missing("price_open"))?;
        let profit = raw.profit.ok_or_else(|| missing("profit"))?;

        Ok(Position {
            ticket: ticket_id,
            symbol,
            side,
            volume,
            price_open,
            stop_loss: positive(raw.sl),
            take_profit: positive(raw.tp),
            profit,
            magic: raw.magic.unwrap_or(0),
            comment: raw.comment.unwrap_or_default(),
            opened_at: raw.time.and_then(epoch_to_utc),
        })
    }
}

impl TryFrom<RawOrder> for PendingOrder {
    type Error = CalcError;

    fn try_from(raw: RawOrder) -> Result<Self> {
        const KIND: &str = RawOrder::KIND;
        let ticket = raw.ticket;
        let missing = |field: &str| CalcError::malformed(KIND, ticket, format!("missing {}", field));

        let ticket_id = ticket.ok_or_else(|| missing("ticket"))?;
        let symbol = non_empty_symbol(raw.symbol).ok_or_else(|| missing("symbol"))?;
        let raw_kind = raw.kind.ok_or_else(|| missing("type"))?;
        let kind = match &raw_kind {
            RawKind::Code(code) => OrderKind::from_code(*code),
            RawKind::Name(name) => OrderKind::from_name(name),
        }
        .ok_or_else(|| {
            CalcError::malformed(KIND, ticket, format!("unsupported order type {:?}", raw_kind))
        })?;
        let volume = positive(raw.volume_initial).ok_or_else(|| missing("positive volume_initial"))?;
        let price_open = raw.price_open.ok_or_else(|| missing("price_open"))?;

        Ok(PendingOrder {
            ticket: ticket_id,
            symbol,
            kind,
            volume,
            price_open,
            stop_loss: positive(raw.sl),
            take_profit: positive(raw.tp),
            magic: raw.magic.unwrap_or(0),
            comment: raw.comment.unwrap_or_default(),
            setup_at: raw.time_setup.and_then(epoch_to_utc),
            expires_at: raw.time_expiration.filter(|t| *t > 0).and_then(epoch_to_utc),
        })
    }
}

fn non_empty_symbol(symbol: Option<String>) -> Option<String> {
    symbol
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Terminals report "not set" as 0.0
fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
