//! Time-boxed snapshot cache for positions and orders
//!
//! Bounds how often the terminal is asked for its books. The caller owns
//! the cache and supplies the current time, so ageing is deterministic.
//! Switching accounts invalidates everything: call [`SnapshotCache::clear`]
//! at every account boundary.


use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::terminal::TradingTerminal;
use crate::types::{RawOrder, RawPosition, RawRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::debug;

pub const DEFAULT_TTL_SECS: i64 = 30;

/// How long each list stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub position_ttl: Duration,
    pub order_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            position_ttl: Duration::seconds(DEFAULT_TTL_SECS),
            order_ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }
}

/// Allow-list of strategy tags (magic numbers)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagicFilter {
    allowed: Option<BTreeSet<i64>>,
}

impl MagicFilter {
    /// Keeps everything
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }

    /// Keeps only records tagged with one of `numbers`
    pub fn only(numbers: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allowed: Some(numbers.into_iter().collect()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.allowed.is_some()
    }

    pub fn allows(&self, magic: i64) -> bool {
        match &self.allowed {
            Some(set) => set.contains(&magic),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    fetched_at: DateTime<Utc>,
    items: Vec<T>,
}

impl<T: Clone> Slot<T> {
    fn fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    policy: CachePolicy,
    filter: MagicFilter,
    positions: Option<Slot<RawRecord<RawPosition>>>,
    orders: Option<Slot<RawRecord<RawOrder>>>,
}

impl SnapshotCache {
    pub fn new(policy: CachePolicy, filter: MagicFilter) -> Self {
        Self {
            policy,
            filter,
            positions: None,
            orders: None,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn filter(&self) -> &MagicFilter {
        &self.filter
    }

    /// Open positions, from cache while younger than `position_ttl`.
    /// A terminal fetch goes through `retry`.
    pub async fn positions(
        &mut self,
        terminal: &dyn TradingTerminal,
        retry: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<RawRecord<RawPosition>>> {
        if let Some(slot) = &self.positions {
            if slot.fresh(self.policy.position_ttl, now) {
                debug!("Using cached positions ({} items)", slot.items.len());
                return Ok(slot.items.clone());
            }
        }

        // On error the previous slot is left as it was
        let fetched = retry.run("Fetch positions", move |_| terminal.positions()).await?;
        let total = fetched.len();
        let items: Vec<RawRecord<RawPosition>> = fetched
            .into_iter()
            .filter(|p| self.filter.allows(p.magic_or_default()))
            .collect();
        debug!("Fetched {} positions, {} after magic filter", total, items.len());

        self.positions = Some(Slot {
            fetched_at: now,
            items: items.clone(),
        });
        Ok(items)
    }

    /// Pending orders, from cache while younger than `order_ttl`
    pub async fn orders(
        &mut self,
        terminal: &dyn TradingTerminal,
        retry: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<RawRecord<RawOrder>>> {
        if let Some(slot) = &self.orders {
            if slot.fresh(self.policy.order_ttl, now) {
                debug!("Using cached orders ({} items)", slot.items.len());
                return Ok(slot.items.clone());
            }
        }

        let fetched = retry.run("Fetch orders", move |_| terminal.orders()).await?;
        let total = fetched.len();
        let items: Vec<RawRecord<RawOrder>> = fetched
            .into_iter()
            .filter(|o| self.filter.allows(o.magic_or_default()))
            .collect();
        debug!("Fetched {} orders, {} after magic filter", total, items.len());

        self.orders = Some(Slot {
            fetched_at: now,
            items: items.clone(),
        });
        Ok(items)
    }

    /// Drop both lists; the next fetch always reaches the terminal
    pub fn clear(&mut self) {
        self.positions = None;
        self.orders = None;
        debug!("Snapshot cache cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_none() && self.orders.is_none()
    }
}
