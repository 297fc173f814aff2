//! # engine::dedup
//!
//! **Dedup Guard**: a charting platform that re-fires the same alert within
//! the cooldown window must not open a second position.
//!
//! ## Key
//! * `side` mode:       `"GBP_JPY:buy"`
//! * `side_price` mode: `"GBP_JPY:buy:150.02"` (price rounded to `price_dp`)
//!
//! ## Memory bound
//! Keys are never persisted. Entries older than `evict_factor × cooldown` are
//! swept on the call path, at most once per cooldown, so the map stays bounded
//! by the number of distinct keys seen in that horizon.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::Signal;

// ─── Store ────────────────────────────────────────────────────────────────────

/// Time-keyed admission store. `should_process` must be atomic per key.
pub trait DedupStore: Send + Sync {
    /// Returns `true` and records `now` when `key` is outside its cooldown;
    /// returns `false` without touching state otherwise.
    fn should_process(&self, key: &str, now: DateTime<Utc>, cooldown: Duration) -> bool;

    /// Number of keys currently tracked.
    fn len(&self) -> usize;
}

#[derive(Debug, Default)]
struct TtlInner {
    last_seen: HashMap<String, DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
}

/// In-memory TTL map guarded by a single mutex.
#[derive(Debug)]
pub struct TtlDedupStore {
    inner: Mutex<TtlInner>,
    evict_factor: i32,
}

impl TtlDedupStore {
    pub fn new(evict_factor: u32) -> Self {
        Self {
            inner: Mutex::new(TtlInner::default()),
            evict_factor: i32::try_from(evict_factor.max(1)).unwrap_or(i32::MAX),
        }
    }

    fn sweep(&self, inner: &mut TtlInner, now: DateTime<Utc>, cooldown: Duration) {
        let due = inner
            .last_sweep
            .map(|at| now - at >= cooldown)
            .unwrap_or(true);
        if !due {
            return;
        }

        let horizon = cooldown.checked_mul(self.evict_factor).unwrap_or(Duration::MAX);
        let before = inner.last_seen.len();
        inner.last_seen.retain(|_, seen| now - *seen < horizon);
        inner.last_sweep = Some(now);

        let evicted = before - inner.last_seen.len();
        if evicted > 0 {
            debug!(evicted, remaining = inner.last_seen.len(), "Dedup: stale keys evicted");
        }
    }
}

impl DedupStore for TtlDedupStore {
    fn should_process(&self, key: &str, now: DateTime<Utc>, cooldown: Duration) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        self.sweep(&mut inner, now, cooldown);

        if let Some(seen) = inner.last_seen.get(key) {
            if now - *seen < cooldown {
                return false;
            }
        }

        inner.last_seen.insert(key.to_string(), now);
        true
    }

    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_seen
            .len()
    }
}

// ─── Key Mode ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupKeyMode {
    /// `(instrument, side)`
    #[default]
    Side,
    /// `(instrument, side, rounded price)`
    SidePrice,
}

impl FromStr for DedupKeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "side" => Ok(Self::Side),
            "side_price" | "side-price" => Ok(Self::SidePrice),
            other => Err(format!("expected 'side' or 'side_price', got '{other}'")),
        }
    }
}

// ─── Guard ────────────────────────────────────────────────────────────────────

pub struct DedupGuard {
    store: Arc<dyn DedupStore>,
    cooldown: Duration,
    key_mode: DedupKeyMode,
    price_dp: u32,
}

impl DedupGuard {
    pub fn new(
        store: Arc<dyn DedupStore>,
        cooldown: std::time::Duration,
        key_mode: DedupKeyMode,
        price_dp: u32,
    ) -> Self {
        Self {
            store,
            cooldown: Duration::from_std(cooldown).unwrap_or(Duration::MAX),
            key_mode,
            price_dp,
        }
    }

    pub fn key_for(&self, signal: &Signal) -> String {
        match self.key_mode {
            DedupKeyMode::Side => format!("{}:{}", signal.instrument, signal.side),
            DedupKeyMode::SidePrice => format!(
                "{}:{}:{}",
                signal.instrument,
                signal.side,
                signal.price.round_dp(self.price_dp).normalize()
            ),
        }
    }

    /// `true` when the signal is fresh and should be executed.
    pub fn admit(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        let key = self.key_for(signal);
        let fresh = self.store.should_process(&key, now, self.cooldown);
        if !fresh {
            debug!(key = %key, "Dedup: duplicate inside cooldown");
        }
        fresh
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}
