// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::master::AccountData;

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct CacheEntry {
    value: AccountData,
    expires_at: Instant,
}

/// TTL-indexed in-memory account cache.
///
/// Readers treat an expired entry as absent; a background sweep removes
/// expired entries once a minute. The sweeper holds only a weak reference,
/// so dropping the cache (or calling [`AccountCache::shutdown`]) stops it.
pub struct AccountCache {
    items: DashMap<String, CacheEntry>,
    ttl: Duration,
    sweeper_cancel: CancellationToken,
}

impl AccountCache {
    pub fn new(ttl: Duration) -> Arc<Self> {
        let cache = Arc::new(Self {
            items: DashMap::new(),
            ttl,
            sweeper_cancel: CancellationToken::new(),
        });

        tokio::spawn(sweep_loop(
            Arc::downgrade(&cache),
            cache.sweeper_cancel.clone(),
        ));

        cache
    }

    pub fn make_key(name: &str, tag: &str) -> String {
        format!("{name}#{tag}")
    }

    pub fn insert(&self, key: String, value: AccountData) {
        self.items.insert(key, CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub fn get(&self, key: &str) -> Option<AccountData> {
        let entry = self.items.get(key)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn remove(&self, key: &str) {
        self.items.remove(key);
    }

    /// Number of stored entries, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn shutdown(&self) {
        self.sweeper_cancel.cancel();
    }

    fn sweep(&self) {
        let now = Instant::now();
        let before = self.items.len();
        self.items.retain(|_, entry| now < entry.expires_at);
        let removed = before.saturating_sub(self.items.len());
        if removed > 0 {
            debug!(removed, "cache sweep");
        }
    }
}

impl Drop for AccountCache {
    fn drop(&mut self) {
        self.sweeper_cancel.cancel();
    }
}

async fn sweep_loop(cache: Weak<AccountCache>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_PERIOD);
    ticker.tick().await;

    loop {
        select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {},
        }

        let Some(cache) = cache.upgrade() else { return };
        cache.sweep();
    }
}
