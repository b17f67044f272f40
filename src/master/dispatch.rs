// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use tokio::{sync::OnceCell, task, time::timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    master::{
        AccountData,
        cache::AccountCache,
        sessions::{SessionManager, WorkerReply},
        store::AccountStore,
    },
    proto::messages::Envelope,
};

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Shared result of one in-flight resolve; errors travel as strings so late
/// single-flight callers can clone them.
type InflightCell = Arc<OnceCell<Result<AccountData, String>>>;

/// Read-through front of the worker fleet: memory tier, durable tier with a
/// freshness window, then first-fit dispatch to an eligible worker.
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    cache: Arc<AccountCache>,
    store: Arc<AccountStore>,
    resolve_timeout: Duration,
    freshness_window: Duration,
    inflight: DashMap<String, InflightCell>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionManager>,
        cache: Arc<AccountCache>,
        store: Arc<AccountStore>,
    ) -> Self {
        Self {
            sessions,
            cache,
            store,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            inflight: DashMap::new(),
        }
    }

    /// Overrides the 60 s resolve deadline and the 1 h durable freshness
    /// window. Tests use this to run in milliseconds.
    pub fn with_windows(mut self, resolve_timeout: Duration, freshness_window: Duration) -> Self {
        self.resolve_timeout = resolve_timeout;
        self.freshness_window = freshness_window;
        self
    }

    pub async fn resolve_account(&self, name: &str, tag: &str) -> Result<AccountData> {
        let key = AccountCache::make_key(name, tag);

        if let Some(data) = self.cache.get(&key) {
            debug!(name, tag, "cache hit (memory)");
            return Ok(data);
        }

        // Single-flight: concurrent misses for the same key share one
        // dispatch; late callers clone the settled result.
        let cell = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| self.resolve_uncached(name, tag, &key))
            .await
            .clone();

        self.inflight.remove_if(&key, |_, c| Arc::ptr_eq(c, &cell));

        result.map_err(|e| anyhow!(e))
    }

    async fn resolve_uncached(
        &self,
        name: &str,
        tag: &str,
        key: &str,
    ) -> Result<AccountData, String> {
        if let Some(data) = self.durable_lookup(name, tag).await {
            debug!(name, tag, "cache hit (database)");
            self.cache.insert(key.to_string(), data.clone());
            return Ok(data);
        }

        debug!(name, tag, "cache miss, resolving via client");

        let reply = self
            .dispatch_to_worker(name, tag)
            .await
            .map_err(|e| format!("failed to resolve account: {e:#}"))?;

        let resp = match reply {
            WorkerReply::Account(resp) => resp,
            WorkerReply::Error(err) => {
                error!(error = %err.message, code = %err.code, "client returned error");
                return Err(err.message);
            },
        };

        let data = AccountData {
            puuid: resp.puuid,
            region: resp.region,
            account_level: resp.account_level,
            name: name.to_string(),
            tag: tag.to_string(),
            card: resp.card,
            title: resp.title,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        self.cache.insert(key.to_string(), data.clone());
        self.persist(data.clone());

        info!(puuid = %data.puuid, "account resolved");
        Ok(data)
    }

    /// Durable-tier lookup. A row counts only while `now - updated_at` is
    /// inside the freshness window; read failures degrade to a miss. The
    /// returned `updated_at` is the stored one: it reports data freshness,
    /// not serve time.
    async fn durable_lookup(&self, name: &str, tag: &str) -> Option<AccountData> {
        let store = Arc::clone(&self.store);
        let (name_owned, tag_owned) = (name.to_string(), tag.to_string());

        let row = match task::spawn_blocking(move || store.get(&name_owned, &tag_owned)).await {
            Ok(Ok(row)) => row?,
            Ok(Err(e)) => {
                warn!(error = %e, "database read failed, treating as miss");
                return None;
            },
            Err(e) => {
                warn!(error = %e, "database read task failed, treating as miss");
                return None;
            },
        };

        let updated_at = match DateTime::parse_from_rfc3339(&row.updated_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!(error = %e, name, tag, "unparsable updated_at in database, treating as miss");
                return None;
            },
        };

        let age = Utc::now().signed_duration_since(updated_at);
        let window = chrono::Duration::from_std(self.freshness_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        if age < window { Some(row) } else { None }
    }

    async fn dispatch_to_worker(&self, name: &str, tag: &str) -> Result<WorkerReply> {
        let session = self.sessions.select_worker().context("no available clients")?;

        let request_id = Uuid::new_v4().to_string();
        let rx = session.try_register_pending(request_id.clone())?;

        let env = Envelope::resolve_request(request_id.clone(), name, tag);
        if let Err(e) = session.send(&env).await {
            session.abandon_pending(&request_id);
            return Err(anyhow!(e).context("failed to send request to client"));
        }
        info!(client_id = %session.id, name, tag, "request sent to client");

        match timeout(self.resolve_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => bail!("client disconnected before responding"),
            Err(_) => {
                // Abandon the slot; a reply showing up later is dropped with
                // a warning by the session reader.
                session.abandon_pending(&request_id);
                bail!("request timed out")
            },
        }
    }

    /// Fire-and-forget upsert into the durable tier.
    fn persist(&self, data: AccountData) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = task::spawn_blocking(move || store.upsert(&data)).await;
            match result {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!(error = %e, "failed to store account in database"),
                Err(e) => warn!(error = %e, "database write task failed"),
            }
        });
    }
}
