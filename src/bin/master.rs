// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use valorant_bridge_rs::{
    cfg::{config::MasterConfig, logger::init_logger},
    master::{
        api::{self, ApiState},
        cache::AccountCache,
        dispatch::Dispatcher,
        sessions::SessionManager,
        store::AccountStore,
    },
    version,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("info")?;

    info!(version = version::VERSION, "starting master server");

    let cfg = MasterConfig::from_env();
    info!(
        tcp_port = cfg.tcp_port,
        api_port = cfg.api_port,
        "configuration loaded"
    );

    let store = Arc::new(
        AccountStore::open(&cfg.database_path).context("failed to initialize database")?,
    );
    info!(path = %cfg.database_path, "database initialized");

    let cache = AccountCache::new(cfg.cache_ttl);
    info!(ttl = ?cfg.cache_ttl, "cache initialized");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down...");
                cancel.cancel();
            }
        });
    }

    let sessions = SessionManager::new(cancel.clone());
    let tcp_listener = TcpListener::bind(("0.0.0.0", cfg.tcp_port))
        .await
        .context("failed to start TCP server")?;
    info!(port = cfg.tcp_port, "TCP server started");

    {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            if let Err(e) = sessions.serve(tcp_listener).await {
                error!(error = %e, "tcp server error");
            }
        });
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&sessions),
        Arc::clone(&cache),
        store,
    ));

    let api_listener = TcpListener::bind(("0.0.0.0", cfg.api_port))
        .await
        .context("failed to bind API port")?;
    info!(port = cfg.api_port, "starting API server");

    api::serve(
        api_listener,
        ApiState {
            dispatcher,
            sessions,
        },
        cancel,
    )
    .await?;

    cache.shutdown();
    info!("server stopped");
    Ok(())
}
