// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use valorant_bridge_rs::{
    cfg::{config::ClientConfig, logger::init_logger},
    version,
    worker::{
        agent::SessionAgent,
        lcu::LcuClient,
        lockfile::Lockfile,
        resolver::Resolver,
        shard::ShardClient,
    },
};

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ClientConfig::load()?;
    let _logger_guard = init_logger(&cfg.log_level)?;

    info!(version = version::VERSION, "starting client node");
    info!(
        client_id = %cfg.client_id,
        master_address = %cfg.master_address,
        "configuration loaded"
    );

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

    // The local agent has to be up before the driver can be built.
    let lockfile = loop {
        match Lockfile::read() {
            Ok(lockfile) => break lockfile,
            Err(e) => {
                warn!(error = %e, "waiting for riot client");
            },
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = sleep(RETRY_DELAY) => {},
        }
    };
    info!(port = %lockfile.port, "riot client detected");

    let resolver = Arc::new(Resolver::new(LcuClient::new(&lockfile)?, ShardClient::new()?));
    let agent = SessionAgent::new(
        cfg.master_address,
        cfg.client_id,
        resolver,
        cancel.clone(),
    );

    // One session per iteration; flat 5 s backoff between attempts.
    loop {
        if let Err(e) = agent.run_once().await {
            error!(error = format!("{e:#}"), "connection to master failed, retrying");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(RETRY_DELAY) => {},
        }
    }

    info!("client stopped");
    Ok(())
}
