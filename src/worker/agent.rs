// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::{Mutex, mpsc},
    time::{Instant, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    proto::{
        framing::{FrameError, read_envelope, write_envelope},
        messages::{Envelope, Payload, ResolveAccountRequest, ResolveAccountResponse},
    },
    version,
    worker::{lockfile, resolver::Resolver},
};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// Error code reported to the master when a resolve fails on this node.
const CODE_RESOLVE_FAILED: &str = "RESOLVE_FAILED";

/// Maintains one TCP session with the master: registers, paces heartbeats,
/// ingests dispatch requests and writes back resolver results. One call to
/// [`SessionAgent::run_once`] covers one connection lifetime; the caller owns
/// the reconnect policy.
pub struct SessionAgent {
    master_address: String,
    client_id: String,
    resolver: Arc<Resolver>,
    cancel: CancellationToken,
}

impl SessionAgent {
    pub fn new(
        master_address: String,
        client_id: String,
        resolver: Arc<Resolver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            master_address,
            client_id,
            resolver,
            cancel,
        }
    }

    pub async fn run_once(&self) -> Result<()> {
        let stream = TcpStream::connect(&self.master_address)
            .await
            .context("failed to connect to master")?;
        stream.set_nodelay(true)?;
        info!(address = %self.master_address, "connected to master");

        let (mut read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));

        {
            let mut w = writer.lock().await;
            write_envelope(&mut *w, &Envelope::register(&self.client_id, version::VERSION))
                .await
                .context("failed to send registration")?;
        }
        info!(client_id = %self.client_id, "registration sent");

        // Initial heartbeat from a fresh probe, so the master can select this
        // node before the first pacer tick.
        let lcu_available = lockfile::probe();
        {
            let mut w = writer.lock().await;
            match write_envelope(&mut *w, &Envelope::heartbeat(lcu_available)).await {
                Ok(()) => info!(lcu_available, "initial heartbeat sent"),
                Err(e) => warn!(error = %e, "failed to send initial heartbeat"),
            }
        }

        // Dedicated reader task; resolves run on their own tasks so a slow
        // side-effect sequence never blocks frame ingestion.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Result<Envelope, FrameError>>(16);
        let reader = tokio::spawn(async move {
            loop {
                let frame = read_envelope(&mut read_half).await;
                let failed = frame.is_err();
                if frame_tx.send(frame).await.is_err() || failed {
                    return;
                }
            }
        });

        let mut ticker = interval_at(Instant::now() + HEARTBEAT_PERIOD, HEARTBEAT_PERIOD);

        let result = loop {
            select! {
                _ = self.cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    let lcu_available = lockfile::probe();
                    let mut w = writer.lock().await;
                    if let Err(e) = write_envelope(&mut *w, &Envelope::heartbeat(lcu_available)).await {
                        // The reader will surface a hard transport failure.
                        error!(error = %e, "failed to send heartbeat");
                    }
                },
                frame = frame_rx.recv() => match frame {
                    Some(Ok(env)) => self.handle_envelope(env, &writer),
                    Some(Err(e)) => break Err(anyhow!(e).context("connection error")),
                    None => break Err(anyhow!("connection closed")),
                },
            }
        };

        // Unblock the read and half-close so the master evicts us promptly.
        reader.abort();
        let mut w = writer.lock().await;
        let _ = w.shutdown().await;

        result
    }

    fn handle_envelope(&self, env: Envelope, writer: &Arc<Mutex<OwnedWriteHalf>>) {
        match env.payload {
            Some(Payload::ResolveAccountRequest(req)) => {
                info!(name = %req.game_name, tag = %req.game_tag, "received resolve request");
                self.spawn_resolve(env.id, req, Arc::clone(writer));
            },
            _ => warn!(id = %env.id, "unexpected message from master"),
        }
    }

    fn spawn_resolve(
        &self,
        request_id: String,
        req: ResolveAccountRequest,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) {
        let resolver = Arc::clone(&self.resolver);

        tokio::spawn(async move {
            // Responses carry the request's envelope id; that is the whole
            // correlation story, so parallel resolves are fine.
            let response = match resolver.resolve(&req.game_name, &req.game_tag).await {
                Ok(account) => Envelope::resolve_response(request_id, ResolveAccountResponse {
                    puuid: account.puuid,
                    region: account.region,
                    account_level: account.account_level,
                    card: account.card,
                    title: account.title,
                }),
                Err(e) => {
                    error!(error = format!("{e:#}"), "failed to resolve account");
                    Envelope::error(request_id, CODE_RESOLVE_FAILED, format!("{e:#}"))
                },
            };

            let mut w = writer.lock().await;
            if let Err(e) = write_envelope(&mut *w, &response).await {
                error!(error = %e, "failed to send response");
            }
        });
    }
}
