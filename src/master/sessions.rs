// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use dashmap::DashMap;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::{Mutex, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    proto::{
        framing::{FrameError, read_envelope, write_envelope},
        messages::{ClientRegister, Envelope, ErrorResponse, Payload, ResolveAccountResponse},
    },
    version,
};

/// How stale a heartbeat may be before the worker stops being selectable.
/// Two missed 10 s beats are forgiven; the third excludes the worker.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(30);

/// What a worker wrote back for one request id.
#[derive(Debug)]
pub enum WorkerReply {
    Account(ResolveAccountResponse),
    Error(ErrorResponse),
}

/// One connected client node.
///
/// Mutated only by its dedicated reader task and by atomic field updates;
/// the write half is serialized behind its own lock so frames never
/// interleave.
pub struct WorkerSession {
    pub id: String,
    pub version: String,
    lcu_available: AtomicBool,
    /// Monotonic base for `last_heartbeat_ms`.
    epoch: Instant,
    last_heartbeat_ms: AtomicU64,
    writer: Mutex<OwnedWriteHalf>,
    /// In-flight requests awaiting a reply, keyed by envelope id.
    pending: DashMap<String, oneshot::Sender<WorkerReply>>,
    closed: CancellationToken,
}

impl WorkerSession {
    fn new(id: String, version: String, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            id,
            version,
            lcu_available: AtomicBool::new(false),
            epoch: Instant::now(),
            last_heartbeat_ms: AtomicU64::new(0),
            writer: Mutex::new(writer),
            pending: DashMap::new(),
            closed: CancellationToken::new(),
        })
    }

    fn touch_heartbeat(&self, lcu_available: bool) {
        self.last_heartbeat_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.lcu_available.store(lcu_available, Ordering::Relaxed);
    }

    fn heartbeat_age(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_heartbeat_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last_ms))
    }

    pub fn is_eligible(&self, liveness_window: Duration) -> bool {
        self.lcu_available.load(Ordering::Relaxed) && self.heartbeat_age() < liveness_window
    }

    /// Whether the session has no request in flight. Selection only hands
    /// one request at a time to a worker.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Claims the single in-flight slot for `request_id`.
    pub fn try_register_pending(
        &self,
        request_id: String,
    ) -> Result<oneshot::Receiver<WorkerReply>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        if self.pending.len() > 1 {
            self.pending.remove(&request_id);
            bail!("client {} already has a request in flight", self.id);
        }
        Ok(rx)
    }

    /// Forgets an in-flight request (deadline expiry). A reply arriving
    /// later finds nothing and is dropped with a warning.
    pub fn abandon_pending(&self, request_id: &str) {
        self.pending.remove(request_id);
    }

    fn take_pending(&self, request_id: &str) -> Option<oneshot::Sender<WorkerReply>> {
        self.pending.remove(request_id).map(|(_, tx)| tx)
    }

    /// Drops every pending rendezvous; waiting dispatcher calls observe the
    /// closed channel.
    fn drop_pending(&self) {
        self.pending.clear();
    }

    pub async fn send(&self, env: &Envelope) -> Result<(), FrameError> {
        let mut w = self.writer.lock().await;
        write_envelope(&mut *w, env).await
    }

    /// Asks the session's reader to tear the connection down.
    fn close(&self) {
        self.closed.cancel();
    }

    async fn shutdown_transport(&self) {
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
    }
}

/// Accepts client-node connections and owns the session table.
pub struct SessionManager {
    sessions: DashMap<String, Arc<WorkerSession>>,
    liveness_window: Duration,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(cancel: CancellationToken) -> Arc<Self> {
        Self::with_liveness_window(LIVENESS_WINDOW, cancel)
    }

    pub fn with_liveness_window(liveness_window: Duration, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            liveness_window,
            cancel,
        })
    }

    /// Accept loop; one reader task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let stream = select! {
                _ = self.cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "new client connection");
                        stream
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    },
                },
            };

            let manager = Arc::clone(&self);
            tokio::spawn(manager.handle_connection(stream));
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set nodelay");
        }

        let (mut read_half, write_half) = stream.into_split();
        let mut write_half = Some(write_half);
        let mut session: Option<Arc<WorkerSession>> = None;

        loop {
            let frame = select! {
                _ = self.cancel.cancelled() => break,
                _ = async {
                    match &session {
                        Some(s) => s.closed.cancelled().await,
                        None => std::future::pending::<()>().await,
                    }
                } => break,
                frame = read_envelope(&mut read_half) => frame,
            };

            let env = match frame {
                Ok(env) => env,
                Err(e) if e.is_protocol_violation() => {
                    warn!(error = %e, "framing violation, closing connection");
                    break;
                },
                Err(e) => {
                    debug!(error = %e, "client read ended");
                    break;
                },
            };

            match env.payload {
                Some(Payload::ClientRegister(reg)) => {
                    self.register(&mut session, &mut write_half, reg);
                },
                Some(Payload::ClientHeartbeat(hb)) => {
                    // Ignored until the connection has registered.
                    if let Some(s) = &session {
                        s.touch_heartbeat(hb.lcu_available);
                        debug!(client_id = %s.id, lcu_available = hb.lcu_available, "heartbeat received");
                    }
                },
                Some(Payload::ResolveAccountResponse(resp)) => {
                    self.deliver(session.as_ref(), &env.id, WorkerReply::Account(resp));
                },
                Some(Payload::ErrorResponse(err)) => {
                    self.deliver(session.as_ref(), &env.id, WorkerReply::Error(err));
                },
                Some(Payload::ResolveAccountRequest(_)) | None => {
                    warn!(id = %env.id, "unexpected message from client");
                },
            }
        }

        if let Some(s) = session {
            // Conditional removal: if a registration collision already
            // replaced this session, the replacement's entry must survive.
            self.sessions.remove_if(&s.id, |_, cur| Arc::ptr_eq(cur, &s));
            s.drop_pending();
            s.shutdown_transport().await;
            info!(client_id = %s.id, "client disconnected");
        }
    }

    fn register(
        &self,
        session: &mut Option<Arc<WorkerSession>>,
        write_half: &mut Option<OwnedWriteHalf>,
        reg: ClientRegister,
    ) {
        let Some(writer) = write_half.take() else {
            warn!(client_id = %reg.client_id, "repeated registration on one connection ignored");
            return;
        };

        if !version::is_compatible(&reg.version) {
            warn!(
                client_id = %reg.client_id,
                version = %reg.version,
                "client version not in compatibility list"
            );
        }
        info!(client_id = %reg.client_id, version = %reg.version, "client registered");

        let new = WorkerSession::new(reg.client_id.clone(), reg.version, writer);
        if let Some(prev) = self.sessions.insert(reg.client_id, Arc::clone(&new)) {
            // Last writer wins; the superseded transport is closed, not leaked.
            warn!(client_id = %prev.id, "registration collision, evicting previous session");
            prev.close();
        }

        *session = Some(new);
    }

    fn deliver(&self, session: Option<&Arc<WorkerSession>>, request_id: &str, reply: WorkerReply) {
        let Some(s) = session else {
            warn!(request_id, "response from unregistered connection");
            return;
        };

        match s.take_pending(request_id) {
            Some(tx) => {
                // A dropped receiver means the dispatcher gave up already.
                if tx.send(reply).is_err() {
                    warn!(client_id = %s.id, request_id, "late response dropped");
                }
            },
            None => {
                warn!(client_id = %s.id, request_id, "response with no pending request");
            },
        }
    }

    /// First-fit scan over eligible, idle workers. No ordering guarantees.
    pub fn select_worker(&self) -> Option<Arc<WorkerSession>> {
        self.sessions
            .iter()
            .find(|entry| entry.value().is_eligible(self.liveness_window) && entry.value().is_idle())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }
}
