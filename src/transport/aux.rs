//! # Aux Engine Link
//!
//! Relays forwarded commands to a second engine instance over its own Unix
//! socket and hands the reply back to the waiting connection.
//!
//! ## Correlation
//! Every outgoing request is re-tagged with a link-local correlation id so
//! that two clients using the same `sequence_id` cannot collide on the shared
//! channel. The original id is restored on the reply.
//!
//! ## Concurrency
//! At most `max_in_flight` correlation ids are outstanding. A forward that
//! finds every slot taken waits for one, and that wait is charged against its
//! own timeout. The correlation table sits behind a short mutex that is never
//! held across an await, so a slow reply only blocks its own caller.
//!
//! ## Failure
//! - no reply before the deadline: `AuxTimeout`, the correlation id is
//!   discarded and a late reply is dropped
//! - link down or write failure: `AuxUnreachable` for every waiter
//! - nothing is retried; a background supervisor re-establishes the socket

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::ClientCodec;
use crate::core::frame::{Request, Response, MAX_PAYLOAD_SIZE};
use crate::core::status::StatusCode;
use crate::error::constants::ERR_AUX_LINK_DOWN;
use crate::error::Result;
use crate::utils::timeout::{self, until_deadline, with_timeout};

/// Anything that can carry a forwarded request to the aux engine.
#[async_trait]
pub trait AuxForwarder: Send + Sync {
    /// Always answers; failures come back as `AuxTimeout` / `AuxUnreachable`
    /// responses carrying the request's `sequence_id`.
    async fn forward(&self, request: Request, timeout: Duration) -> Response;
}

#[derive(Debug, Clone)]
pub struct AuxLinkConfig {
    pub socket_path: PathBuf,
    pub max_in_flight: usize,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub max_payload: usize,
}

impl AuxLinkConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_in_flight: 4,
            reconnect_delay: timeout::AUX_RECONNECT_DELAY,
            connect_timeout: timeout::AUX_CONNECT_TIMEOUT,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.max(1);
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

struct Pending {
    /// Distinguishes reuses of the same wire tag.
    ticket: u64,
    reply: oneshot::Sender<Response>,
}

#[derive(Default)]
struct LinkState {
    session: u64,
    outbound: Option<mpsc::Sender<Request>>,
    pending: HashMap<u32, Pending>,
}

struct Shared {
    config: AuxLinkConfig,
    state: Mutex<LinkState>,
    slots: Semaphore,
    next_ticket: AtomicU64,
    next_session: AtomicU64,
    shutdown: CancellationToken,
}

/// One connected socket.
struct Session {
    id: u64,
    reader: FramedRead<OwnedReadHalf, ClientCodec>,
    token: CancellationToken,
}

/// Shared handle to the aux engine. Cheap to clone.
#[derive(Clone)]
pub struct AuxLink {
    shared: Arc<Shared>,
}

impl AuxLink {
    /// Attempt the first connection, then keep the link up in the background.
    ///
    /// An unreachable peer is not an error here: forwards answer
    /// `AuxUnreachable` until the supervisor gets through.
    #[instrument(skip(config), fields(socket_path = %config.socket_path.display()))]
    pub async fn connect(config: AuxLinkConfig) -> Self {
        let shared = Arc::new(Shared {
            slots: Semaphore::new(config.max_in_flight.max(1)),
            config,
            state: Mutex::new(LinkState::default()),
            next_ticket: AtomicU64::new(1),
            next_session: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        let first = match Shared::establish(&shared).await {
            Ok(session) => {
                info!("Aux link established");
                Some(session)
            }
            Err(e) => {
                warn!(error = %e, "Aux engine not reachable yet, will retry in background");
                None
            }
        };
        tokio::spawn(Shared::supervise(shared.clone(), first));

        Self { shared }
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.outbound.is_some())
            .unwrap_or(false)
    }

    /// Correlation ids currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.pending.len())
            .unwrap_or(0)
    }

    /// Poll until the link is up or `limit` passes.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.is_connected() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.is_connected()
    }

    /// Stop the supervisor and fail everything still waiting.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.slots.close();
        let session = self
            .shared
            .state
            .lock()
            .map(|state| state.session)
            .unwrap_or(0);
        self.shared.fail_session(session);
        info!("Aux link shut down");
    }

    #[instrument(
        level = "debug",
        skip(self, request),
        fields(command_id = request.command_id, sequence_id = request.sequence_id)
    )]
    pub async fn forward_request(&self, request: Request, timeout: Duration) -> Response {
        let sequence_id = request.sequence_id;
        let deadline = Instant::now() + timeout;
        match self.shared.round_trip(request, deadline).await {
            Ok(response) => response.with_sequence_id(sequence_id),
            Err(status) => {
                debug!(%status, "Forward failed");
                Response::from_status(sequence_id, status)
            }
        }
    }
}

#[async_trait]
impl AuxForwarder for AuxLink {
    async fn forward(&self, request: Request, timeout: Duration) -> Response {
        self.forward_request(request, timeout).await
    }
}

/// Removes its correlation entry on drop unless a reply already claimed it.
struct PendingSlot<'a> {
    shared: &'a Shared,
    tag: u32,
    ticket: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            let ours = state
                .pending
                .get(&self.tag)
                .is_some_and(|pending| pending.ticket == self.ticket);
            if ours {
                state.pending.remove(&self.tag);
                debug!(tag = self.tag, "Discarded aux correlation id");
            }
        }
    }
}

impl Shared {
    async fn round_trip(
        &self,
        request: Request,
        deadline: Instant,
    ) -> std::result::Result<Response, StatusCode> {
        if request.payload.len() > self.config.max_payload {
            return Err(StatusCode::InternalError);
        }

        let _permit = match until_deadline(deadline, self.slots.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(StatusCode::AuxUnreachable),
            Err(_) => return Err(StatusCode::AuxTimeout),
        };

        let (slot, outbound, reply) = self.register()?;
        let tagged = Request {
            sequence_id: slot.tag,
            ..request
        };

        match until_deadline(deadline, outbound.send(tagged)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(StatusCode::AuxUnreachable),
            Err(_) => return Err(StatusCode::AuxTimeout),
        }

        match until_deadline(deadline, reply).await {
            Ok(Ok(response)) => Ok(response),
            // the session dropped our sender
            Ok(Err(_)) => Err(StatusCode::AuxUnreachable),
            Err(_) => Err(StatusCode::AuxTimeout),
        }
    }

    fn register(
        &self,
    ) -> std::result::Result<
        (PendingSlot<'_>, mpsc::Sender<Request>, oneshot::Receiver<Response>),
        StatusCode,
    > {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StatusCode::InternalError)?;
        let outbound = state.outbound.clone().ok_or_else(|| {
            debug!("{ERR_AUX_LINK_DOWN}");
            StatusCode::AuxUnreachable
        })?;

        // the wire tag is the low 32 bits of the ticket
        let (tag, ticket) = loop {
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            let tag = ticket as u32;
            if !state.pending.contains_key(&tag) {
                break (tag, ticket);
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        state.pending.insert(
            tag,
            Pending {
                ticket,
                reply: reply_tx,
            },
        );
        Ok((
            PendingSlot {
                shared: self,
                tag,
                ticket,
            },
            outbound,
            reply_rx,
        ))
    }

    fn deliver(&self, response: Response) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match state.pending.remove(&response.sequence_id()) {
            Some(pending) => {
                // the waiter may have given up in the meantime
                let _ = pending.reply.send(response);
            }
            None => debug!(
                tag = response.sequence_id(),
                "Dropping aux reply for unknown correlation id"
            ),
        }
    }

    /// Tear down `session` if it is still the live one.
    fn fail_session(&self, session: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.session != session {
            return;
        }
        let had_link = state.outbound.take().is_some();
        let stranded = state.pending.len();
        // dropping the reply senders wakes every waiter with AuxUnreachable
        state.pending.clear();
        if had_link {
            warn!(stranded, "Aux link down");
        }
    }

    async fn establish(shared: &Arc<Shared>) -> Result<Session> {
        let stream = with_timeout(
            shared.config.connect_timeout,
            UnixStream::connect(&shared.config.socket_path),
        )
        .await??;
        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, ClientCodec::new(shared.config.max_payload));
        let writer = FramedWrite::new(write_half, ClientCodec::new(shared.config.max_payload));
        let (outbound_tx, outbound_rx) = mpsc::channel(shared.config.max_in_flight.max(1));

        let id = shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let token = shared.shutdown.child_token();
        {
            let mut state = shared
                .state
                .lock()
                .map_err(|_| crate::error::EngineError::TransportError("aux link state poisoned".into()))?;
            state.session = id;
            state.outbound = Some(outbound_tx);
        }

        tokio::spawn(Shared::write_loop(
            shared.clone(),
            id,
            writer,
            outbound_rx,
            token.clone(),
        ));

        Ok(Session { id, reader, token })
    }

    async fn write_loop(
        shared: Arc<Shared>,
        session: u64,
        mut writer: FramedWrite<OwnedWriteHalf, ClientCodec>,
        mut outbound: mpsc::Receiver<Request>,
        token: CancellationToken,
    ) {
        loop {
            let request = tokio::select! {
                _ = token.cancelled() => break,
                next = outbound.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };
            if let Err(e) = writer.send(request).await {
                warn!(error = %e, "Aux link write failed");
                shared.fail_session(session);
                token.cancel();
                break;
            }
        }
    }

    async fn read_loop(&self, session: &mut Session) {
        loop {
            let frame = tokio::select! {
                _ = session.token.cancelled() => break,
                frame = session.reader.next() => frame,
            };
            match frame {
                Some(Ok(response)) => self.deliver(response),
                Some(Err(e)) => {
                    warn!(error = %e, "Aux link framing error");
                    break;
                }
                None => {
                    info!("Aux engine closed the link");
                    break;
                }
            }
        }
    }

    async fn supervise(shared: Arc<Shared>, mut session: Option<Session>) {
        loop {
            if let Some(mut live) = session.take() {
                shared.read_loop(&mut live).await;
                live.token.cancel();
                shared.fail_session(live.id);
            }

            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
            }

            match Shared::establish(&shared).await {
                Ok(live) => {
                    info!(session = live.id, "Aux link re-established");
                    session = Some(live);
                }
                Err(e) => debug!(error = %e, "Aux reconnect attempt failed"),
            }
        }
        debug!("Aux link supervisor stopped");
    }
}
