//! Connection manager
//!
//! Owns the single broker connection and its state machine:
//! - opening a session through the [`Transport`] and subscribing to the queue
//! - pumping inbound events through the normalizer into a bounded queue
//! - a persistence worker that drains that queue into the [`MessageStore`]
//! - detecting link loss and re-attempting through the reconnect scheduler
//!
//! Concurrency and usage notes:
//! - All mutable state sits behind one `std::sync::Mutex`, which is never
//!   held across an `.await`. `status()` only takes that lock.
//! - Every connection attempt is tagged with an epoch. `disconnect()` bumps
//!   the epoch, so a retry timer that fires afterwards does nothing and a
//!   handshake that completes afterwards closes its session instead of going
//!   live.
//! - One pump task per live session handles that session's events serially;
//!   messages reach the store in wire order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::details::ConnectionDetails;
use super::message::InboundMessage;
use super::reconnect::{ReconnectPolicy, ReconnectScheduler};
use super::state::{ConnectionState, Status};
use crate::config::Settings;
use crate::persistence::{MessageStore, StoredMessage};
use crate::transport::{Session, Transport, TransportEvent};
use crate::utils::error::{ConnectError, DisconnectError, StoreError};

const STATE_EVENT_CAPACITY: usize = 64;

/// Tunables for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub reconnect: ReconnectPolicy,
    /// Upper bound on open + subscribe. `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Capacity of the queue between the session pump and the store.
    pub queue_capacity: usize,
    /// How long the pump waits for queue space before dropping a message.
    pub enqueue_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: None,
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_secs(1),
        }
    }
}

impl From<&Settings> for ManagerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            reconnect: settings.broker.reconnect_policy(),
            handshake_timeout: settings.broker.handshake_timeout(),
            queue_capacity: settings.persistence.queue_capacity,
            enqueue_timeout: Duration::from_millis(settings.persistence.enqueue_timeout_ms),
        }
    }
}

/// Successful outcome of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAck {
    /// A new session is open and subscribed.
    Connected,
    /// A session was already connecting or connected; nothing was opened.
    AlreadyActive(ConnectionState),
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Caller,
    Retry { epoch: u64 },
}

struct SessionTask {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    state: ConnectionState,
    reconnect_enabled: bool,
    epoch: u64,
    last_details: Option<ConnectionDetails>,
    scheduler: ReconnectScheduler,
    session: Option<SessionTask>,
    sink: Option<mpsc::Sender<InboundMessage>>,
    worker: Option<JoinHandle<()>>,
}

impl Inner {
    fn transition(&mut self, next: ConnectionState, events: &broadcast::Sender<ConnectionState>) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, epoch = self.epoch, "connection state change");
        self.state = next;
        // no receivers is fine
        let _ = events.send(next);
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    store: Arc<dyn MessageStore>,
    options: ManagerOptions,
    inner: Mutex<Inner>,
    events: broadcast::Sender<ConnectionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle on one broker connection. Cheap to clone; all clones share the
/// same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager in the `Idle` state and spawn its persistence worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        store: Arc<dyn MessageStore>,
        options: ManagerOptions,
    ) -> Self {
        let (sink_tx, sink_rx) = mpsc::channel(options.queue_capacity.max(1));
        let worker = tokio::spawn(run_persistence_worker(Arc::clone(&store), sink_rx));
        let (events, _) = broadcast::channel(STATE_EVENT_CAPACITY);

        let inner = Inner {
            state: ConnectionState::Idle,
            reconnect_enabled: false,
            epoch: 0,
            last_details: None,
            scheduler: ReconnectScheduler::new(options.reconnect),
            session: None,
            sink: Some(sink_tx),
            worker: Some(worker),
        };

        Self {
            shared: Arc::new(Shared {
                transport,
                store,
                options,
                inner: Mutex::new(inner),
                events,
            }),
        }
    }

    /// Open a session and subscribe to `details.queue_name`.
    ///
    /// A no-op returning [`ConnectAck::AlreadyActive`] while a session is
    /// connecting or connected. On failure the state becomes `Failed`, or
    /// `Reconnecting` when automatic reconnection is enabled.
    pub async fn connect(&self, details: ConnectionDetails) -> Result<ConnectAck, ConnectError> {
        establish(Arc::clone(&self.shared), details, Origin::Caller).await
    }

    /// Close the session and stop reconnecting.
    ///
    /// Cancels a pending retry and any handshake in flight. Fails with
    /// `NotConnected` unless the state is `Connected`, `Connecting` or
    /// `Reconnecting`; automatic reconnection is disabled either way.
    pub async fn disconnect(&self) -> Result<(), DisconnectError> {
        let session = {
            let mut inner = self.shared.lock();
            inner.reconnect_enabled = false;
            inner.scheduler.cancel();
            if !matches!(
                inner.state,
                ConnectionState::Connected
                    | ConnectionState::Connecting
                    | ConnectionState::Reconnecting
            ) {
                return Err(DisconnectError::NotConnected);
            }
            inner.epoch += 1;
            inner.transition(ConnectionState::Idle, &self.shared.events);
            inner.session.take()
        };

        info!("disconnecting from broker");
        if let Some(SessionTask { shutdown, task }) = session {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
        Ok(())
    }

    pub fn status(&self) -> Status {
        let inner = self.shared.lock();
        Status {
            state: inner.state,
            auto_reconnect: inner.reconnect_enabled && inner.scheduler.policy().enabled,
            reconnect_armed: inner.scheduler.is_armed(),
        }
    }

    /// Every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.events.subscribe()
    }

    /// Stored messages, most recently received first.
    pub async fn list_messages(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let store = Arc::clone(&self.shared.store);
        tokio::task::spawn_blocking(move || store.list_recent(limit))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Disconnect, drain the persistence queue and flush the store.
    /// Later `connect` calls fail with [`ConnectError::ShutDown`].
    pub async fn shutdown(&self) {
        if self.disconnect().await.is_ok() {
            debug!("session closed for shutdown");
        }
        let worker = {
            let mut inner = self.shared.lock();
            inner.sink = None;
            inner.worker.take()
        };
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "persistence worker ended abnormally");
            }
        }
        info!("connection manager shut down");
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .finish()
    }
}

async fn establish(
    shared: Arc<Shared>,
    details: ConnectionDetails,
    origin: Origin,
) -> Result<ConnectAck, ConnectError> {
    let epoch = {
        let mut inner = shared.lock();
        if inner.sink.is_none() {
            return Err(ConnectError::ShutDown);
        }
        match origin {
            Origin::Caller => {
                if matches!(
                    inner.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    info!(state = %inner.state, "connect requested while a session is active");
                    return Ok(ConnectAck::AlreadyActive(inner.state));
                }
                inner.reconnect_enabled = true;
                inner.scheduler.cancel();
                inner.scheduler.reset();
            }
            Origin::Retry { epoch } => {
                if inner.epoch != epoch
                    || !inner.reconnect_enabled
                    || inner.state != ConnectionState::Reconnecting
                {
                    debug!(epoch, "stale reconnect timer, skipping");
                    return Err(ConnectError::Cancelled);
                }
                inner.scheduler.take_fired();
            }
        }
        inner.epoch += 1;
        inner.last_details = Some(details.clone());
        inner.transition(ConnectionState::Connecting, &shared.events);
        inner.epoch
    };

    info!(
        host = %details.host,
        port = details.port,
        queue = %details.queue_name,
        epoch,
        "connecting to broker"
    );

    let session = match handshake(&shared, &details).await {
        Ok(session) => session,
        Err(err) => return Err(fail_attempt(&shared, epoch, err)),
    };

    // Disconnect may have won the race while the handshake was in flight.
    let leftover = {
        let mut inner = shared.lock();
        match inner.sink.clone() {
            Some(sink) if inner.epoch == epoch => {
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let task = tokio::spawn(pump_session(
                    Arc::clone(&shared),
                    epoch,
                    session,
                    shutdown_rx,
                    sink,
                ));
                let replaced = inner.session.replace(SessionTask {
                    shutdown: shutdown_tx,
                    task,
                });
                if let Some(old) = replaced {
                    let _ = old.shutdown.send(());
                }
                inner.scheduler.reset();
                inner.transition(ConnectionState::Connected, &shared.events);
                None
            }
            _ => Some(session),
        }
    };

    if let Some(mut session) = leftover {
        info!(epoch, "connect superseded by disconnect, closing new session");
        session.close().await;
        return Err(ConnectError::Cancelled);
    }

    info!(queue = %details.queue_name, epoch, "connected and subscribed");
    Ok(ConnectAck::Connected)
}

async fn handshake(
    shared: &Shared,
    details: &ConnectionDetails,
) -> Result<Box<dyn Session>, ConnectError> {
    details.validate()?;

    let open_and_subscribe = async {
        let mut session = shared.transport.open(details).await?;
        if let Err(e) = session.subscribe(&details.queue_name).await {
            session.close().await;
            return Err(e);
        }
        Ok::<_, ConnectError>(session)
    };

    match shared.options.handshake_timeout {
        Some(limit) => tokio::time::timeout(limit, open_and_subscribe)
            .await
            .map_err(|_| ConnectError::Timeout(limit))?,
        None => open_and_subscribe.await,
    }
}

/// Record a failed attempt. Returns the error to hand back to the caller.
fn fail_attempt(shared: &Arc<Shared>, epoch: u64, err: ConnectError) -> ConnectError {
    let mut inner = shared.lock();
    if inner.epoch != epoch {
        debug!(epoch, error = %err, "attempt failed after being superseded");
        return ConnectError::Cancelled;
    }
    warn!(epoch, error = %err, "broker connection failed");
    inner.transition(ConnectionState::Failed, &shared.events);
    arm_reconnect(shared, &mut inner);
    err
}

/// Session ended underneath a live connection.
fn link_lost(shared: &Arc<Shared>, epoch: u64) {
    let mut inner = shared.lock();
    if inner.epoch != epoch || inner.state != ConnectionState::Connected {
        return;
    }
    inner.session = None;
    inner.transition(ConnectionState::Failed, &shared.events);
    arm_reconnect(shared, &mut inner);
}

fn arm_reconnect(shared: &Arc<Shared>, inner: &mut Inner) {
    if !inner.reconnect_enabled || !inner.scheduler.policy().enabled {
        return;
    }
    let Some(details) = inner.last_details.clone() else {
        return;
    };
    let epoch = inner.epoch;
    let delay = inner
        .scheduler
        .arm(retry(Arc::clone(shared), details, epoch));
    inner.transition(ConnectionState::Reconnecting, &shared.events);
    warn!(
        epoch,
        delay_ms = delay.as_millis() as u64,
        "attempting reconnection after delay"
    );
}

// Boxed so the retry path can name its own future type.
fn retry(shared: Arc<Shared>, details: ConnectionDetails, epoch: u64) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        match establish(shared, details, Origin::Retry { epoch }).await {
            Ok(_) => info!("reconnected to broker"),
            Err(ConnectError::Cancelled) => debug!(epoch, "reconnect cancelled"),
            Err(e) => warn!(error = %e, "reconnect failed"),
        }
    })
}

enum Step {
    Shutdown,
    Event(Option<TransportEvent>),
}

async fn pump_session(
    shared: Arc<Shared>,
    epoch: u64,
    mut session: Box<dyn Session>,
    mut shutdown: oneshot::Receiver<()>,
    sink: mpsc::Sender<InboundMessage>,
) {
    let enqueue_timeout = shared.options.enqueue_timeout;

    loop {
        let step = tokio::select! {
            biased;
            _ = &mut shutdown => Step::Shutdown,
            event = session.next_event() => Step::Event(event),
        };

        match step {
            Step::Shutdown => {
                debug!(epoch, "closing broker session");
                session.close().await;
                return;
            }
            Step::Event(Some(TransportEvent::Message(payload))) => {
                if payload.is_empty() {
                    debug!(epoch, "ignoring message without body");
                    continue;
                }
                let message = InboundMessage::from_payload(payload);
                debug!(epoch, content = %message.content, "received message");

                match tokio::time::timeout(enqueue_timeout, sink.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => error!(epoch, "persistence worker gone, dropping message"),
                    Err(_) => error!(
                        epoch,
                        timeout_ms = enqueue_timeout.as_millis() as u64,
                        "persistence queue full, dropping message"
                    ),
                }
            }
            Step::Event(Some(TransportEvent::Error(reason))) => {
                warn!(epoch, error = %reason, "broker session error");
                session.close().await;
                link_lost(&shared, epoch);
                return;
            }
            Step::Event(Some(TransportEvent::Disconnected)) | Step::Event(None) => {
                warn!(epoch, "disconnected from broker");
                session.close().await;
                link_lost(&shared, epoch);
                return;
            }
        }
    }
}

/// Drains the queue into the store, one append at a time. A failed append
/// is logged and the message dropped.
async fn run_persistence_worker(
    store: Arc<dyn MessageStore>,
    mut queue: mpsc::Receiver<InboundMessage>,
) {
    while let Some(message) = queue.recv().await {
        let store_ref = Arc::clone(&store);
        let result = tokio::task::spawn_blocking(move || {
            store_ref.append(&message.content, message.received_at)
        })
        .await;

        match result {
            Ok(Ok(stored)) => debug!(id = %stored.id, "message saved"),
            Ok(Err(e)) => error!(error = %e, "failed to save message, dropping it"),
            Err(e) => error!(error = %e, "store task panicked, dropping message"),
        }
    }

    let result = tokio::task::spawn_blocking(move || store.flush()).await;
    if let Ok(Err(e)) = result {
        error!(error = %e, "failed to flush message store");
    }
    debug!("persistence worker stopped");
}
