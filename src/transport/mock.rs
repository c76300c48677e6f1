//! In-process transport used by the tests. Records every `open` with its
//! (virtual) timestamp and hands out sessions whose events are injected by
//! the test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use super::{Session, Transport, TransportEvent};
use crate::broker::ConnectionDetails;
use crate::utils::error::ConnectError;

#[derive(Debug, Clone)]
pub(crate) struct OpenRecord {
    pub details: ConnectionDetails,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub(crate) enum OpenOutcome {
    Succeed,
    Fail(String),
}

/// Test-side handle on a session the mock handed out.
#[derive(Debug, Clone)]
pub(crate) struct SessionControl {
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockState {
    opens: Vec<OpenRecord>,
    outcomes: VecDeque<OpenOutcome>,
    default_outcome: OpenOutcome,
    sessions: Vec<SessionControl>,
    subscriptions: Vec<String>,
    gate: Option<Arc<Notify>>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
    opened: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_default(OpenOutcome::Succeed)
    }

    /// Every handshake fails with `reason` unless an outcome is queued.
    pub fn failing(reason: &str) -> Self {
        Self::with_default(OpenOutcome::Fail(reason.to_string()))
    }

    fn with_default(default_outcome: OpenOutcome) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                opens: Vec::new(),
                outcomes: VecDeque::new(),
                default_outcome,
                sessions: Vec::new(),
                subscriptions: Vec::new(),
                gate: None,
            })),
            opened: Arc::new(Notify::new()),
        }
    }

    /// Outcome for the next `open` only; later opens fall back to the default.
    pub fn push_outcome(&self, outcome: OpenOutcome) {
        self.state.lock().unwrap().outcomes.push_back(outcome);
    }

    /// Make every `open` wait for a permit on the returned `Notify`.
    pub fn hold_handshakes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn session(&self, index: usize) -> SessionControl {
        self.state.lock().unwrap().sessions[index].clone()
    }

    pub fn last_session(&self) -> SessionControl {
        let state = self.state.lock().unwrap();
        state.sessions.last().cloned().expect("no session opened yet")
    }

    /// Wait until at least `count` handshakes have started.
    pub async fn wait_for_opens(&self, count: usize) {
        loop {
            let notified = self.opened.notified();
            if self.open_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, details: &ConnectionDetails) -> Result<Box<dyn Session>, ConnectError> {
        let (outcome, gate) = {
            let mut state = self.state.lock().unwrap();
            state.opens.push(OpenRecord {
                details: details.clone(),
                at: Instant::now(),
            });
            let outcome = state
                .outcomes
                .pop_front()
                .unwrap_or_else(|| state.default_outcome.clone());
            (outcome, state.gate.clone())
        };
        self.opened.notify_waiters();

        if let Some(gate) = gate {
            gate.notified().await;
        }

        match outcome {
            OpenOutcome::Fail(reason) => Err(ConnectError::Unreachable {
                host: details.host.clone(),
                port: details.port,
                reason,
            }),
            OpenOutcome::Succeed => {
                let (tx, rx) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                self.state.lock().unwrap().sessions.push(SessionControl {
                    events: tx,
                    closed: closed.clone(),
                });
                Ok(Box::new(MockSession {
                    events: rx,
                    closed,
                    state: self.state.clone(),
                }))
            }
        }
    }
}

struct MockSession {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closed: Arc<AtomicBool>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Session for MockSession {
    async fn subscribe(&mut self, queue: &str) -> Result<(), ConnectError> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .push(queue.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
