//! Subscriber session manager with statum-driven worker lifecycle
//!
//! One worker task per session owns the transport and performs every
//! connect, subscribe and receive. State transitions and sink callbacks
//! go through a single dispatch gate, so they are observed in order and
//! nothing is dispatched once the gate is closed.
//!
//! # Worker lifecycle
//!
//! ```text
//! Initializing ──► Running ──► Draining ──► Finished
//!                  (connect,   (unsubscribe,  (transport
//!                   subscribe,  disconnect     dropped)
//!                   receive)    within grace)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use statum::{machine, state};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::config::{ConnectionConfig, SessionParams};
use super::error::{ErrorKind, SessionError, TransportError};
use super::message_manager::InboundMessage;
use super::mqtt_handler::MqttTransport;
use super::sink::SessionSink;
use super::state::SessionState;
use super::topic;
use super::transport::Transport;

struct GateInner {
    sink: Box<dyn SessionSink>,
    closed: bool,
}

/// Serialises state changes and sink calls behind one mutex.
///
/// Every dispatch checks `closed` under the lock, so once [`close`] has
/// returned no further callback can run.
///
/// [`close`]: DispatchGate::close
struct DispatchGate {
    inner: Mutex<GateInner>,
    state_tx: watch::Sender<SessionState>,
}

impl DispatchGate {
    fn new(sink: Box<dyn SessionSink>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        DispatchGate {
            inner: Mutex::new(GateInner {
                sink,
                closed: false,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // A panicking sink must not wedge stop()
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Returns false if the gate is closed and nothing happened
    fn transition(&self, next: SessionState) -> bool {
        let mut gate = self.lock();
        if gate.closed {
            return false;
        }
        let previous = self.state_tx.send_replace(next);
        debug!("Session state {} -> {}", previous, next);
        gate.sink.on_state_change(next);
        true
    }

    fn message(&self, message: &InboundMessage) -> bool {
        let mut gate = self.lock();
        if gate.closed {
            return false;
        }
        gate.sink.on_message(message);
        true
    }

    fn error(&self, kind: ErrorKind, detail: &str) -> bool {
        let mut gate = self.lock();
        if gate.closed {
            return false;
        }
        gate.sink.on_error(kind, detail);
        true
    }

    fn reconnect_scheduled(&self, attempt: u32, delay: Duration) -> bool {
        let mut gate = self.lock();
        if gate.closed {
            return false;
        }
        gate.sink.on_reconnect_scheduled(attempt, delay);
        true
    }

    /// Emits `Closed` and shuts the gate. Returns false if already closed.
    fn close(&self) -> bool {
        let mut gate = self.lock();
        if gate.closed {
            return false;
        }
        let previous = self.state_tx.send_replace(SessionState::Closed);
        debug!("Session state {} -> {}", previous, SessionState::Closed);
        gate.sink.on_state_change(SessionState::Closed);
        gate.closed = true;
        true
    }
}

/// Why the worker left a connect or receive phase
enum Interrupt {
    /// stop() was requested
    Cancelled,
    /// Connection failed or dropped, back off and reconnect
    Retry,
}

#[state]
#[derive(Debug, Clone)]
enum WorkerPhase {
    Initializing,
    Running,
    Draining,
    Finished,
}

/// Worker that owns the transport for one session
#[machine]
struct SessionWorker<S: WorkerPhase> {
    params: SessionParams,
    transport: Box<dyn Transport>,
    gate: Arc<DispatchGate>,
    cancel: CancellationToken,
    backoff: Backoff,
    subscribed: bool,
}

impl SessionWorker<Initializing> {
    fn create(
        params: SessionParams,
        transport: Box<dyn Transport>,
        gate: Arc<DispatchGate>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(params.backoff_min, params.backoff_max);
        Self::new(params, transport, gate, cancel, backoff, false)
    }

    /// Announces the initial state and moves to Running
    fn begin(self) -> SessionWorker<Running> {
        info!(
            "Session worker for {} on {} starting",
            self.params.topic, self.params.broker
        );
        self.gate.transition(SessionState::Disconnected);
        self.transition()
    }
}

impl SessionWorker<Running> {
    /// Connect, subscribe and receive until stop() is requested.
    ///
    /// Connect failures and transport loss go through the backoff schedule
    /// and start over with a fresh connect.
    async fn run_until_shutdown(mut self) -> SessionWorker<Draining> {
        loop {
            let interrupt = match self.establish().await {
                Ok(()) => self.receive().await,
                Err(interrupt) => interrupt,
            };

            match interrupt {
                Interrupt::Cancelled => break,
                Interrupt::Retry => {
                    if !self.wait_backoff().await {
                        break;
                    }
                }
            }
        }

        info!("Session worker for {} draining", self.params.topic);
        self.transition()
    }

    fn report(&self, kind: ErrorKind, detail: &str) {
        match kind {
            ErrorKind::SubscribeError | ErrorKind::ConfigError => error!("{}: {}", kind, detail),
            _ => warn!("{}: {}", kind, detail),
        }
        self.gate.error(kind, detail);
    }

    fn enter(&self, state: SessionState) -> Result<(), Interrupt> {
        if self.gate.transition(state) {
            Ok(())
        } else {
            Err(Interrupt::Cancelled)
        }
    }

    async fn establish(&mut self) -> Result<(), Interrupt> {
        self.enter(SessionState::Connecting)?;

        let timeout = self.params.connect_timeout;
        let attempt = tokio::time::timeout(timeout, self.transport.connect(&self.params));
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
            result = attempt => result,
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let detail = format!("connect to {} failed: {}", self.params.broker, e);
                self.report(e.kind(false), &detail);
                return Err(Interrupt::Retry);
            }
            Err(_) => {
                let e = TransportError::Timeout(timeout.as_millis() as u64);
                let detail = format!("connect to {} failed: {}", self.params.broker, e);
                self.report(ErrorKind::ConnectError, &detail);
                return Err(Interrupt::Retry);
            }
        }

        info!("Connected to {}", self.params.broker);
        self.backoff.reset();
        self.enter(SessionState::Connected)?;
        self.subscribe().await
    }

    async fn subscribe(&mut self) -> Result<(), Interrupt> {
        self.enter(SessionState::Subscribing)?;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
            result = self.transport.subscribe(&self.params.topic, self.params.qos) => result,
        };

        match result {
            Ok(()) => {
                info!("Subscribed to {}", self.params.topic);
                self.subscribed = true;
                self.enter(SessionState::Subscribed)
            }
            Err(TransportError::SubscribeRejected(topic)) => {
                // Configuration problem: stay connected, do not retry
                self.subscribed = false;
                let detail = format!("broker rejected subscription to {}", topic);
                self.report(ErrorKind::SubscribeError, &detail);
                self.enter(SessionState::Connected)
            }
            Err(e) => {
                self.subscribed = false;
                let detail = format!("connection lost while subscribing: {}", e);
                self.report(e.kind(true), &detail);
                self.enter(SessionState::Disconnected)?;
                Err(Interrupt::Retry)
            }
        }
    }

    async fn receive(&mut self) -> Interrupt {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Interrupt::Cancelled,
                result = self.transport.next_message() => result,
            };

            match result {
                Ok(message) => {
                    if !self.subscribed || !topic::matches(&self.params.topic, &message.topic) {
                        debug!("Ignoring message on {}", message.topic);
                        continue;
                    }
                    debug!("Dispatching {}", message);
                    if !self.gate.message(&message) {
                        return Interrupt::Cancelled;
                    }
                }
                Err(e) => {
                    self.subscribed = false;
                    let detail = format!("connection to {} lost: {}", self.params.broker, e);
                    self.report(ErrorKind::TransportLost, &detail);
                    if self.enter(SessionState::Disconnected).is_err() {
                        return Interrupt::Cancelled;
                    }
                    return Interrupt::Retry;
                }
            }
        }
    }

    /// Sleeps for the next backoff delay. Returns false if cancelled.
    async fn wait_backoff(&mut self) -> bool {
        if self.enter(SessionState::ReconnectPending).is_err() {
            return false;
        }

        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        info!(
            "Reconnect attempt {} to {} in {} ms",
            attempt,
            self.params.broker,
            delay.as_millis()
        );
        if !self.gate.reconnect_scheduled(attempt, delay) {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

impl SessionWorker<Draining> {
    /// Unsubscribes and disconnects within the shutdown grace period
    async fn drain(mut self) -> SessionWorker<Finished> {
        let grace = self.params.shutdown_grace;
        let topic = self.params.topic.clone();
        let subscribed = self.subscribed;
        let transport = &mut self.transport;

        let graceful = async move {
            if subscribed {
                if let Err(e) = transport.unsubscribe(&topic).await {
                    debug!("Unsubscribe from {} failed: {}", topic, e);
                }
            }
            transport.close().await
        };

        match tokio::time::timeout(grace, graceful).await {
            Ok(Ok(())) => info!("Transport closed"),
            Ok(Err(e)) => warn!("Transport close failed: {}", e),
            Err(_) => warn!(
                "Transport did not close within {} ms, forcing close",
                grace.as_millis()
            ),
        }

        self.subscribed = false;
        self.transition()
    }
}

impl SessionWorker<Finished> {
    fn release(self) {
        debug!("Session worker for {} finished", self.params.topic);
    }
}

/// Keeps one broker subscription alive and forwards its messages to a sink.
///
/// Created with [`SessionManager::start`], which returns immediately; all
/// network outcomes arrive through the sink. Dropping the manager stops the
/// session.
///
/// ```rust,no_run
/// use topicwatch::mqtt::{ChannelSink, ConnectionConfig, SessionManager};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (sink, mut events) = ChannelSink::new();
/// let config = ConnectionConfig::new("tcp://10.0.0.5:1883", "visitor/count");
/// let session = SessionManager::start(&config, sink)?;
///
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// session.stop();
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    gate: Arc<DispatchGate>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    client_id: String,
    topic: String,
}

impl SessionManager {
    /// Starts a session over the rumqttc transport
    pub fn start<K: SessionSink>(config: &ConnectionConfig, sink: K) -> Result<Self, SessionError> {
        Self::start_with_transport(config, sink, MqttTransport::default())
    }

    /// Validates `config` and spawns the session worker.
    ///
    /// # Errors
    ///
    /// * [`SessionError::Config`] - malformed broker URI, topic or timing. The
    ///   sink also receives [`ErrorKind::ConfigError`]; no connection is
    ///   attempted and the state stays `Disconnected`.
    /// * [`SessionError::NoRuntime`] - called outside a tokio runtime
    pub fn start_with_transport<K: SessionSink, T: Transport>(
        config: &ConnectionConfig,
        mut sink: K,
        transport: T,
    ) -> Result<Self, SessionError> {
        let params = match config.validate() {
            Ok(params) => params,
            Err(e) => {
                error!("Refusing to start session: {}", e);
                sink.on_error(ErrorKind::ConfigError, &e.to_string());
                return Err(e.into());
            }
        };

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        info!(
            "Starting session {} for {} on {}",
            params.client_id, params.topic, params.broker_uri
        );

        let gate = Arc::new(DispatchGate::new(Box::new(sink)));
        let cancel = CancellationToken::new();
        let client_id = params.client_id.clone();
        let topic = params.topic.clone();

        let worker =
            SessionWorker::create(params, Box::new(transport), gate.clone(), cancel.clone());
        let handle = runtime.spawn(async move {
            let running = worker.begin();
            let draining = running.run_until_shutdown().await;
            let finished = draining.drain().await;
            finished.release();
        });

        Ok(SessionManager {
            gate,
            cancel,
            worker: Mutex::new(Some(handle)),
            client_id,
            topic,
        })
    }

    /// Requests shutdown and returns without waiting for network I/O.
    ///
    /// The state becomes `Closed` before this returns and the sink is not
    /// called again afterwards. The worker then unsubscribes and disconnects
    /// within the shutdown grace period. Calling it again has no effect.
    pub fn stop(&self) {
        if self.gate.close() {
            info!("Session {} stopped", self.client_id);
        }
        self.cancel.cancel();
    }

    /// Waits until the worker has released the transport
    pub async fn wait_closed(&self) {
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Session worker panicked: {}", e);
            }
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.gate.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.gate.state_tx.subscribe()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
