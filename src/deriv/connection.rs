//! Connection lifecycle for the Deriv API
//!
//! [`DerivConnection`] owns the single transport handle and drives
//! connect → authorize → keepalive → detect loss → reconnect → resubscribe.
//! All mutable shared state (balance, authorization flag, tick buffer,
//! subscription ids) lives behind one lock and is only written by the
//! connection's own operations and push handlers; readers take a
//! [`MarketSnapshot`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::codec::{self, Envelope};
use super::correlator::RequestCorrelator;
use super::messages::{MessageKind, Request};
use super::transport::endpoint_url;
use crate::common::errors::{ClientError, Result};
use crate::common::traits::{Connector, MarketClient};
use crate::common::types::{ConnectionState, MarketSnapshot, TransportEvent};
use crate::config::types::{AppConfig, BackoffStrategy};
use crate::strategy::tick_buffer::{TickBuffer, DEFAULT_TICK_CAPACITY};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Delay schedule between reconnect (and resubscribe) attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt
    pub delay: Duration,
    /// Upper bound for exponential growth
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Maximum attempts per outage (0 = unbounded)
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Fixed delay, retried forever
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            max_attempts: 0,
        }
    }

    /// Delay before attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
                self.delay.saturating_mul(factor).min(self.max_delay.max(self.delay))
            }
        }
    }

    /// Whether attempt number `attempt` may run
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Settings for a [`DerivConnection`]
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Full endpoint URL, including the `app_id` query parameter
    pub url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub tick_capacity: usize,
    /// Symbol reported before any subscription is made
    pub default_symbol: String,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            tick_capacity: DEFAULT_TICK_CAPACITY,
            default_symbol: "R_100".to_string(),
        }
    }

    /// Derive connection settings from the application configuration
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let settings = &config.settings;
        Ok(Self {
            url: endpoint_url(&config.deriv.websocket_url, config.deriv.app_id)?,
            connect_timeout: Duration::from_secs(settings.connect_timeout_seconds),
            request_timeout: Duration::from_secs(settings.request_timeout_seconds),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_seconds),
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(settings.reconnect_delay_ms),
                max_delay: Duration::from_millis(settings.max_reconnect_delay_ms),
                strategy: settings.reconnect_backoff,
                max_attempts: settings.max_reconnect_attempts,
            },
            tick_capacity: config.engine.tick_buffer_capacity,
            default_symbol: config.deriv.symbol.clone(),
        })
    }
}

/// State shared between the connection's operations and its push handler
#[derive(Debug)]
struct SharedState {
    balance: Decimal,
    authorized: bool,
    /// Active (or last requested) instrument
    symbol: String,
    ticks: TickBuffer,
    /// Symbol whose pushes are accepted into the buffer
    tick_filter: Option<String>,
    tick_subscription: Option<String>,
    ticks_live: bool,
    balance_subscription: Option<String>,
}

impl SharedState {
    /// Forget everything bound to the transport handle being replaced
    fn invalidate_transport(&mut self) {
        self.authorized = false;
        self.tick_subscription = None;
        self.balance_subscription = None;
        self.ticks_live = false;
        self.ticks.clear();
    }
}

/// One open transport handle and the tasks bound to it
struct Session {
    generation: u64,
    correlator: Arc<RequestCorrelator>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    fn close(self) {
        self.correlator.fail_all();
        for task in self.tasks {
            task.abort();
        }
    }
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    shared: RwLock<SharedState>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    shutdown: AtomicBool,
    credential: std::sync::Mutex<Option<String>>,
    desired_symbol: std::sync::Mutex<Option<String>>,
    reconnect_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    subscribe_retry: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn locked<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Client connection to the Deriv API
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct DerivConnection {
    inner: Arc<Inner>,
}

impl DerivConnection {
    /// Create a disconnected client; nothing is opened until `connect`
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = SharedState {
            balance: Decimal::ZERO,
            authorized: false,
            symbol: config.default_symbol.clone(),
            ticks: TickBuffer::with_capacity(config.tick_capacity),
            tick_filter: None,
            tick_subscription: None,
            ticks_live: false,
            balance_subscription: None,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state,
                shared: RwLock::new(shared),
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                credential: std::sync::Mutex::new(None),
                desired_symbol: std::sync::Mutex::new(None),
                reconnect_task: std::sync::Mutex::new(None),
                subscribe_retry: std::sync::Mutex::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every lifecycle transition
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub async fn balance(&self) -> Decimal {
        self.inner.shared.read().await.balance
    }

    pub async fn is_authorized(&self) -> bool {
        self.inner.shared.read().await.authorized
    }

    /// Buffered prices, most recent last
    pub async fn ticks(&self) -> Vec<Decimal> {
        self.inner.shared.read().await.ticks.snapshot()
    }

    /// Consistent view of balance, authorization and ticks
    pub async fn snapshot(&self) -> MarketSnapshot {
        let shared = self.inner.shared.read().await;
        MarketSnapshot {
            state: self.state(),
            balance: shared.balance,
            authorized: shared.authorized,
            symbol: shared.symbol.clone(),
            ticks: shared.ticks.snapshot(),
            ticks_live: shared.ticks_live,
        }
    }

    /// Generation number of the open transport handle, if any
    pub async fn generation(&self) -> Option<u64> {
        self.inner.session.lock().await.as_ref().map(|s| s.generation)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open a new transport, closing the current one first
    ///
    /// Requests pending on the replaced handle fail with `ConnectionReset`.
    /// On failure a background reconnect is scheduled and `ConnectFailed`
    /// is returned.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.cancel_reconnect();

        match self.open_session(false).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Connect failed: {}", e);
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Authorize with `credential`, connecting first if needed
    ///
    /// The credential is remembered for reconnects unless the server rejects
    /// it. Rejection is returned as `AuthRejected` and never retried.
    #[instrument(skip(self, credential))]
    pub async fn authorize(&self, credential: &str) -> Result<()> {
        *locked(&self.inner.credential) = Some(credential.to_string());
        self.ensure_open().await?;
        self.authorize_session(credential).await
    }

    /// Stream ticks for `symbol`, releasing any active tick stream first
    ///
    /// A failed attempt is retried in the background with the reconnect
    /// delay for as long as the session stays authorized.
    #[instrument(skip(self))]
    pub async fn subscribe_to_ticks(&self, symbol: &str) -> Result<()> {
        self.cancel_subscribe_retry();
        *locked(&self.inner.desired_symbol) = Some(symbol.to_string());

        match self.try_subscribe(symbol).await {
            Ok(()) => Ok(()),
            // Server-side rejections of the symbol are retried; local terminal errors are not
            Err(e) if !e.is_retryable() && !matches!(e, ClientError::Api { .. }) => Err(e),
            Err(e) => {
                warn!(%symbol, "Failed to subscribe to ticks: {}", e);
                self.schedule_subscribe_retry(symbol.to_string());
                Err(ClientError::SubscribeFailed {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Release the active tick stream, if any; failures are only logged
    #[instrument(skip(self))]
    pub async fn unsubscribe_from_ticks(&self) {
        self.cancel_subscribe_retry();
        *locked(&self.inner.desired_symbol) = None;

        let previous = {
            let mut shared = self.inner.shared.write().await;
            shared.tick_filter = None;
            shared.ticks_live = false;
            shared.tick_subscription.take()
        };

        let Some(subscription_id) = previous else {
            return;
        };

        match self.request(&Request::forget(subscription_id.as_str())).await {
            Ok(_) => info!(%subscription_id, "Unsubscribed from ticks"),
            Err(e) => warn!(%subscription_id, "Failed to unsubscribe from ticks: {}", e),
        }
    }

    /// Close the transport and reset all state; suppresses reconnection
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.cancel_reconnect();
        self.cancel_subscribe_retry();

        if let Some(session) = self.inner.session.lock().await.take() {
            session.close();
        }

        *locked(&self.inner.credential) = None;
        *locked(&self.inner.desired_symbol) = None;

        {
            let mut shared = self.inner.shared.write().await;
            shared.invalidate_transport();
            shared.balance = Decimal::ZERO;
            shared.tick_filter = None;
        }

        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!("Disconnected from Deriv");
    }

    /// Send an ad-hoc correlated request on the open transport
    pub async fn request(&self, request: &Request) -> Result<Envelope> {
        let (_, correlator) = self.correlator().await?;
        correlator.send(request).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn correlator(&self) -> Result<(u64, Arc<RequestCorrelator>)> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| (s.generation, s.correlator.clone()))
            .ok_or(ClientError::NotConnected)
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.state().is_open() {
            return Ok(());
        }
        self.connect().await
    }

    /// Replace the transport handle; `from_reconnect` honours a concurrent shutdown
    async fn open_session(&self, from_reconnect: bool) -> Result<u64> {
        let mut slot = self.inner.session.lock().await;

        if from_reconnect && self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionReset);
        }

        if let Some(previous) = slot.take() {
            info!(generation = previous.generation, "Closing existing transport");
            previous.close();
            self.inner.shared.write().await.invalidate_transport();
        }

        self.inner.state.send_replace(ConnectionState::Connecting);

        let timeout = self.inner.config.connect_timeout;
        let opened =
            tokio::time::timeout(timeout, self.inner.connector.open(&self.inner.config.url)).await;

        let channels = match opened {
            Ok(Ok(channels)) => channels,
            Ok(Err(e)) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(match e {
                    ClientError::ConnectFailed(reason) => ClientError::ConnectFailed(reason),
                    other => ClientError::ConnectFailed(other.to_string()),
                });
            }
            Err(_) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(ClientError::ConnectFailed(format!(
                    "no open confirmation within {:?}",
                    timeout
                )));
            }
        };

        if from_reconnect && self.inner.shutdown.load(Ordering::SeqCst) {
            // Dropping the channels closes the transport
            return Err(ClientError::ConnectionReset);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let correlator = Arc::new(RequestCorrelator::new(
            channels.outbound,
            self.inner.config.request_timeout,
        ));

        let reader = tokio::spawn(run_reader(
            Arc::downgrade(&self.inner),
            generation,
            correlator.clone(),
            channels.inbound,
        ));
        let keepalive = tokio::spawn(run_keepalive(
            correlator.clone(),
            self.inner.config.heartbeat_interval,
            generation,
        ));

        *slot = Some(Session {
            generation,
            correlator,
            tasks: vec![reader, keepalive],
        });
        self.inner.state.send_replace(ConnectionState::Connected);
        info!(generation, "Connected to Deriv WebSocket API");

        Ok(generation)
    }

    async fn authorize_session(&self, credential: &str) -> Result<()> {
        let (generation, correlator) = self.correlator().await?;
        // Re-authorizing an authorized session goes through Authenticating too
        self.transition(
            &[ConnectionState::Connected, ConnectionState::Authorized],
            ConnectionState::Authenticating,
        );

        let envelope = match correlator.send(&Request::authorize(credential)).await {
            Ok(envelope) => envelope,
            Err(ClientError::Api { code, message }) => {
                error!(%code, "Authorization rejected: {}", message);
                *locked(&self.inner.credential) = None;
                self.inner.shared.write().await.authorized = false;
                self.transition(
                    &[ConnectionState::Authenticating, ConnectionState::Authorized],
                    ConnectionState::Connected,
                );
                return Err(ClientError::AuthRejected(format!("{}: {}", code, message)));
            }
            Err(e) => {
                warn!("Authorization request failed: {}", e);
                // A transient failure leaves an earlier authorization in place
                let fallback = if self.inner.shared.read().await.authorized {
                    ConnectionState::Authorized
                } else {
                    ConnectionState::Connected
                };
                self.transition(&[ConnectionState::Authenticating], fallback);
                return Err(e);
            }
        };

        {
            // Hold the session lock so a concurrent transport loss cannot interleave
            let session = self.inner.session.lock().await;
            if session.as_ref().map(|s| s.generation) != Some(generation) {
                return Err(ClientError::ConnectionReset);
            }
            self.inner.shared.write().await.authorized = true;
            self.inner.state.send_replace(ConnectionState::Authorized);
        }

        match envelope.authorize() {
            Ok(body) => info!(loginid = ?body.loginid, currency = ?body.currency, "Successfully authorized"),
            Err(_) => info!("Successfully authorized"),
        }

        // The reader has already applied the balance carried by the response
        match correlator.send(&Request::balance_stream()).await {
            Ok(response) => {
                let subscription_id = response.subscription_id().map(str::to_string);
                info!(subscription_id = ?subscription_id, "Balance stream established");
                self.inner.shared.write().await.balance_subscription = subscription_id;
            }
            Err(e) => warn!("Failed to subscribe to balance: {}", e),
        }

        Ok(())
    }

    async fn ensure_authorized(&self) -> Result<()> {
        if self.inner.shared.read().await.authorized {
            return Ok(());
        }

        let credential = locked(&self.inner.credential)
            .clone()
            .ok_or(ClientError::NotAuthorized)?;
        self.ensure_open().await?;
        self.authorize_session(&credential).await
    }

    async fn try_subscribe(&self, symbol: &str) -> Result<()> {
        self.ensure_authorized().await?;
        let (generation, correlator) = self.correlator().await?;

        let previous = self.inner.shared.write().await.tick_subscription.take();
        if let Some(subscription_id) = previous {
            debug!(%subscription_id, "Releasing previous tick subscription");
            if let Err(e) = correlator.send(&Request::forget(subscription_id.as_str())).await {
                warn!(%subscription_id, "Failed to release tick subscription: {}", e);
            }
        }

        {
            let mut shared = self.inner.shared.write().await;
            if shared.symbol != symbol {
                shared.ticks.clear();
                shared.symbol = symbol.to_string();
            }
            shared.tick_filter = Some(symbol.to_string());
            shared.ticks_live = false;
        }

        let envelope = correlator.send(&Request::tick_stream(symbol)).await?;

        let session = self.inner.session.lock().await;
        if session.as_ref().map(|s| s.generation) != Some(generation) {
            return Err(ClientError::ConnectionReset);
        }

        // The first tick rides on the response and was buffered by the reader
        let mut shared = self.inner.shared.write().await;
        shared.tick_subscription = envelope.subscription_id().map(str::to_string);
        shared.ticks_live = true;
        info!(
            symbol,
            subscription_id = ?shared.tick_subscription,
            "Subscribed to ticks"
        );

        Ok(())
    }

    /// Apply the balance or tick carried by an inbound frame
    ///
    /// Runs on the reader for responses and pushes alike, so the buffer and
    /// balance follow arrival order.
    async fn apply_stream_data(&self, envelope: &Envelope) {
        if envelope.error.is_some() {
            return;
        }

        match &envelope.kind {
            MessageKind::Balance => match envelope.balance() {
                Ok(body) => {
                    debug!(balance = %body.balance, "Balance update");
                    self.inner.shared.write().await.balance = body.balance;
                }
                Err(e) => warn!("Dropping balance message: {}", e),
            },
            MessageKind::Tick => match envelope.tick() {
                Ok(tick) => {
                    let mut shared = self.inner.shared.write().await;
                    if shared.tick_filter.as_deref() == Some(tick.symbol.as_str()) {
                        shared.ticks.push(tick.quote);
                    } else {
                        debug!(symbol = %tick.symbol, "Ignoring tick for inactive symbol");
                    }
                }
                Err(e) => warn!("Dropping tick message: {}", e),
            },
            _ => {}
        }
    }

    /// Log a message no request was waiting for
    fn log_unsolicited(envelope: &Envelope) {
        if let Some(error) = &envelope.error {
            warn!(code = %error.code, "Unsolicited error: {}", error.message);
            return;
        }

        match &envelope.kind {
            MessageKind::Balance | MessageKind::Tick => {}
            MessageKind::Ping => debug!("Received pong"),
            other => debug!(kind = ?other, "Ignoring unsolicited message"),
        }
    }

    /// Called by the reader once its transport reports closure
    async fn on_transport_lost(&self, generation: u64, reason: Option<String>) {
        let session = {
            let mut slot = self.inner.session.lock().await;
            match slot.as_ref() {
                Some(current) if current.generation == generation => slot.take(),
                _ => {
                    debug!(generation, "Ignoring close of superseded transport");
                    return;
                }
            }
        };

        if let Some(session) = session {
            session.close();
        }
        self.inner.shared.write().await.invalidate_transport();

        if self.inner.shutdown.load(Ordering::SeqCst) {
            self.inner.state.send_replace(ConnectionState::Disconnected);
            return;
        }

        warn!(generation, ?reason, "Transport lost unexpectedly");
        self.schedule_reconnect();
    }

    fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn schedule_reconnect(&self) {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = locked(&self.inner.reconnect_task);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        self.inner.state.send_replace(ConnectionState::Reconnecting);
        *slot = Some(tokio::spawn(self.clone().reconnect_loop()));
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = locked(&self.inner.reconnect_task).take() {
            task.abort();
        }
    }

    fn reconnect_loop(self) -> BoxedTask {
        Box::pin(async move {
            let policy = self.inner.config.reconnect.clone();
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                if !policy.allows(attempt) {
                    error!(attempts = attempt - 1, "Giving up on reconnecting");
                    self.inner.state.send_replace(ConnectionState::Disconnected);
                    return;
                }

                let delay = policy.delay_for(attempt);
                info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                tokio::time::sleep(delay).await;

                if self.inner.shutdown.load(Ordering::SeqCst) {
                    return;
                }

                match self.open_session(true).await {
                    Ok(generation) => {
                        info!(attempt, generation, "Reconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(attempt, "Reconnect attempt failed: {}", e);
                        if self.inner.shutdown.load(Ordering::SeqCst) {
                            return;
                        }
                        self.inner.state.send_replace(ConnectionState::Reconnecting);
                    }
                }
            }

            // Detach so a later loss schedules a fresh loop
            locked(&self.inner.reconnect_task).take();
            self.restore_streams().await;
        })
    }

    /// Re-establish authorization and the tick stream after a reconnect
    async fn restore_streams(&self) {
        let credential = locked(&self.inner.credential).clone();
        let Some(credential) = credential else {
            return;
        };

        if let Err(e) = self.authorize_session(&credential).await {
            warn!("Re-authorization after reconnect failed: {}", e);
            return;
        }

        let symbol = locked(&self.inner.desired_symbol).clone();
        if let Some(symbol) = symbol {
            if let Err(e) = self.subscribe_to_ticks(&symbol).await {
                warn!(%symbol, "Resubscribe after reconnect failed: {}", e);
            }
        }
    }

    fn schedule_subscribe_retry(&self, symbol: String) {
        let mut slot = locked(&self.inner.subscribe_retry);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(self.clone().subscribe_retry_loop(symbol)));
    }

    fn cancel_subscribe_retry(&self) {
        if let Some(task) = locked(&self.inner.subscribe_retry).take() {
            task.abort();
        }
    }

    fn subscribe_retry_loop(self, symbol: String) -> BoxedTask {
        Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                tokio::time::sleep(self.inner.config.reconnect.delay_for(attempt)).await;

                let still_wanted =
                    locked(&self.inner.desired_symbol).as_deref() == Some(symbol.as_str());
                if self.inner.shutdown.load(Ordering::SeqCst)
                    || !still_wanted
                    || !self.inner.shared.read().await.authorized
                {
                    debug!(%symbol, "Stopping tick subscribe retries");
                    return;
                }

                match self.try_subscribe(&symbol).await {
                    Ok(()) => {
                        info!(%symbol, attempt, "Tick subscription recovered");
                        return;
                    }
                    Err(e) => warn!(%symbol, attempt, "Tick subscribe retry failed: {}", e),
                }
            }
        })
    }
}

/// Demultiplex inbound frames: correlated responses to the correlator,
/// everything else to the push handler
async fn run_reader(
    inner: Weak<Inner>,
    generation: u64,
    correlator: Arc<RequestCorrelator>,
    mut inbound: mpsc::Receiver<TransportEvent>,
) {
    let reason = loop {
        match inbound.recv().await {
            Some(TransportEvent::Message(text)) => {
                let envelope = match codec::decode(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(generation, "Dropping frame: {}", e);
                        continue;
                    }
                };

                let Some(inner) = inner.upgrade() else {
                    return;
                };
                // Stream data first, so a response's tick lands before any later push
                DerivConnection { inner }.apply_stream_data(&envelope).await;

                if let Some(push) = correlator.resolve(envelope) {
                    DerivConnection::log_unsolicited(&push);
                }
            }
            Some(TransportEvent::Closed { reason }) => break reason,
            None => break Some("transport task ended".to_string()),
        }
    };

    correlator.fail_all();
    if let Some(inner) = inner.upgrade() {
        let connection = DerivConnection { inner };
        tokio::spawn(async move { connection.on_transport_lost(generation, reason).await });
    }
}

/// Emit a no-op ping every `period` for the lifetime of one transport
async fn run_keepalive(correlator: Arc<RequestCorrelator>, period: Duration, generation: u64) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = correlator.notify(&Request::ping()).await {
            debug!(generation, "Keepalive stopped: {}", e);
            return;
        }
    }
}

#[async_trait]
impl MarketClient for DerivConnection {
    async fn connect(&self) -> Result<()> {
        DerivConnection::connect(self).await
    }

    async fn authorize(&self, credential: &str) -> Result<()> {
        DerivConnection::authorize(self, credential).await
    }

    async fn subscribe_to_ticks(&self, symbol: &str) -> Result<()> {
        DerivConnection::subscribe_to_ticks(self, symbol).await
    }

    async fn unsubscribe_from_ticks(&self) {
        DerivConnection::unsubscribe_from_ticks(self).await
    }

    async fn disconnect(&self) {
        DerivConnection::disconnect(self).await
    }

    async fn snapshot(&self) -> MarketSnapshot {
        DerivConnection::snapshot(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn test_exponential_policy_is_capped() {
        let policy = ReconnectPolicy {
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig::default();
        let config = tokio_test::assert_ok!(ConnectionConfig::from_app_config(&app));
        assert_eq!(config.url, "wss://ws.binaryws.com/websockets/v3?app_id=1089");
        assert_eq!(config.reconnect, ReconnectPolicy::fixed(Duration::from_secs(5)));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.tick_capacity, 20);

        let mut bad = AppConfig::default();
        bad.deriv.websocket_url = "https://ws.binaryws.com/websockets/v3".to_string();
        tokio_test::assert_err!(ConnectionConfig::from_app_config(&bad));
    }

    #[tokio::test]
    async fn test_new_connection_is_disconnected() {
        struct NeverConnector;

        #[async_trait]
        impl Connector for NeverConnector {
            async fn open(&self, _url: &str) -> Result<crate::common::traits::TransportChannels> {
                Err(ClientError::ConnectFailed("offline".into()))
            }
        }

        let connection =
            DerivConnection::new(ConnectionConfig::new("ws://localhost"), Arc::new(NeverConnector));
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        let snapshot = connection.snapshot().await;
        assert!(!snapshot.authorized);
        assert!(snapshot.ticks.is_empty());
        assert_eq!(snapshot.symbol, "R_100");
        assert!(matches!(
            connection.request(&Request::ping()).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            connection.subscribe_to_ticks("R_100").await,
            Err(ClientError::NotAuthorized)
        ));
    }
}
