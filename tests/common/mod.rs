//! Common test utilities and fixtures
//!
//! [`FakeDeriv`] is a scripted, in-memory stand-in for the Deriv API. It plugs
//! into the client through the `Connector` trait, answers requests the way the
//! real service does and lets tests push ticks, drop the transport or refuse
//! connections.

#![allow(dead_code)]

use async_trait::async_trait;
use deriv_websocket::common::channels::{create_event_channel_with_size, create_outbound_channel};
use deriv_websocket::{
    ClientError, ConnectionConfig, Connector, ReconnectPolicy, Result, TransportChannels,
    TransportEvent,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const VALID_TOKEN: &str = "valid-token";
pub const INITIAL_QUOTE: Decimal = dec!(1000.01);

#[derive(Default)]
struct FakeState {
    connection_id: u64,
    open_attempts: usize,
    fail_next_opens: usize,
    frames: Vec<Value>,
    events: Option<mpsc::Sender<TransportEvent>>,
    silent: HashSet<String>,
    rejected: HashSet<String>,
    follow_ups: HashMap<String, Decimal>,
    balance: Decimal,
    subscription_counter: u64,
}

/// Scripted fake of the Deriv API
#[derive(Clone)]
pub struct FakeDeriv {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDeriv {
    pub fn new() -> Self {
        let state = FakeState {
            balance: dec!(500),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Refuse the next `count` open attempts
    pub fn fail_next_opens(&self, count: usize) {
        self.lock().fail_next_opens = count;
    }

    /// Never answer requests of this kind (`"ticks"`, `"ping"`, ...)
    pub fn go_silent_on(&self, kind: &str) {
        self.lock().silent.insert(kind.to_string());
    }

    pub fn answer(&self, kind: &str) {
        self.lock().silent.remove(kind);
    }

    /// Answer requests of this kind with an error payload
    pub fn reject(&self, kind: &str) {
        self.lock().rejected.insert(kind.to_string());
    }

    pub fn allow(&self, kind: &str) {
        self.lock().rejected.remove(kind);
    }

    /// Right after answering a `"ticks"` or `"balance"` request, push a
    /// second message for the same stream carrying `value`
    pub fn follow_up(&self, kind: &str, value: Decimal) {
        self.lock().follow_ups.insert(kind.to_string(), value);
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.lock().balance = balance;
    }

    pub fn open_attempts(&self) -> usize {
        self.lock().open_attempts
    }

    /// Every frame received, across all connections
    pub fn frames(&self) -> Vec<Value> {
        self.lock().frames.clone()
    }

    /// Request kind of every frame received, in order
    pub fn kinds(&self) -> Vec<String> {
        self.frames().iter().map(request_kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| *k == kind).count()
    }

    /// Send a raw text frame on the current connection
    pub fn push_raw(&self, text: &str) {
        let state = self.lock();
        if let Some(events) = state.events.as_ref() {
            let _ = events.try_send(TransportEvent::Message(text.to_string()));
        }
    }

    /// Push a tick for `symbol` on the current connection
    pub fn push_tick(&self, symbol: &str, quote: Decimal) {
        self.push_raw(&tick_push(symbol, quote).to_string());
    }

    pub fn push_balance(&self, balance: Decimal) {
        self.push_raw(&balance_push(balance).to_string());
    }

    /// Simulate the server dropping the current transport
    pub fn drop_connection(&self) {
        let events = {
            let mut state = self.lock();
            state.connection_id += 1;
            state.events.take()
        };
        if let Some(events) = events {
            let _ = events.try_send(TransportEvent::Closed {
                reason: Some("server went away".to_string()),
            });
        }
    }

    /// Frames sent back for one client frame, in wire order
    fn respond(&self, connection_id: u64, frame: Value) -> Vec<Value> {
        let mut state = self.lock();
        if state.connection_id != connection_id {
            return Vec::new();
        }

        state.frames.push(frame.clone());
        let kind = request_kind(&frame);
        if state.silent.contains(&kind) {
            return Vec::new();
        }

        let req_id = frame.get("req_id").cloned();
        let mut response = if state.rejected.contains(&kind) {
            json!({
                "msg_type": kind,
                "error": {"code": "InputValidationFailed", "message": format!("{} rejected", kind)}
            })
        } else {
            match kind.as_str() {
                "authorize" => {
                    if frame["authorize"] == VALID_TOKEN {
                        json!({
                            "msg_type": "authorize",
                            "authorize": {"loginid": "CR123", "currency": "USD"}
                        })
                    } else {
                        json!({
                            "msg_type": "authorize",
                            "error": {"code": "InvalidToken", "message": "The token is invalid."}
                        })
                    }
                }
                "balance" => {
                    state.subscription_counter += 1;
                    json!({
                        "msg_type": "balance",
                        "balance": {"balance": state.balance.to_string().parse::<f64>().unwrap(), "currency": "USD"},
                        "subscription": {"id": format!("bal-{}", state.subscription_counter)}
                    })
                }
                "ticks" => {
                    state.subscription_counter += 1;
                    json!({
                        "msg_type": "tick",
                        "tick": {"symbol": frame["ticks"], "quote": 1000.01, "epoch": 1704067200},
                        "subscription": {"id": format!("tick-{}", state.subscription_counter)}
                    })
                }
                "forget" => json!({"msg_type": "forget", "forget": 1}),
                "ping" => json!({"msg_type": "ping", "ping": "pong"}),
                "proposal" => json!({
                    "msg_type": "proposal",
                    "proposal": {"id": "prop-1", "ask_price": frame["amount"], "payout": 9.5}
                }),
                "buy" => json!({
                    "msg_type": "buy",
                    "buy": {"contract_id": 250046137788u64, "buy_price": frame["price"], "balance_after": 495}
                }),
                other => json!({
                    "msg_type": other,
                    "error": {"code": "UnrecognisedRequest", "message": "Unrecognised request"}
                }),
            }
        };

        if let (Some(object), Some(req_id)) = (response.as_object_mut(), req_id) {
            object.insert("req_id".to_string(), req_id);
        }

        let follow_up = match (kind.as_str(), state.follow_ups.get(&kind)) {
            _ if response.get("error").is_some() => None,
            ("ticks", Some(quote)) => frame["ticks"].as_str().map(|symbol| tick_push(symbol, *quote)),
            ("balance", Some(balance)) => Some(balance_push(*balance)),
            _ => None,
        };
        std::iter::once(response).chain(follow_up).collect()
    }
}

#[async_trait]
impl Connector for FakeDeriv {
    async fn open(&self, _url: &str) -> Result<TransportChannels> {
        let (connection_id, events_tx, events_rx) = {
            let mut state = self.lock();
            state.open_attempts += 1;
            if state.fail_next_opens > 0 {
                state.fail_next_opens -= 1;
                return Err(ClientError::ConnectFailed("connection refused".to_string()));
            }

            state.connection_id += 1;
            let (tx, rx) = create_event_channel_with_size(256);
            state.events = Some(tx.clone());
            (state.connection_id, tx, rx)
        };

        let (outbound_tx, mut outbound_rx) = create_outbound_channel();
        let fake = self.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                let frame: Value = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };
                for response in fake.respond(connection_id, frame) {
                    if events_tx
                        .send(TransportEvent::Message(response.to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });

        Ok(TransportChannels {
            outbound: outbound_tx,
            inbound: events_rx,
        })
    }
}

fn tick_push(symbol: &str, quote: Decimal) -> Value {
    json!({
        "msg_type": "tick",
        "tick": {"symbol": symbol, "quote": quote.to_string().parse::<f64>().unwrap(), "epoch": 1704067200},
        "subscription": {"id": "push"}
    })
}

fn balance_push(balance: Decimal) -> Value {
    json!({
        "msg_type": "balance",
        "balance": {"balance": balance.to_string().parse::<f64>().unwrap(), "currency": "USD"},
        "subscription": {"id": "bal-push"}
    })
}

/// Name of the request carried by a client frame
pub fn request_kind(frame: &Value) -> String {
    const KINDS: [&str; 7] = ["authorize", "balance", "ticks", "forget", "ping", "proposal", "buy"];
    KINDS
        .iter()
        .find(|k| frame.get(**k).is_some())
        .map(|k| k.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Connection settings with short timings for tests
pub fn fast_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::new("ws://fake.deriv.test/websockets/v3?app_id=1089");
    config.connect_timeout = Duration::from_millis(500);
    config.request_timeout = Duration::from_millis(300);
    config.heartbeat_interval = Duration::from_secs(3600);
    config.reconnect = ReconnectPolicy::fixed(Duration::from_millis(50));
    config
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time: {}", what);
}
