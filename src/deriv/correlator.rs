//! Pairs outgoing requests with their responses over one transport handle
//!
//! Each request gets a fresh `req_id` and a one-shot completion slot held in
//! a table keyed by that id. Exactly one of three things removes the slot:
//! the matching response, the deadline, or teardown of the transport. Removal
//! happens under the table lock, so a slot is resolved at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::codec::{self, Envelope};
use super::messages::Request;
use crate::common::errors::{ClientError, Result};

type Waiter = oneshot::Sender<Result<Envelope>>;

#[derive(Default)]
struct PendingTable {
    waiters: HashMap<u64, Waiter>,
    closed: bool,
}

/// Removes a request's slot when its `send` future finishes or is dropped
struct SlotGuard<'a> {
    correlator: &'a RequestCorrelator,
    req_id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.correlator.lock().waiters.remove(&self.req_id);
    }
}

/// Request/response correlator bound to a single transport handle
pub struct RequestCorrelator {
    next_id: AtomicU64,
    pending: Mutex<PendingTable>,
    outbound: mpsc::Sender<String>,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Create a correlator writing to `outbound` with the given response deadline
    pub fn new(outbound: mpsc::Sender<String>, timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(PendingTable::default()),
            outbound,
            timeout,
        }
    }

    /// Send a request and wait for its response
    ///
    /// Resolves with the response, with the structured error it carries,
    /// with `RequestTimeout` once the deadline passes, or with
    /// `ConnectionReset` when the transport is torn down first.
    pub async fn send(&self, request: &Request) -> Result<Envelope> {
        let req_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = codec::encode(request, Some(req_id))?;
        let (tx, rx) = oneshot::channel();

        {
            let mut table = self.lock();
            if table.closed {
                return Err(ClientError::ConnectionReset);
            }
            table.waiters.insert(req_id, tx);
        }
        // Deregisters on every exit, including the caller dropping this future
        let _slot = SlotGuard {
            correlator: self,
            req_id,
        };

        debug!(req_id, kind = request.kind(), "Sending request");
        if self.outbound.send(frame).await.is_err() {
            return Err(ClientError::ConnectionReset);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Slot dropped without an answer: the table was torn down
            Ok(Err(_)) => Err(ClientError::ConnectionReset),
            Err(_) => {
                warn!(req_id, kind = request.kind(), "Request timed out");
                Err(ClientError::RequestTimeout {
                    req_id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a frame that expects no correlated answer
    pub async fn notify(&self, request: &Request) -> Result<()> {
        let frame = codec::encode(request, None)?;
        self.outbound
            .send(frame)
            .await
            .map_err(|e| ClientError::ChannelSend(e.to_string()))
    }

    /// Hand an inbound envelope to its waiter
    ///
    /// Returns the envelope back when no request is waiting on its id, so the
    /// caller can treat it as a push message.
    pub fn resolve(&self, envelope: Envelope) -> Option<Envelope> {
        let Some(req_id) = envelope.req_id else {
            return Some(envelope);
        };

        let waiter = self.lock().waiters.remove(&req_id);
        match waiter {
            Some(tx) => {
                // Receiver gone means the caller already gave up at its deadline
                let _ = tx.send(envelope.into_result());
                None
            }
            None => Some(envelope),
        }
    }

    /// Fail every outstanding request with `ConnectionReset` and refuse new ones
    pub fn fail_all(&self) -> usize {
        let drained: Vec<Waiter> = {
            let mut table = self.lock();
            table.closed = true;
            table.waiters.drain().map(|(_, tx)| tx).collect()
        };

        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(ClientError::ConnectionReset));
        }
        if count > 0 {
            debug!(count, "Failed pending requests on transport teardown");
        }
        count
    }

    /// Number of requests waiting for a response
    pub fn pending_count(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingTable> {
        // A poisoned table only means a panic elsewhere; the map is still consistent
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn correlator(timeout_ms: u64) -> (Arc<RequestCorrelator>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(RequestCorrelator::new(tx, Duration::from_millis(timeout_ms))),
            rx,
        )
    }

    fn sent_req_id(frame: &str) -> u64 {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["req_id"].as_u64().unwrap()
    }

    fn response(req_id: u64) -> Envelope {
        codec::decode(&format!(
            r#"{{"msg_type": "ping", "ping": "pong", "req_id": {}}}"#,
            req_id
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_response_resolves_request() {
        let (correlator, mut wire) = correlator(1_000);
        let pending = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.send(&Request::ping()).await }
        });

        let frame = wire.recv().await.unwrap();
        assert!(correlator.resolve(response(sent_req_id(&frame))).is_none());

        let envelope = pending.await.unwrap().unwrap();
        assert_eq!(envelope.payload["ping"], "pong");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (correlator, mut wire) = correlator(50);
        for _ in 0..3 {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.send(&Request::ping()).await });
        }

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(sent_req_id(&wire.recv().await.unwrap()));
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_error_payload_surfaces() {
        let (correlator, mut wire) = correlator(1_000);
        let pending = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.send(&Request::authorize("bad")).await }
        });

        let req_id = sent_req_id(&wire.recv().await.unwrap());
        let envelope = codec::decode(&format!(
            r#"{{"msg_type": "authorize", "error": {{"code": "InvalidToken", "message": "nope"}}, "req_id": {}}}"#,
            req_id
        ))
        .unwrap();
        correlator.resolve(envelope);

        assert!(matches!(
            pending.await.unwrap(),
            Err(ClientError::Api { code, .. }) if code == "InvalidToken"
        ));
    }

    #[tokio::test]
    async fn test_timeout_deregisters() {
        let (correlator, mut wire) = correlator(30);
        let result = correlator.send(&Request::ping()).await;
        assert!(matches!(result, Err(ClientError::RequestTimeout { .. })));
        assert_eq!(correlator.pending_count(), 0);

        // A late answer is handed back as an unmatched envelope
        let req_id = sent_req_id(&wire.recv().await.unwrap());
        assert!(correlator.resolve(response(req_id)).is_some());
    }

    #[tokio::test]
    async fn test_teardown_fails_pending() {
        let (correlator, mut wire) = correlator(5_000);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let correlator = correlator.clone();
            handles.push(tokio::spawn(async move {
                correlator.send(&Request::ping()).await
            }));
        }
        for _ in 0..4 {
            wire.recv().await.unwrap();
        }

        assert_eq!(correlator.fail_all(), 4);
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(ClientError::ConnectionReset)
            ));
        }

        // Closed correlators refuse new work
        assert!(matches!(
            correlator.send(&Request::ping()).await,
            Err(ClientError::ConnectionReset)
        ));
    }

    #[tokio::test]
    async fn test_resolution_happens_once() {
        let (correlator, mut wire) = correlator(1_000);
        let pending = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.send(&Request::ping()).await }
        });

        let req_id = sent_req_id(&wire.recv().await.unwrap());
        assert!(correlator.resolve(response(req_id)).is_none());
        // Duplicate answer and a later teardown find nothing to resolve
        assert!(correlator.resolve(response(req_id)).is_some());
        assert_eq!(correlator.fail_all(), 0);

        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_wire_resets() {
        let (correlator, wire) = correlator(1_000);
        drop(wire);
        assert!(matches!(
            correlator.send(&Request::ping()).await,
            Err(ClientError::ConnectionReset)
        ));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_is_deregistered() {
        let (correlator, mut wire) = correlator(5_000);

        // The caller gives up long before the correlator's own deadline
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), correlator.send(&Request::ping())).await;
        assert!(abandoned.is_err());
        assert_eq!(correlator.pending_count(), 0);

        let req_id = sent_req_id(&wire.recv().await.unwrap());
        assert!(correlator.resolve(response(req_id)).is_some());
    }

    #[test]
    fn test_unsolicited_passthrough() {
        let (tx, _rx) = mpsc::channel(1);
        let correlator = RequestCorrelator::new(tx, Duration::from_secs(1));
        let push = codec::decode(r#"{"msg_type": "balance", "balance": {"balance": 10}}"#).unwrap();
        assert!(correlator.resolve(push).is_some());
    }
}
