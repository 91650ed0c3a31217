//! Connection hub
//!
//! Owns the set of live duplex connections. Every registered connection gets
//! its own receive loop that feeds inbound payloads into a single [`Event`]
//! stream; broadcasts go out to every member under one coarse lock.
//!
//! The coarse lock is held for the whole fan-out, so a stalled connection
//! stalls every broadcast behind it. Observer counts are small and a
//! broadcast never interleaves with an add or remove.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::HubError;

/// Default capacity of the inbound event stream
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Identity of a connection registered with the hub
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One inbound message, tagged with the connection it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub source: ConnectionId,
    pub payload: Vec<u8>,
}

/// Result of a broadcast: how many sends were tried and how many failed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

struct Member {
    conn: Arc<dyn Connection>,
    cancel: CancellationToken,
}

struct HubInner {
    members: Mutex<HashMap<ConnectionId, Member>>,
    next_id: AtomicU64,
    events_tx: mpsc::Sender<Event>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<Event>>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// Fan-out / fan-in hub for duplex connections.
///
/// Cloning is cheap; clones share the same membership set and event stream.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Hub {
    /// Create a hub whose inbound event stream buffers up to `event_capacity`
    /// events before receive loops wait for the consumer.
    pub fn new(event_capacity: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                members: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                events_tx,
                events_rx: std::sync::Mutex::new(Some(events_rx)),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Register a connection and start its receive loop.
    ///
    /// The same transport cannot be registered twice.
    pub async fn add(&self, conn: Arc<dyn Connection>) -> Result<ConnectionId, HubError> {
        let mut members = self.inner.members.lock().await;
        // Checked under the lock so a concurrent shutdown cannot miss us
        if self.inner.cancel.is_cancelled() {
            return Err(HubError::ShutDown);
        }
        if members
            .values()
            .any(|member| same_transport(&member.conn, &conn))
        {
            return Err(HubError::InvalidArgument(
                "connection is already registered".to_string(),
            ));
        }

        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel = self.inner.cancel.child_token();
        members.insert(
            id,
            Member {
                conn: conn.clone(),
                cancel: cancel.clone(),
            },
        );

        self.inner
            .tasks
            .spawn(receive_loop(self.clone(), id, conn, cancel));

        debug!(%id, members = members.len(), "connection added");
        Ok(id)
    }

    /// Unregister a connection, stop its receive loop and close it.
    ///
    /// Removing an id that is not (or no longer) registered is a no-op.
    /// Returns whether the connection was present.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut members = self.inner.members.lock().await;
        let Some(member) = members.remove(&id) else {
            return false;
        };

        member.cancel.cancel();
        if let Err(e) = member.conn.close().await {
            trace!(%id, "close after remove: {e}");
        }

        debug!(%id, members = members.len(), "connection removed");
        true
    }

    /// Send `payload` to every registered connection.
    ///
    /// Best effort: a failed send is logged and counted, the remaining
    /// members still get the payload and the failing member stays
    /// registered. Removal only follows from its own receive loop failing.
    pub async fn broadcast(&self, payload: &[u8]) -> BroadcastReport {
        let members = self.inner.members.lock().await;
        let mut report = BroadcastReport::default();

        for (id, member) in members.iter() {
            report.attempted += 1;
            if let Err(e) = member.conn.send(payload).await {
                report.failed += 1;
                warn!(%id, "broadcast send failed: {e}");
            }
        }

        trace!(
            attempted = report.attempted,
            failed = report.failed,
            bytes = payload.len(),
            "broadcast complete"
        );
        report
    }

    /// Send `payload` to a single connection, returning the transport error.
    pub async fn send(&self, id: ConnectionId, payload: &[u8]) -> Result<(), HubError> {
        let conn = {
            let members = self.inner.members.lock().await;
            members
                .get(&id)
                .map(|member| member.conn.clone())
                .ok_or(HubError::UnknownConnection(id))?
        };
        conn.send(payload).await
    }

    /// Take the inbound event stream.
    ///
    /// The stream has a single consumer: the first call gets it, later calls
    /// get `None`.
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.inner.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.members.lock().await.is_empty()
    }

    /// Check whether a connection is still registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.members.lock().await.contains_key(&id)
    }

    /// Stop accepting connections, close every member and wait for all
    /// receive loops to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let drained: Vec<(ConnectionId, Member)> = {
            let mut members = self.inner.members.lock().await;
            members.drain().collect()
        };
        let closed = drained.len();
        for (id, member) in drained {
            if let Err(e) = member.conn.close().await {
                trace!(%id, "close on shutdown: {e}");
            }
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!(closed, "hub shut down");
    }
}

/// Reads from one connection until it fails or is cancelled, then removes it.
async fn receive_loop(
    hub: Hub,
    id: ConnectionId,
    conn: Arc<dyn Connection>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = conn.recv() => received,
        };

        let payload = match received {
            Ok(payload) => payload,
            Err(e) => {
                debug!(%id, "receive loop ending: {e}");
                break;
            }
        };

        let event = Event {
            source: id,
            payload,
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = hub.inner.events_tx.send(event) => {
                if sent.is_err() {
                    trace!(%id, "event stream consumer is gone, dropping event");
                }
            }
        }
    }

    hub.remove(id).await;
}

fn same_transport(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    type Inbound = mpsc::UnboundedSender<Result<Vec<u8>, HubError>>;

    /// In-memory transport: inbound messages are fed through a channel,
    /// outbound sends are recorded.
    struct TestConnection {
        inbound: Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>, HubError>>>,
        sent: std::sync::Mutex<Vec<Vec<u8>>>,
        closes: AtomicUsize,
        fail_sends: bool,
    }

    impl TestConnection {
        fn new() -> (Arc<Self>, Inbound) {
            Self::build(false)
        }

        fn failing() -> (Arc<Self>, Inbound) {
            Self::build(true)
        }

        fn build(fail_sends: bool) -> (Arc<Self>, Inbound) {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = Arc::new(Self {
                inbound: Mutex::new(rx),
                sent: std::sync::Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
                fail_sends,
            });
            (conn, tx)
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connection for TestConnection {
        async fn send(&self, payload: &[u8]) -> Result<(), HubError> {
            if self.fail_sends {
                return Err(HubError::SendFailed("broken pipe".to_string()));
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn recv(&self) -> Result<Vec<u8>, HubError> {
            match self.inbound.lock().await.recv().await {
                Some(result) => result,
                None => Err(HubError::ReceiveFailed("peer closed".to_string())),
            }
        }

        async fn close(&self) -> Result<(), HubError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_until_removed(hub: &Hub, id: ConnectionId) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.contains(id).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connection was not removed");
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_membership() {
        let hub = Hub::default();
        let (existing, _existing_tx) = TestConnection::new();
        hub.add(existing).await.unwrap();
        assert_eq!(hub.len().await, 1);

        let (conn, _tx) = TestConnection::new();
        let id = hub.add(conn.clone()).await.unwrap();
        assert_eq!(hub.len().await, 2);

        assert!(hub.remove(id).await);
        assert_eq!(hub.len().await, 1);
        assert!(!hub.contains(id).await);

        // Second remove is a no-op
        assert!(!hub.remove(id).await);
        assert_eq!(hub.len().await, 1);
        assert_eq!(conn.closes(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let hub = Hub::default();
        assert!(!hub.remove(ConnectionId(42)).await);
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_rejects_already_registered_transport() {
        let hub = Hub::default();
        let (conn, _tx) = TestConnection::new();
        hub.add(conn.clone()).await.unwrap();

        let err = hub.add(conn).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidArgument(_)));
        assert_eq!(hub.len().await, 1);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let hub = Hub::default();
        let (a, _a_tx) = TestConnection::new();
        let (b, _b_tx) = TestConnection::new();
        let id_a = hub.add(a).await.unwrap();
        let id_b = hub.add(b).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn test_broadcast_sends_once_to_each_member() {
        let hub = Hub::default();
        let conns: Vec<_> = (0..3).map(|_| TestConnection::new()).collect();
        for (conn, _) in &conns {
            hub.add(conn.clone()).await.unwrap();
        }

        let report = hub.broadcast(b"hello").await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.delivered(), 3);

        for (conn, _) in &conns {
            assert_eq!(conn.sent(), vec![b"hello".to_vec()]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_preserves_call_order() {
        let hub = Hub::default();
        let (conn, _tx) = TestConnection::new();
        hub.add(conn.clone()).await.unwrap();

        hub.broadcast(b"hello").await;
        hub.broadcast(b"gorgeous").await;

        assert_eq!(conn.sent(), vec![b"hello".to_vec(), b"gorgeous".to_vec()]);
    }

    #[tokio::test]
    async fn test_broadcast_targets_membership_at_call_time() {
        let hub = Hub::default();
        let (kept, _kept_tx) = TestConnection::new();
        let (dropped, _dropped_tx) = TestConnection::new();
        hub.add(kept.clone()).await.unwrap();
        let dropped_id = hub.add(dropped.clone()).await.unwrap();
        hub.remove(dropped_id).await;

        let (late, _late_tx) = TestConnection::new();
        hub.add(late.clone()).await.unwrap();

        let report = hub.broadcast(b"status").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(kept.sent().len(), 1);
        assert_eq!(late.sent().len(), 1);
        assert!(dropped.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failed_send() {
        let hub = Hub::default();
        let (good, _good_tx) = TestConnection::new();
        let (bad, _bad_tx) = TestConnection::failing();
        hub.add(good.clone()).await.unwrap();
        let bad_id = hub.add(bad).await.unwrap();

        let report = hub.broadcast(b"x").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(good.sent(), vec![b"x".to_vec()]);

        // A failed send does not unregister the connection
        assert!(hub.contains(bad_id).await);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_members() {
        let hub = Hub::default();
        let report = hub.broadcast(b"nobody").await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_send_returns_transport_error() {
        let hub = Hub::default();
        let (good, _good_tx) = TestConnection::new();
        let (bad, _bad_tx) = TestConnection::failing();
        let good_id = hub.add(good.clone()).await.unwrap();
        let bad_id = hub.add(bad).await.unwrap();

        hub.send(good_id, b"direct").await.unwrap();
        assert_eq!(good.sent(), vec![b"direct".to_vec()]);

        let err = hub.send(bad_id, b"direct").await.unwrap_err();
        assert!(matches!(err, HubError::SendFailed(_)));
        assert!(hub.contains(bad_id).await);
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection() {
        let hub = Hub::default();
        let err = hub.send(ConnectionId(9), b"x").await.unwrap_err();
        assert_eq!(err, HubError::UnknownConnection(ConnectionId(9)));
    }

    #[tokio::test]
    async fn test_inbound_messages_become_events() {
        let hub = Hub::default();
        let mut events = hub.take_events().unwrap();

        let (a, a_tx) = TestConnection::new();
        let (b, b_tx) = TestConnection::new();
        let id_a = hub.add(a).await.unwrap();
        let id_b = hub.add(b).await.unwrap();

        a_tx.send(Ok(b"from a".to_vec())).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            Event {
                source: id_a,
                payload: b"from a".to_vec()
            }
        );

        b_tx.send(Ok(b"from b".to_vec())).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.source, id_b);
        assert_eq!(event.payload, b"from b");
    }

    #[tokio::test]
    async fn test_events_have_a_single_consumer() {
        let hub = Hub::default();
        assert!(hub.take_events().is_some());
        assert!(hub.take_events().is_none());
    }

    #[tokio::test]
    async fn test_receive_error_removes_connection() {
        let hub = Hub::default();
        let (conn, tx) = TestConnection::new();
        let id = hub.add(conn.clone()).await.unwrap();

        tx.send(Err(HubError::ReceiveFailed("reset".to_string())))
            .unwrap();
        wait_until_removed(&hub, id).await;

        assert_eq!(conn.closes(), 1);
        // Explicit remove after the loop already removed it stays a no-op
        assert!(!hub.remove(id).await);
        assert_eq!(conn.closes(), 1);
    }

    #[tokio::test]
    async fn test_peer_close_removes_connection() {
        let hub = Hub::default();
        let (conn, tx) = TestConnection::new();
        let id = hub.add(conn).await.unwrap();

        drop(tx);
        wait_until_removed(&hub, id).await;
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn test_events_keep_flowing_without_consumer() {
        let hub = Hub::new(1);
        drop(hub.take_events());

        let (conn, tx) = TestConnection::new();
        let id = hub.add(conn).await.unwrap();
        for _ in 0..4 {
            tx.send(Ok(b"ignored".to_vec())).unwrap();
        }
        drop(tx);

        // The loop drains every message and then exits on the closed peer
        wait_until_removed(&hub, id).await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_members_and_rejects_new_ones() {
        let hub = Hub::default();
        let (a, _a_tx) = TestConnection::new();
        let (b, _b_tx) = TestConnection::new();
        hub.add(a.clone()).await.unwrap();
        hub.add(b.clone()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), hub.shutdown())
            .await
            .expect("shutdown did not join receive loops");

        assert!(hub.is_empty().await);
        assert_eq!(a.closes(), 1);
        assert_eq!(b.closes(), 1);

        let (late, _late_tx) = TestConnection::new();
        assert_eq!(hub.add(late).await.unwrap_err(), HubError::ShutDown);
    }

    #[tokio::test]
    async fn test_add_waiting_on_lock_sees_shutdown() {
        let hub = Hub::default();
        let guard = hub.inner.members.lock().await;

        let (conn, _tx) = TestConnection::new();
        let adding = tokio::spawn({
            let hub = hub.clone();
            async move { hub.add(conn).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        hub.inner.cancel.cancel();
        drop(guard);

        let result = adding.await.unwrap();
        assert_eq!(result.unwrap_err(), HubError::ShutDown);
        assert!(hub.is_empty().await);
    }
}
