//! Session registry and dispatch loop.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::NotificationError;
use crate::handler::{EventHandler, SubscriptionId};
use crate::transport::{SessionLink, SessionTransport};
use crate::types::{Envelope, EventType, Notification};

/// Default timeout for a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of notifications waiting for the dispatch loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub reconnect: ReconnectPolicy,
    pub handler_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// The link dropped and a background reconnect is running.
    Reconnecting,
    /// Reconnecting gave up. A fresh `connect` revives the session.
    Down,
}

struct Subscription {
    id: SubscriptionId,
    event_type: EventType,
    handler: Option<Arc<dyn EventHandler>>,
}

struct Session {
    state: SessionState,
    link: Option<Arc<dyn SessionLink>>,
    subscriptions: Vec<Subscription>,
    // Bumped whenever a link is installed so stale reconnects can tell.
    epoch: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Down,
            link: None,
            subscriptions: Vec::new(),
            epoch: 0,
        }
    }

    fn is_live(&self) -> bool {
        self.state == SessionState::Connected && self.link.as_ref().is_some_and(|l| l.is_open())
    }
}

struct Inner {
    config: DispatcherConfig,
    transport: Arc<dyn SessionTransport>,
    sessions: RwLock<HashMap<String, Session>>,
    next_subscription: AtomicU64,
}

/// Fans notifications out to connected users.
///
/// The dispatcher has an explicit lifecycle: `publish` fails with
/// `NotRunning` until [`start`](Self::start) is called, and
/// [`stop`](Self::stop) drains the queue and drops every session.
pub struct NotificationDispatcher {
    inner: Arc<Inner>,
    queue: Mutex<Option<mpsc::Sender<Notification>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    pub fn new(config: DispatcherConfig, transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                sessions: RwLock::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
            }),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    // ==================== Lifecycle ====================

    /// Spawns the dispatch loop. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut queue = self.queue.lock();
        if queue.is_some() {
            return;
        }

        let (sender, mut receiver) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                let delivered = inner.fan_out(&notification);
                debug!(
                    event_type = %notification.event_type,
                    delivered = delivered,
                    "Notification dispatched"
                );
            }
            debug!("Dispatch queue closed");
        });

        *queue = Some(sender);
        *self.worker.lock() = Some(handle);
        info!("Notification dispatcher started");
    }

    /// Stops accepting notifications, delivers what is already queued and
    /// closes every session.
    pub async fn stop(&self) {
        let sender = self.queue.lock().take();
        let worker = self.worker.lock().take();
        drop(sender);

        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            error!(error = %e, "Dispatch loop terminated abnormally");
        }

        let sessions = std::mem::take(&mut *self.inner.sessions.write());
        info!(sessions = sessions.len(), "Notification dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.queue.lock().is_some()
    }

    // ==================== Sessions ====================

    /// Opens a session for `user_id`, retrying with the reconnect policy.
    ///
    /// Connecting a user whose session is already live is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::ChannelDown` once every attempt failed.
    pub async fn connect(&self, user_id: &str) -> Result<(), NotificationError> {
        if self.is_connected(user_id) {
            debug!(user_id = user_id, "Session already connected");
            return Ok(());
        }

        let link = self.inner.open_with_backoff(user_id).await?;

        let mut sessions = self.inner.sessions.write();
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(Session::new);
        if !session.is_live() {
            session.epoch += 1;
            session.link = Some(link);
            session.state = SessionState::Connected;
        }
        info!(user_id = user_id, "Session connected");
        Ok(())
    }

    /// Drops the session and its subscriptions. Returns `false` if there was
    /// none.
    pub fn disconnect(&self, user_id: &str) -> bool {
        let removed = self.inner.sessions.write().remove(user_id).is_some();
        if removed {
            info!(user_id = user_id, "Session disconnected");
        }
        removed
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.inner
            .sessions
            .read()
            .get(user_id)
            .is_some_and(Session::is_live)
    }

    pub fn session_state(&self, user_id: &str) -> Option<SessionState> {
        self.inner.sessions.read().get(user_id).map(|s| s.state)
    }

    pub fn connected_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| session.is_live())
            .map(|(user_id, _)| user_id.clone())
            .collect();
        users.sort();
        users
    }

    // ==================== Subscriptions ====================

    /// Routes events of `event_type` to the user's session link.
    pub fn subscribe(
        &self,
        user_id: &str,
        event_type: EventType,
    ) -> Result<SubscriptionId, NotificationError> {
        self.add_subscription(user_id, event_type, None)
    }

    /// Like [`subscribe`](Self::subscribe), additionally running `handler`
    /// whenever the session receives a matching event.
    pub fn subscribe_with_handler(
        &self,
        user_id: &str,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, NotificationError> {
        self.add_subscription(user_id, event_type, Some(handler))
    }

    pub fn unsubscribe(&self, user_id: &str, subscription_id: SubscriptionId) -> bool {
        let mut sessions = self.inner.sessions.write();
        let Some(session) = sessions.get_mut(user_id) else {
            return false;
        };
        let before = session.subscriptions.len();
        session.subscriptions.retain(|s| s.id != subscription_id);
        before != session.subscriptions.len()
    }

    /// Event types the user is subscribed to, in subscription order.
    pub fn subscriptions(&self, user_id: &str) -> Vec<(SubscriptionId, EventType)> {
        self.inner
            .sessions
            .read()
            .get(user_id)
            .map(|session| {
                session
                    .subscriptions
                    .iter()
                    .map(|s| (s.id, s.event_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn add_subscription(
        &self,
        user_id: &str,
        event_type: EventType,
        handler: Option<Arc<dyn EventHandler>>,
    ) -> Result<SubscriptionId, NotificationError> {
        let mut sessions = self.inner.sessions.write();
        let session = sessions
            .get_mut(user_id)
            .ok_or_else(|| NotificationError::SessionNotFound(user_id.to_string()))?;

        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        session.subscriptions.push(Subscription {
            id,
            event_type,
            handler,
        });
        debug!(user_id = user_id, subscription = %id, event_type = %event_type, "Subscribed");
        Ok(id)
    }

    // ==================== Publishing ====================

    /// Queues a notification for fan-out without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` before `start` or after `stop`, and `QueueFull`
    /// when the dispatch loop is behind.
    pub fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        let queue = self.queue.lock();
        let sender = queue.as_ref().ok_or(NotificationError::NotRunning)?;
        sender.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(n) => {
                warn!(event_type = %n.event_type, "Dispatch queue full, notification dropped");
                NotificationError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => NotificationError::NotRunning,
        })
    }
}

impl Inner {
    async fn open_with_backoff(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn SessionLink>, NotificationError> {
        let policy = self.config.reconnect;
        let attempts = policy.max_attempts.max(1);

        for attempt in 0..attempts {
            match self.transport.open(user_id).await {
                Ok(link) => return Ok(Arc::from(link)),
                Err(e) => {
                    debug!(
                        user_id = user_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Session open failed"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        warn!(user_id = user_id, attempts = attempts, "Notification channel down");
        Err(NotificationError::ChannelDown {
            user_id: user_id.to_string(),
            attempts,
        })
    }

    /// Delivers to every live session that matches. Returns the number of
    /// sessions the envelope was handed to.
    fn fan_out(self: &Arc<Self>, notification: &Notification) -> usize {
        let envelope = notification.envelope();
        let mut delivered = 0;
        let mut dropped = Vec::new();
        let mut handlers = Vec::new();

        {
            let sessions = self.sessions.read();
            for (user_id, session) in sessions.iter() {
                if !notification.audience.includes(user_id) {
                    continue;
                }
                let mut matching = session
                    .subscriptions
                    .iter()
                    .filter(|s| s.event_type == notification.event_type)
                    .peekable();
                if matching.peek().is_none() {
                    continue;
                }
                let Some(link) = session
                    .link
                    .as_ref()
                    .filter(|_| session.state == SessionState::Connected)
                else {
                    continue;
                };

                match link.send(&envelope) {
                    Ok(()) => {
                        delivered += 1;
                        handlers.extend(
                            matching
                                .filter_map(|s| s.handler.clone())
                                .map(|h| (user_id.clone(), h)),
                        );
                    }
                    Err(e) if e.is_link_closed() => dropped.push((user_id.clone(), session.epoch)),
                    Err(e) => warn!(user_id = %user_id, error = %e, "Notification not delivered"),
                }
            }
        }

        for (user_id, epoch) in dropped {
            self.reconnect_in_background(&user_id, epoch);
        }
        for (user_id, handler) in handlers {
            self.spawn_handler(user_id, handler, envelope.clone());
        }

        delivered
    }

    fn reconnect_in_background(self: &Arc<Self>, user_id: &str, epoch: u64) {
        {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(user_id) else {
                return;
            };
            if session.epoch != epoch || session.state != SessionState::Connected {
                return;
            }
            session.state = SessionState::Reconnecting;
            session.link = None;
        }
        warn!(user_id = user_id, "Session link dropped, reconnecting");

        let inner = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            let result = inner.open_with_backoff(&user_id).await;

            let mut sessions = inner.sessions.write();
            let Some(session) = sessions.get_mut(&user_id) else {
                return;
            };
            // A manual connect or disconnect happened meanwhile.
            if session.epoch != epoch || session.state != SessionState::Reconnecting {
                return;
            }
            match result {
                Ok(link) => {
                    session.epoch += 1;
                    session.link = Some(link);
                    session.state = SessionState::Connected;
                    info!(user_id = %user_id, "Session reconnected");
                }
                Err(e) => {
                    session.state = SessionState::Down;
                    error!(user_id = %user_id, error = %e, "Session reconnect failed");
                }
            }
        });
    }

    fn spawn_handler(&self, user_id: String, handler: Arc<dyn EventHandler>, envelope: Envelope) {
        let timeout = self.config.handler_timeout;

        tokio::spawn(async move {
            let handler_name = handler.name().to_string();

            let result = tokio::time::timeout(timeout, async {
                AssertUnwindSafe(handler.handle(&user_id, &envelope))
                    .catch_unwind()
                    .await
            })
            .await;

            match result {
                Ok(Ok(Ok(()))) => {
                    debug!(handler = %handler_name, user_id = %user_id, "Handler finished");
                }
                Ok(Ok(Err(e))) => {
                    warn!(
                        handler = %handler_name,
                        user_id = %user_id,
                        error = %e,
                        "Handler failed"
                    );
                }
                Ok(Err(panic)) => {
                    let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(
                        handler = %handler_name,
                        user_id = %user_id,
                        panic = %panic_msg,
                        "Handler panicked"
                    );
                }
                Err(_) => {
                    error!(
                        handler = %handler_name,
                        user_id = %user_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Handler timed out"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            reconnect: ReconnectPolicy::new(Duration::from_millis(2), Duration::from_millis(8), 3),
            handler_timeout: Duration::from_millis(50),
            queue_capacity: 16,
        }
    }

    fn dispatcher() -> (Arc<ChannelTransport>, NotificationDispatcher) {
        let transport = Arc::new(ChannelTransport::new(16));
        let dispatcher = NotificationDispatcher::new(fast_config(), transport.clone());
        (transport, dispatcher)
    }

    async fn recv(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("envelope not delivered")
            .expect("channel closed")
    }

    async fn assert_silent(rx: &mut mpsc::Receiver<Envelope>) {
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    struct CountingTransport {
        inner: ChannelTransport,
        opens: AtomicU32,
    }

    #[async_trait]
    impl SessionTransport for CountingTransport {
        async fn open(&self, user_id: &str) -> Result<Box<dyn SessionLink>, NotificationError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(user_id).await
        }
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_policy_attempts() {
        let transport = Arc::new(CountingTransport {
            inner: ChannelTransport::new(4),
            opens: AtomicU32::new(0),
        });
        let dispatcher = NotificationDispatcher::new(fast_config(), transport.clone());

        let err = dispatcher.connect("ghost").await.unwrap_err();
        assert!(err.is_channel_down());
        assert_eq!(transport.opens.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.session_state("ghost"), None);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let transport = Arc::new(CountingTransport {
            inner: ChannelTransport::new(4),
            opens: AtomicU32::new(0),
        });
        let _rx = transport.inner.attach("u1");
        let dispatcher = NotificationDispatcher::new(fast_config(), transport.clone());

        dispatcher.connect("u1").await.unwrap();
        dispatcher.connect("u1").await.unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.connected_users(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_requires_running_dispatcher() {
        let (_, dispatcher) = dispatcher();
        let n = Notification::new(EventType::StatusUpdate, json!({}), "x");
        assert!(matches!(
            dispatcher.publish(n.clone()),
            Err(NotificationError::NotRunning)
        ));

        dispatcher.start();
        assert!(dispatcher.is_running());
        dispatcher.publish(n.clone()).unwrap();

        dispatcher.stop().await;
        assert!(matches!(dispatcher.publish(n), Err(NotificationError::NotRunning)));
    }

    #[tokio::test]
    async fn test_subscribe_requires_session() {
        let (_, dispatcher) = dispatcher();
        let err = dispatcher
            .subscribe("nobody", EventType::CaseAssigned)
            .unwrap_err();
        assert!(matches!(err, NotificationError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_fan_out_matches_subscription_and_audience() {
        let (transport, dispatcher) = dispatcher();
        let mut rx_a = transport.attach("a");
        let mut rx_b = transport.attach("b");
        dispatcher.connect("a").await.unwrap();
        dispatcher.connect("b").await.unwrap();
        dispatcher.subscribe("a", EventType::CaseAssigned).unwrap();
        dispatcher.subscribe("b", EventType::StatusUpdate).unwrap();
        dispatcher.start();

        dispatcher
            .publish(Notification::new(EventType::CaseAssigned, json!({"caseId": "c1"}), "assigned"))
            .unwrap();
        assert_eq!(recv(&mut rx_a).await.payload["caseId"], "c1");
        assert_silent(&mut rx_b).await;

        dispatcher
            .publish(
                Notification::new(EventType::StatusUpdate, json!({}), "for b only").to_users(["b"]),
            )
            .unwrap();
        assert_eq!(recv(&mut rx_b).await.message, "for b only");
        assert_silent(&mut rx_a).await;

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (transport, dispatcher) = dispatcher();
        let mut rx = transport.attach("a");
        dispatcher.connect("a").await.unwrap();
        let id = dispatcher.subscribe("a", EventType::ResourceUpdate).unwrap();
        dispatcher.start();

        assert!(dispatcher.unsubscribe("a", id));
        assert!(!dispatcher.unsubscribe("a", id));
        dispatcher
            .publish(Notification::new(EventType::ResourceUpdate, json!({}), "beds"))
            .unwrap();
        assert_silent(&mut rx).await;

        dispatcher.stop().await;
    }

    struct Recorder(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, user_id: &str, envelope: &Envelope) -> Result<(), NotificationError> {
            let _ = self.0.send(format!("{user_id}:{}", envelope.message));
            Ok(())
        }
    }

    struct Panicker;

    #[async_trait]
    impl EventHandler for Panicker {
        async fn handle(&self, _: &str, _: &Envelope) -> Result<(), NotificationError> {
            panic!("handler exploded");
        }
    }

    struct Sleeper;

    #[async_trait]
    impl EventHandler for Sleeper {
        async fn handle(&self, _: &str, _: &Envelope) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_misbehaving_handlers_do_not_block_dispatch() {
        let (transport, dispatcher) = dispatcher();
        let mut rx = transport.attach("a");
        dispatcher.connect("a").await.unwrap();

        let (tx, mut handled) = mpsc::unbounded_channel();
        dispatcher
            .subscribe_with_handler("a", EventType::StatusUpdate, Arc::new(Panicker))
            .unwrap();
        dispatcher
            .subscribe_with_handler("a", EventType::StatusUpdate, Arc::new(Sleeper))
            .unwrap();
        dispatcher
            .subscribe_with_handler("a", EventType::StatusUpdate, Arc::new(Recorder(tx)))
            .unwrap();
        dispatcher.start();

        for message in ["first", "second"] {
            dispatcher
                .publish(Notification::new(EventType::StatusUpdate, json!({}), message))
                .unwrap();
        }

        assert_eq!(recv(&mut rx).await.message, "first");
        assert_eq!(recv(&mut rx).await.message, "second");

        let mut seen = vec![handled.recv().await.unwrap(), handled.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["a:first".to_string(), "a:second".to_string()]);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_dropped_link_reconnects_in_background() {
        let (transport, dispatcher) = dispatcher();
        let rx = transport.attach("a");
        dispatcher.connect("a").await.unwrap();
        dispatcher.subscribe("a", EventType::CaseAssigned).unwrap();
        dispatcher.start();

        // Socket goes away and the client comes back on a new one.
        drop(rx);
        let mut rx = transport.attach("a");

        dispatcher
            .publish(Notification::new(EventType::CaseAssigned, json!({}), "lost"))
            .unwrap();

        let mut reconnected = false;
        for _ in 0..100 {
            if dispatcher.is_connected("a") {
                reconnected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(reconnected);

        dispatcher
            .publish(Notification::new(EventType::CaseAssigned, json!({}), "after"))
            .unwrap();
        assert_eq!(recv(&mut rx).await.message, "after");
        assert_eq!(dispatcher.subscriptions("a").len(), 1);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_and_marks_down() {
        let (transport, dispatcher) = dispatcher();
        let rx = transport.attach("a");
        dispatcher.connect("a").await.unwrap();
        dispatcher.subscribe("a", EventType::CaseAssigned).unwrap();
        dispatcher.start();

        drop(rx);
        transport.detach("a");
        dispatcher
            .publish(Notification::new(EventType::CaseAssigned, json!({}), "lost"))
            .unwrap();

        let mut down = false;
        for _ in 0..100 {
            if dispatcher.session_state("a") == Some(SessionState::Down) {
                down = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(down);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drains_queue_and_clears_sessions() {
        let (transport, dispatcher) = dispatcher();
        let mut rx = transport.attach("a");
        dispatcher.connect("a").await.unwrap();
        dispatcher.subscribe("a", EventType::ResourceUpdate).unwrap();
        dispatcher.start();

        for i in 0..3 {
            dispatcher
                .publish(Notification::new(EventType::ResourceUpdate, json!({"i": i}), "beds"))
                .unwrap();
        }
        dispatcher.stop().await;

        for i in 0..3 {
            assert_eq!(recv(&mut rx).await.payload["i"], i);
        }
        assert!(dispatcher.connected_users().is_empty());
        assert!(!dispatcher.disconnect("a"));
    }
}
