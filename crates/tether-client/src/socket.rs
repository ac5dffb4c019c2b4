//! The connection itself: send pipeline, correlation, lifecycle.
//!
//! One `Socket` owns one duplex wire. Outbound frames go through an
//! unbounded lock-free queue drained by a single worker, so concurrent
//! senders never interleave on the wire and frames leave in `send` order.
//! Inbound frames are classified by the reader task in `dispatch` and
//! handled on independent tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::config::SocketConfig;
use crate::dispatch;
use crate::error::DispatchError;
use crate::events::{EventReceiver, EventSink, SocketEvent};
use crate::handlers::{BindingId, HandlerTable, Routes};
use crate::pending::PendingReplies;
use tether_protocol::{codec, EncodeError, Routable, RouteRegistry};
use tether_transport::{WireReceiver, WireSender};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// The transport is being opened.
    Connecting,
    /// Frames flow.
    Open,
    /// The connection ended; sends are discarded.
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// A live connection over a duplex JSON-envelope wire.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct Socket {
    shared: Arc<SocketShared>,
}

pub(crate) struct SocketShared {
    pub(crate) registry: Arc<RouteRegistry>,
    pub(crate) handlers: HandlerTable,
    pub(crate) pending: PendingReplies,
    pub(crate) events: EventSink,
    queue: SegQueue<String>,
    draining: AtomicBool,
    closed_emitted: AtomicBool,
    next_id: AtomicU64,
    state: AtomicU8,
    wire: Option<Arc<dyn WireSender>>,
    reply_timeout: Option<std::time::Duration>,
}

impl Socket {
    /// Open a WebSocket connection and start the engine.
    ///
    /// The transport is opened before this returns. A connect failure does
    /// not panic or return an error: it surfaces as
    /// [`SocketEvent::ReceiveError`] and leaves the socket [`Closed`]
    /// (sends are then dropped by the drain loop's wire check).
    ///
    /// [`Closed`]: SocketState::Closed
    pub async fn connect(
        config: SocketConfig,
        routes: Routes,
        registry: Arc<RouteRegistry>,
    ) -> (Self, EventReceiver) {
        let (events, event_rx) = EventSink::channel();
        let url = config.connect_url();

        let socket = match tether_transport::websocket::connect(&url).await {
            Ok((sender, receiver)) => Self::start(
                Arc::new(sender),
                Box::new(receiver),
                routes,
                registry,
                &config,
                events,
            ),
            Err(e) => {
                warn!(error = %e, "transport open failed");
                events.emit(SocketEvent::ReceiveError(e));
                Self::unconnected(routes, registry, &config, events)
            }
        };

        (socket, event_rx)
    }

    /// Start the engine over an already-open wire.
    ///
    /// This is how tests and non-WebSocket transports plug in.
    pub fn over(
        sender: impl WireSender + 'static,
        receiver: impl WireReceiver + 'static,
        routes: Routes,
        registry: Arc<RouteRegistry>,
        config: &SocketConfig,
    ) -> (Self, EventReceiver) {
        let (events, event_rx) = EventSink::channel();
        let socket = Self::start(
            Arc::new(sender),
            Box::new(receiver),
            routes,
            registry,
            config,
            events,
        );
        (socket, event_rx)
    }

    fn start(
        sender: Arc<dyn WireSender>,
        receiver: Box<dyn WireReceiver>,
        routes: Routes,
        registry: Arc<RouteRegistry>,
        config: &SocketConfig,
        events: EventSink,
    ) -> Self {
        let shared = Arc::new(SocketShared {
            registry,
            handlers: routes.into_table(),
            pending: PendingReplies::new(),
            events,
            queue: SegQueue::new(),
            draining: AtomicBool::new(false),
            closed_emitted: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            state: AtomicU8::new(STATE_OPEN),
            wire: Some(sender),
            reply_timeout: config.reply_timeout_duration(),
        });

        tokio::spawn(dispatch::read_loop(Arc::clone(&shared), receiver));

        Self { shared }
    }

    fn unconnected(
        routes: Routes,
        registry: Arc<RouteRegistry>,
        config: &SocketConfig,
        events: EventSink,
    ) -> Self {
        Self {
            shared: Arc::new(SocketShared {
                registry,
                handlers: routes.into_table(),
                pending: PendingReplies::new(),
                events,
                queue: SegQueue::new(),
                draining: AtomicBool::new(false),
                closed_emitted: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                state: AtomicU8::new(STATE_CLOSED),
                wire: None,
                reply_timeout: config.reply_timeout_duration(),
            }),
        }
    }

    /// Queue `message` for transmission, assigning a correlation id if the
    /// payload does not already carry one.
    ///
    /// Returns the id on the wire. Frames are written in `send` call order.
    ///
    /// # Errors
    ///
    /// Only configuration errors: a schema with no route and no explicit
    /// type, or a payload that fails to serialize.
    pub fn send<T: Routable>(&self, message: &T) -> Result<u64, EncodeError> {
        let frame = codec::encode_frame(message, || self.shared.next_id())?;
        trace!(id = frame.id, "queueing frame");
        self.shared.enqueue(frame.text);
        Ok(frame.id)
    }

    /// Like [`send`](Self::send), but registers `callback` to receive the
    /// reply correlated to this request's id.
    ///
    /// The callback runs at most once, on the first frame whose `reply_to`
    /// equals the returned id. The registration is installed before the
    /// frame is queued, so the reply can never beat it. A reply that does
    /// not deserialize to `R` surfaces as a handling error instead.
    ///
    /// # Errors
    ///
    /// Same configuration errors as [`send`](Self::send).
    pub fn send_with_reply<T, R, F>(&self, message: &T, callback: F) -> Result<u64, EncodeError>
    where
        T: Routable,
        R: DeserializeOwned + Send + 'static,
        F: FnOnce(R) + Send + 'static,
    {
        let frame = codec::encode_frame(message, || self.shared.next_id())?;
        let id = frame.id;

        // A frame queued against a dead connection is discarded by the drain
        // loop; registering a continuation or a timeout for it would only
        // report a phantom ReplyTimedOut later.
        if self.shared.can_transmit() {
            let events = self.shared.events.clone();
            self.shared.pending.insert(
                id,
                Box::new(move |raw| match serde_json::from_str::<R>(raw) {
                    Ok(reply) => callback(reply),
                    Err(source) => events.emit(SocketEvent::HandlingError(
                        DispatchError::ReplyDecode { id, source },
                    )),
                }),
            );

            if let Some(timeout) = self.shared.reply_timeout {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if shared.pending.take(id).is_some() {
                        debug!(id, "request timed out waiting for a reply");
                        shared
                            .events
                            .emit(SocketEvent::HandlingError(DispatchError::ReplyTimedOut {
                                id,
                                timeout_ms: timeout.as_millis() as u64,
                            }));
                    }
                });
            }
        }

        trace!(id, "queueing request with reply callback");
        self.shared.enqueue(frame.text);
        Ok(id)
    }

    /// Register `callback` for every route key `T` declares, composing with
    /// any callbacks already there (multicast, registration order).
    pub fn bind<T, F>(&self, callback: F) -> BindingId
    where
        T: Routable,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.shared.handlers.bind::<T, F>(callback)
    }

    /// Remove the callback registered under `binding`, leaving other
    /// callbacks at the same keys intact.
    pub fn unbind<T: Routable>(&self, binding: BindingId) {
        self.shared.handlers.unbind::<T>(binding);
    }

    /// Close the connection. Idempotent: only the first call (or the wire
    /// ending first) emits [`SocketEvent::Closed`].
    pub async fn close(&self) {
        self.shared.set_state(SocketState::Closed);
        if let Some(wire) = &self.shared.wire {
            // Transport close errors are not interesting once we are
            // tearing down.
            if let Err(e) = wire.close().await {
                trace!(error = %e, "transport close reported an error");
            }
        }
        self.shared.emit_closed();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.shared.socket_state()
    }

    /// Whether the connection is open for sending.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.can_transmit()
    }
}

impl SocketShared {
    fn can_transmit(&self) -> bool {
        self.socket_state() == SocketState::Open
            && self.wire.as_ref().is_some_and(|w| w.is_open())
    }

    fn next_id(&self) -> u64 {
        // Monotonic, starting at 1, never reused.
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Push a frame and make sure a drain worker is running. The activation
    /// check happens after the push for every caller, so a worker that just
    /// gave up cannot strand this frame.
    fn enqueue(self: &Arc<Self>, frame: String) {
        self.queue.push(frame);
        self.kick_drain();
    }

    fn kick_drain(self: &Arc<Self>) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                shared.drain().await;
            });
        }
    }

    /// The single active consumer of the outbound queue. Writes frames in
    /// queue order; frames popped while the connection is not open are
    /// discarded.
    async fn drain(&self) {
        loop {
            while let Some(frame) = self.queue.pop() {
                let Some(wire) = &self.wire else {
                    continue;
                };
                if self.socket_state() != SocketState::Open || !wire.is_open() {
                    trace!("discarding frame queued on a non-open connection");
                    continue;
                }
                if let Err(e) = wire.send_text(frame).await {
                    warn!(error = %e, "write failed");
                    self.events.emit(SocketEvent::ReceiveError(e));
                }
            }

            self.draining.store(false, Ordering::Release);

            // A producer may have pushed between the final pop and the flag
            // clearing; reclaim the flag rather than strand the frame.
            if self.queue.is_empty()
                || self
                    .draining
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }

    pub(crate) fn socket_state(&self) -> SocketState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => SocketState::Connecting,
            STATE_OPEN => SocketState::Open,
            _ => SocketState::Closed,
        }
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        let raw = match state {
            SocketState::Connecting => STATE_CONNECTING,
            SocketState::Open => STATE_OPEN,
            SocketState::Closed => STATE_CLOSED,
        };
        self.state.store(raw, Ordering::SeqCst);
    }

    /// Single-winner notification: no matter how many times the connection
    /// is closed, `Closed` is emitted exactly once.
    pub(crate) fn emit_closed(&self) {
        if self
            .closed_emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("connection closed");
            self.events.emit(SocketEvent::Closed);
        }
    }
}
