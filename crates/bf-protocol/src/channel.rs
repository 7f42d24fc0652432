//! Request/response channel over a framed byte stream
//!
//! An [`IpcChannel`] owns a reader task that decodes inbound frames and a
//! writer task that serializes outbound messages. Replies are matched to
//! pending requests by `(message type, correlation id)`; anything that does
//! not match a pending request or a registered handler is ignored.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::FrameCodec;
use crate::correlation::CorrelationId;
use crate::error::{IpcError, ProtocolError};
use crate::message::{Message, MessageType, Request};

type Outbound = mpsc::UnboundedSender<Message>;
type InboundHandler = Arc<dyn Fn(&Message, &Outbound) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    message_type: MessageType,
    id: CorrelationId,
}

struct Shared {
    label: String,
    pending: DashMap<PendingKey, oneshot::Sender<Message>>,
    handlers: DashMap<MessageType, InboundHandler>,
    ready: watch::Sender<bool>,
    connected: watch::Sender<bool>,
}

impl Shared {
    fn dispatch(&self, message: Message, outbound: &Outbound) {
        let message_type = message.message_type();

        if message_type == MessageType::Ready {
            if !self.ready.send_replace(true) {
                tracing::debug!(channel = %self.label, "Peer reported ready");
            }
            return;
        }

        if message.is_reply() {
            if let Some(id) = message.correlation_id() {
                let key = PendingKey {
                    message_type,
                    id: id.clone(),
                };
                if let Some((_, waiter)) = self.pending.remove(&key) {
                    let _ = waiter.send(message);
                    return;
                }
            }
            tracing::trace!(channel = %self.label, %message_type, "Dropping unmatched reply");
            return;
        }

        // Clone out of the map so the shard lock is not held while the handler runs
        let handler = self
            .handlers
            .get(&message_type)
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler(&message, outbound),
            None => {
                tracing::trace!(channel = %self.label, %message_type, "No handler for request")
            }
        }
    }

    fn disconnect(&self) {
        if self.connected.send_replace(false) {
            tracing::debug!(channel = %self.label, "IPC channel disconnected");
        }
        // Dropping the senders wakes every waiter with a disconnect
        self.pending.clear();
    }
}

/// Removes a pending entry however the request future finishes
struct PendingGuard<'a> {
    pending: &'a DashMap<PendingKey, oneshot::Sender<Message>>,
    key: PendingKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

/// Handle for answering one inbound request
///
/// Carries the request's correlation ID so the reply is matched on the
/// other side.
pub struct Responder<R: Request> {
    id: CorrelationId,
    outbound: Outbound,
    _request: PhantomData<fn() -> R>,
}

impl<R: Request> Responder<R> {
    /// Correlation ID of the request being answered
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Send the reply
    pub fn send(self, reply: R::Reply) -> Result<(), IpcError> {
        self.outbound
            .send(R::reply_message(self.id, reply))
            .map_err(|_| IpcError::Disconnected)
    }
}

/// Bidirectional message channel with request/response correlation
pub struct IpcChannel {
    shared: Arc<Shared>,
    outbound: Outbound,
    reader: JoinHandle<()>,
}

impl IpcChannel {
    /// Start a channel over the given byte streams
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (ready, _) = watch::channel(false);
        let (connected, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            label: label.into(),
            pending: DashMap::new(),
            handlers: DashMap::new(),
            ready,
            connected,
        });

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, FrameCodec::new());
            while let Some(message) = outbound_rx.recv().await {
                match sink.send(message).await {
                    Ok(()) => {}
                    Err(e @ (ProtocolError::PayloadTooLarge { .. } | ProtocolError::Serialization(_))) => {
                        tracing::warn!(channel = %writer_shared.label, error = %e, "Dropping outbound message");
                    }
                    Err(e) => {
                        tracing::debug!(channel = %writer_shared.label, error = %e, "IPC write failed");
                        writer_shared.disconnect();
                        break;
                    }
                }
            }
        });

        let reader_shared = Arc::clone(&shared);
        let reader_outbound = outbound.clone();
        let reader = tokio::spawn(async move {
            let mut stream = FramedRead::new(reader, FrameCodec::new());
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => reader_shared.dispatch(message, &reader_outbound),
                    Err(e) => {
                        tracing::debug!(channel = %reader_shared.label, error = %e, "IPC read failed");
                        break;
                    }
                }
            }
            reader_shared.disconnect();
        });

        Self {
            shared,
            outbound,
            reader,
        }
    }

    /// Whether the peer is still attached
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Whether the peer has sent `READY` at any point
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// Resolve once the peer has gone away
    pub async fn closed(&self) {
        let mut connected = self.shared.connected.subscribe();
        let _ = connected.wait_for(|up| !*up).await;
    }

    /// Register the handler for inbound requests of type `R`
    ///
    /// Replaces any handler previously registered for the same type.
    pub fn on_request<R, F>(&self, handler: F)
    where
        R: Request,
        F: Fn(R, Responder<R>) + Send + Sync + 'static,
    {
        let wrapped: InboundHandler = Arc::new(move |message, outbound| {
            if let Some((id, request)) = R::from_message(message) {
                handler(
                    request,
                    Responder {
                        id,
                        outbound: outbound.clone(),
                        _request: PhantomData,
                    },
                );
            }
        });
        self.shared.handlers.insert(R::TYPE, wrapped);
    }

    /// Send a request and wait up to `timeout` for its reply
    ///
    /// On timeout the pending entry is removed, so a late reply is dropped.
    #[track_caller]
    pub fn send_request<R: Request>(
        &self,
        request: R,
        timeout: Duration,
    ) -> impl Future<Output = Result<R::Reply, IpcError>> + '_ {
        let origin = Location::caller();
        async move {
            if !self.is_connected() {
                return Err(IpcError::Disconnected);
            }

            let id = CorrelationId::generate();
            let key = PendingKey {
                message_type: R::TYPE,
                id: id.clone(),
            };
            let (tx, rx) = oneshot::channel();
            self.shared.pending.insert(key.clone(), tx);
            let _guard = PendingGuard {
                pending: &self.shared.pending,
                key,
            };

            self.outbound
                .send(request.into_message(id.clone()))
                .map_err(|_| IpcError::Disconnected)?;

            // The reader may have gone away between the check and the insert
            if !self.is_connected() {
                return Err(IpcError::Disconnected);
            }

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(reply)) => R::from_reply(reply).ok_or(IpcError::UnexpectedReply(R::TYPE)),
                Ok(Err(_)) => Err(IpcError::Disconnected),
                Err(_) => Err(IpcError::Timeout {
                    message_type: R::TYPE,
                    id: Some(id),
                    after: timeout,
                    origin,
                }),
            }
        }
    }

    /// Tell the peer this side is ready
    pub fn send_ready(&self) -> Result<(), IpcError> {
        self.outbound
            .send(Message::Ready { id: None })
            .map_err(|_| IpcError::Disconnected)
    }

    /// Wait up to `timeout` for the peer's `READY`
    ///
    /// Returns immediately if `READY` was already received.
    #[track_caller]
    pub fn wait_for_ready(&self, timeout: Duration) -> impl Future<Output = Result<(), IpcError>> + '_ {
        let origin = Location::caller();
        async move {
            let mut ready = self.shared.ready.subscribe();
            let mut connected = self.shared.connected.subscribe();

            let wait = async {
                let became_ready = async {
                    let _ = ready.wait_for(|ready| *ready).await;
                };
                let went_away = async {
                    let _ = connected.wait_for(|up| !*up).await;
                };
                tokio::select! {
                    biased;
                    _ = became_ready => Ok(()),
                    _ = went_away => Err(IpcError::Disconnected),
                }
            };

            match tokio::time::timeout(timeout, wait).await {
                Ok(result) => result,
                Err(_) => Err(IpcError::Timeout {
                    message_type: MessageType::Ready,
                    id: None,
                    after: timeout,
                    origin,
                }),
            }
        }
    }

    /// Drop every registered handler and fail every pending request
    pub fn remove_all_listeners(&self) {
        self.shared.handlers.clear();
        self.shared.pending.clear();
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
