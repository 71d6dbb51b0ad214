use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use crate::core::{ImportError, Result};
use super::message::{ChannelEvent, OutboundMessage};

type ListenerId = u64;

struct Registry {
    connected: bool,
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<ChannelEvent>>,
}

struct ChannelInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Handle to the one process wide push connection.
///
/// Cloning is cheap and every clone talks to the same connection. Inbound
/// events fan out to every open [`Listener`]; interest in a particular job is
/// expressed by the payloads, not by separate connections.
#[derive(Clone)]
pub struct SharedChannel {
    inner: Arc<ChannelInner>,
}

impl SharedChannel {
    /// Creates the handle plus the receiving end a transport drains to put
    /// outbound messages on the wire.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let inner = ChannelInner {
            registry: Mutex::new(Registry {
                connected: false,
                listeners: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            outbound_tx,
        };

        (Self { inner: Arc::new(inner) }, outbound_rx)
    }

    /// Same lock as `dispatch`: a `Connect` is either seen via
    /// `connected_at_open` or delivered, never both.
    pub fn listen(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut registry = self.inner.registry.lock();
        registry.listeners.insert(id, tx);
        debug!(listener = id, "channel listener registered");

        Listener {
            id,
            connected_at_open: registry.connected,
            channel: self.inner.clone(),
            rx,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.registry.lock().connected
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.lock().listeners.len()
    }

    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(ImportError::NotConnected);
        }

        self.inner
            .outbound_tx
            .send(message)
            .map_err(|_| ImportError::Channel("transport closed".to_string()))
    }

    /// Fan out to every listener
    pub fn dispatch(&self, event: ChannelEvent) {
        let mut registry = self.inner.registry.lock();
        match event {
            ChannelEvent::Connect => registry.connected = true,
            ChannelEvent::Disconnect { .. } => registry.connected = false,
            _ => {}
        }

        trace!(event = event.name(), listeners = registry.listeners.len(), "dispatch");
        registry.listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// One registered interest in the shared channel.
///
/// Dropping (or [`close`](Listener::close)) removes the registration before
/// returning; events already queued for it are dropped with the receiver.
pub struct Listener {
    id: ListenerId,
    connected_at_open: bool,
    channel: Arc<ChannelInner>,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Whether the channel was connected when this listener was registered.
    pub fn connected_at_open(&self) -> bool {
        self.connected_at_open
    }

    pub fn close(self) {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.channel.registry.lock().listeners.remove(&self.id);
        debug!(listener = self.id, "channel listener removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UploadId;

    #[tokio::test]
    async fn test_dispatch_reaches_every_listener() {
        let (channel, _outbound) = SharedChannel::new();
        let mut first = channel.listen();
        let mut second = channel.listen();

        channel.dispatch(ChannelEvent::Connect);

        assert_eq!(first.recv().await, Some(ChannelEvent::Connect));
        assert_eq!(second.recv().await, Some(ChannelEvent::Connect));
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_close_removes_listener_synchronously() {
        let (channel, _outbound) = SharedChannel::new();
        let listener = channel.listen();
        assert_eq!(channel.listener_count(), 1);

        listener.close();
        assert_eq!(channel.listener_count(), 0);

        // Nothing left to deliver to
        channel.dispatch(ChannelEvent::Connect);
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_connected_at_open() {
        let (channel, _outbound) = SharedChannel::new();
        assert!(!channel.listen().connected_at_open());

        channel.dispatch(ChannelEvent::Connect);
        assert!(channel.listen().connected_at_open());

        channel.dispatch(ChannelEvent::Disconnect { reason: "reset".to_string() });
        assert!(!channel.listen().connected_at_open());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (channel, mut outbound) = SharedChannel::new();
        let message = OutboundMessage::Subscribe { upload_id: UploadId::from("abc123") };

        let result = channel.send(message.clone());
        assert!(matches!(result, Err(ImportError::NotConnected)));

        channel.dispatch(ChannelEvent::Connect);
        channel.send(message.clone()).unwrap();
        assert_eq!(outbound.recv().await, Some(message));
    }
}
