use parking_lot::Mutex;
use tokio::sync::mpsc;
use crate::core::{ChannelProvider, ProgressSnapshot, UploadId};
use super::message::{ChannelEvent, OutboundMessage};
use super::shared::SharedChannel;

/// Transport double: events are pushed by hand and outbound messages are
/// collected instead of being sent anywhere.
pub struct InMemoryChannel {
    channel: SharedChannel,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        let (channel, outbound_rx) = SharedChannel::new();
        Self {
            channel,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub fn handle(&self) -> SharedChannel {
        self.channel.clone()
    }

    pub fn connect(&self) {
        self.channel.dispatch(ChannelEvent::Connect);
    }

    pub fn disconnect(&self, reason: &str) {
        self.channel.dispatch(ChannelEvent::Disconnect {
            reason: reason.to_string(),
        });
    }

    pub fn acknowledge(&self, upload_id: &UploadId) {
        self.channel.dispatch(ChannelEvent::Subscribed {
            upload_id: Some(upload_id.clone()),
        });
    }

    pub fn progress(&self, snapshot: ProgressSnapshot) {
        self.channel.dispatch(ChannelEvent::Progress(snapshot));
    }

    pub fn push(&self, event: ChannelEvent) {
        self.channel.dispatch(event);
    }

    /// Drains everything sent since the last call.
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        let mut rx = self.outbound_rx.lock();
        let mut sent = Vec::new();
        while let Ok(message) = rx.try_recv() {
            sent.push(message);
        }
        sent
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelProvider for InMemoryChannel {
    fn channel(&self) -> SharedChannel {
        self.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_collect_sent() {
        let memory = InMemoryChannel::new();
        let mut listener = memory.handle().listen();

        memory.connect();
        assert_eq!(listener.recv().await, Some(ChannelEvent::Connect));

        let message = OutboundMessage::Subscribe { upload_id: UploadId::from("abc123") };
        memory.handle().send(message.clone()).unwrap();
        assert_eq!(memory.take_sent(), vec![message]);
        assert!(memory.take_sent().is_empty());
    }

    #[test]
    fn test_default_is_disconnected() {
        let memory = InMemoryChannel::default();
        assert!(!memory.handle().is_connected());
    }
}
