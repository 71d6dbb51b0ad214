use std::future::pending;
use std::sync::OnceLock;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use crate::core::ChannelProvider;
use super::config::WsConfig;
use super::message::{ChannelEvent, OutboundMessage};
use super::shared::SharedChannel;

/// Spawns the connection task and returns its handle. The task keeps the
/// connection alive, reconnecting per `config`, for the life of the process.
pub fn spawn_ws_channel(config: WsConfig) -> SharedChannel {
    let (channel, outbound_rx) = SharedChannel::new();
    tokio::spawn(run_connection(config, channel.clone(), outbound_rx));
    channel
}

async fn run_connection(
    config: WsConfig,
    channel: SharedChannel,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    let mut attempts = 0u32;

    loop {
        info!(url = %config.url, "connecting channel");
        match connect_async(config.url.as_str()).await {
            Ok((stream, _)) => {
                attempts = 0;
                info!(url = %config.url, "channel connected");
                discard_stale(&mut outbound_rx);
                channel.dispatch(ChannelEvent::Connect);

                let reason = pump(stream, &channel, &mut outbound_rx, &config).await;
                warn!(%reason, "channel connection lost");
                channel.dispatch(ChannelEvent::Disconnect { reason });
            }
            Err(err) => {
                warn!(url = %config.url, error = %err, "channel connect failed");
            }
        }

        attempts += 1;
        if !config.may_retry(attempts) {
            error!(attempts, "giving up on channel reconnect");
            break;
        }

        tokio::time::sleep(config.reconnect_delay()).await;
    }

    // Senders now get an error instead of queueing into nothing
    outbound_rx.close();
}

/// Drops whatever was queued for a connection that is gone. Owners re-announce
/// their subscriptions on the `Connect` that follows.
fn discard_stale(outbound_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) {
    while let Ok(message) = outbound_rx.try_recv() {
        warn!(event = message.name(), "dropping message queued for a lost connection");
    }
}

/// Runs one connection until it fails; returns why.
async fn pump<S>(
    stream: S,
    channel: &SharedChannel,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    config: &WsConfig,
) -> String
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut ping = config
        .ping_interval_ms
        .map(|ms| interval(Duration::from_millis(ms)));

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match ChannelEvent::decode(text.as_str()) {
                    Ok(event) => {
                        debug!(event = event.name(), "channel frame");
                        channel.dispatch(event);
                    }
                    Err(err) => warn!(error = %err, "ignoring undecodable channel frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = sink.send(Message::Pong(payload)).await {
                        return err.to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server: {} {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return reason;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return err.to_string(),
                None => return "stream ended".to_string(),
            },
            Some(message) = outbound_rx.recv() => {
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        error!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                };
                debug!(event = message.name(), "sending channel frame");
                if let Err(err) = sink.send(Message::Text(text.into())).await {
                    return err.to_string();
                }
            }
            _ = tick(&mut ping) => {
                if let Err(err) = sink.send(Message::Ping(Bytes::new())).await {
                    return err.to_string();
                }
            }
        }
    }
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => pending::<()>().await,
    }
}

/// Opens the WebSocket on first use and hands the same handle to every
/// caller afterwards. The connection is never closed from here.
pub struct LazyChannelProvider {
    config: WsConfig,
    channel: OnceLock<SharedChannel>,
}

impl LazyChannelProvider {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            channel: OnceLock::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.channel.get().is_some()
    }
}

impl ChannelProvider for LazyChannelProvider {
    fn channel(&self) -> SharedChannel {
        self.channel
            .get_or_init(|| spawn_ws_channel(self.config.clone()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio_tungstenite::{accept_async, WebSocketStream};
    use crate::core::UploadId;
    use crate::channel::Listener;

    const PROGRESS_FRAME: &str = r#"["import:progress",{"uploadId":"abc123","total":500,"processed":250,"percentage":50,"inserted":240,"duplicates":10,"errors":0,"remaining":250,"stage":"inserting"}]"#;

    fn subscribe(id: &str) -> OutboundMessage {
        OutboundMessage::Subscribe { upload_id: UploadId::from(id) }
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("server stream ended: {:?}", other),
            }
        }
    }

    async fn next_event(listener: &mut Listener) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), listener.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("listener closed")
    }

    #[tokio::test]
    async fn test_reconnect_announces_fresh_subscription_only() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
        let (dropped_tx, dropped_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            frames_tx.send(next_text(&mut ws).await).unwrap();

            ws.send(Message::Ping(Bytes::from_static(b"hi"))).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Pong(payload))) => {
                        assert_eq!(&payload[..], b"hi");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("expected pong, got {:?}", other),
                }
            }

            ws.send(Message::Text(PROGRESS_FRAME.into())).await.unwrap();
            drop(ws);
            let _ = dropped_tx.send(());

            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            frames_tx.send(next_text(&mut ws).await).unwrap();
            let _ = ws.next().await;
        });

        let channel = spawn_ws_channel(WsConfig::new(format!("ws://{}/ws", addr)).reconnect_delay_ms(0));
        let mut listener = channel.listen();

        assert_eq!(next_event(&mut listener).await, ChannelEvent::Connect);
        channel.send(subscribe("abc123")).unwrap();
        assert_eq!(
            frames_rx.recv().await.unwrap(),
            r#"["import:subscribe",{"uploadId":"abc123"}]"#
        );

        match next_event(&mut listener).await {
            ChannelEvent::Progress(snapshot) => {
                assert_eq!(snapshot.processed, 250);
                assert_eq!(snapshot.percentage, 50.0);
            }
            other => panic!("expected progress, got {:?}", other),
        }

        // Queued for the dead connection, or refused once the drop is seen
        dropped_rx.await.unwrap();
        let _ = channel.send(subscribe("stale"));

        assert!(matches!(next_event(&mut listener).await, ChannelEvent::Disconnect { .. }));
        assert_eq!(next_event(&mut listener).await, ChannelEvent::Connect);
        channel.send(subscribe("abc123")).unwrap();

        // The new connection sees only the announcement made after its connect
        let first = frames_rx.recv().await.unwrap();
        assert_eq!(first, r#"["import:subscribe",{"uploadId":"abc123"}]"#);
    }

    #[tokio::test]
    async fn test_send_while_down_is_refused() {
        let channel = spawn_ws_channel(WsConfig::new("ws://127.0.0.1:9/ws").reconnect(false));
        let result = channel.send(subscribe("abc123"));
        assert!(matches!(result, Err(crate::core::ImportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_lazy_provider_reuses_channel() {
        // Nothing listens on port 9; the task just keeps failing quietly.
        let provider = LazyChannelProvider::new(
            WsConfig::new("ws://127.0.0.1:9/ws").reconnect(false),
        );
        assert!(!provider.is_started());

        let first = provider.channel();
        let second = provider.channel();
        assert!(provider.is_started());

        let _listener = first.listen();
        assert_eq!(second.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_stays_disconnected() {
        let channel = spawn_ws_channel(WsConfig::new("ws://127.0.0.1:9/ws").reconnect(false));
        let mut listener = channel.listen();

        let event = tokio::time::timeout(Duration::from_millis(300), listener.recv()).await;
        assert!(!matches!(event, Ok(Some(ChannelEvent::Connect))));
        assert!(!channel.is_connected());
    }
}
