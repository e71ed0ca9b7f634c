//! WebSocket client with heartbeat and reconnection.

use crate::domain::backoff::Backoff;
use crate::domain::config::TransportConfig;
use crate::domain::connection::{ConnectionState, ConnectionStatus};
use crate::domain::errors::TransportError;
use crate::ports::outbound::FrameSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use shared_types::{OutboundFrame, HEARTBEAT_FRAME};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Capacity of the event channel returned by `start`.
const EVENT_BUFFER: usize = 1024;

/// What the connection task reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re)established.
    Connected,
    /// A live connection was lost. A reconnect is already scheduled.
    Disconnected { reason: String },
    /// One text frame from the platform.
    Frame(String),
}

/// Cloneable send side of the transport.
#[derive(Clone)]
pub struct TransportHandle {
    outbound_tx: mpsc::Sender<String>,
    state: Arc<RwLock<ConnectionState>>,
}

impl TransportHandle {
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }
}

impl FrameSink for TransportHandle {
    fn send(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = frame.to_json()?;
        self.outbound_tx.try_send(text).map_err(|err| match err {
            TrySendError::Full(_) => TransportError::Backpressure,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }
}

/// Persistent WebSocket transport.
pub struct WsTransport {
    config: TransportConfig,
    handle: TransportHandle,
    outbound_rx: Option<mpsc::Receiver<String>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let handle = TransportHandle {
            outbound_tx,
            state: Arc::new(RwLock::new(ConnectionState::default())),
        };
        Self {
            config,
            handle,
            outbound_rx: Some(outbound_rx),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Spawn the connection task. Can be called once per transport.
    pub fn start(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let outbound_rx = self.outbound_rx.take().ok_or(TransportError::AlreadyStarted)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let connection = ConnectionLoop {
            backoff: Backoff::new(self.config.backoff.clone()),
            config: self.config.clone(),
            state: self.handle.state.clone(),
            outbound_rx,
            events: events_tx,
            shutdown_rx,
        };

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(connection.run()));
        info!(url = %self.config.url, "Transport started");
        Ok(events_rx)
    }

    /// Close the connection gracefully and stop reconnecting.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Transport task ended abnormally");
            }
        }
        self.handle.state.write().status = ConnectionStatus::Disconnected;
        info!("Transport stopped");
    }
}

struct ConnectionLoop {
    config: TransportConfig,
    state: Arc<RwLock<ConnectionState>>,
    outbound_rx: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    shutdown_rx: watch::Receiver<bool>,
    backoff: Backoff,
}

impl ConnectionLoop {
    async fn run(mut self) {
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            self.state.write().status = ConnectionStatus::Connecting;

            let result = self.run_connection().await;

            let was_connected = {
                let mut state = self.state.write();
                let was = state.is_connected();
                state.status = ConnectionStatus::Disconnected;
                was
            };

            let err = match result {
                Ok(()) => break,
                Err(err) => err,
            };

            if was_connected {
                let _ = self
                    .events
                    .send(TransportEvent::Disconnected {
                        reason: err.to_string(),
                    })
                    .await;
            }

            let delay = self.backoff.record_failure();
            {
                let mut state = self.state.write();
                state.consecutive_failures = self.backoff.consecutive_failures();
                state.backoff_delay = delay;
            }
            warn!(
                error = %err,
                consecutive_failures = self.backoff.consecutive_failures(),
                delay_secs = delay.as_secs_f64(),
                "Connection failed, reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }
        debug!("Connection loop exited");
    }

    /// One connection lifetime. `Ok` means shutdown was requested.
    async fn run_connection(&mut self) -> Result<(), TransportError> {
        let request = build_request(&self.config)?;

        let (stream, _) = tokio::select! {
            result = connect_async(request) => result?,
            _ = self.shutdown_rx.changed() => return Ok(()),
        };

        self.backoff.reset();
        {
            let mut state = self.state.write();
            state.status = ConnectionStatus::Connected;
            state.consecutive_failures = 0;
            state.backoff_delay = std::time::Duration::ZERO;
        }
        info!(url = %self.config.url, "Connected");
        let _ = self.events.send(TransportEvent::Connected).await;

        let (mut write, mut read) = stream.split();

        let period = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Text(HEARTBEAT_FRAME.to_string().into()))
                        .await
                        .map_err(TransportError::Heartbeat)?;
                    debug!("Heartbeat sent");
                }
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(text) => write.send(Message::Text(text.into())).await?,
                    None => return Ok(()),
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let frame = TransportEvent::Frame(text.as_str().to_owned());
                        if self.events.send(frame).await.is_err() {
                            // Owner dropped the receiver; nobody is listening.
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_owned())
                            .unwrap_or_default();
                        return Err(TransportError::ClosedByPeer { reason });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => {
                        return Err(TransportError::ClosedByPeer {
                            reason: "stream ended".to_string(),
                        })
                    }
                },
            }
        }
    }
}

/// Handshake request with the optional bearer credential.
fn build_request(config: &TransportConfig) -> Result<Request, TransportError> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(token) = config.bearer_token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ActionRequest, MessageId};

    #[test]
    fn test_build_request_sets_bearer_header() {
        let config = TransportConfig {
            url: "ws://127.0.0.1:3001".to_string(),
            access_token: Some("secret".to_string()),
            ..Default::default()
        };
        let request = build_request(&config).unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn test_build_request_without_token() {
        let request = build_request(&TransportConfig::default()).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_request_rejects_bad_url() {
        let config = TransportConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(build_request(&config).is_err());
    }

    #[test]
    fn test_send_before_connect_is_refused() {
        let transport = WsTransport::new(TransportConfig::default());
        let frame = ActionRequest::DeleteMsg {
            message_id: MessageId(1),
        }
        .into_frame(None);
        let handle = transport.handle();
        assert!(!handle.is_connected());
        assert!(matches!(handle.send(&frame), Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut transport = WsTransport::new(TransportConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        });
        let _events = transport.start().unwrap();
        assert!(matches!(transport.start(), Err(TransportError::AlreadyStarted)));
        transport.stop().await;
        assert_eq!(transport.state().status, ConnectionStatus::Disconnected);
    }
}
