//! # Bridge
//!
//! Drives a `BridgeService` from the transport and the timers.
//!
//! ## Tasks
//!
//! | Task | Period | Work |
//! |------|--------|------|
//! | event loop | transport events | frame routing, connect handling |
//! | admission | `timers.admission_ms` | promote queued principals |
//! | send queue | `timers.send_queue_ms` | at most one code message |
//! | retraction | `timers.retraction_ms` | soft / hard deletes |
//! | side effects | `timers.side_effects_ms` | group cards, announcements |
//! | cleanup | `timers.cleanup_ms` | expiry sweeps, call reaping |

mod router;
mod service;
mod ticks;

pub use router::{parse_group_command, GroupCommand};
pub use service::{BridgeService, BridgeStats};

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use qs_01_transport::{FrameSink, TransportEvent, WsTransport};
use shared_types::{SystemTimeSource, TimeSource};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::domain::BridgeState;
use crate::errors::BridgeError;
use crate::ports::BridgePorts;

/// The running bridge.
pub struct Bridge {
    service: Arc<BridgeService>,
    transport: Option<WsTransport>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Bridge over a real WebSocket connection.
    pub fn new(config: BridgeConfig, ports: BridgePorts) -> Self {
        let transport = WsTransport::new(config.transport.clone());
        let sink: Arc<dyn FrameSink> = Arc::new(transport.handle());
        let state = BridgeState::new(&config);
        let service = BridgeService::new(config, state, sink, ports, Arc::new(SystemTimeSource));
        Self::assemble(service, Some(transport))
    }

    /// Bridge over an arbitrary sink, without a transport. Frames must be fed
    /// through `handle_frame` and connects through `on_connected`.
    pub fn with_sink(
        config: BridgeConfig,
        sink: Arc<dyn FrameSink>,
        ports: BridgePorts,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let state = BridgeState::new(&config);
        Self::with_state(config, state, sink, ports, clock)
    }

    pub fn with_state(
        config: BridgeConfig,
        state: BridgeState,
        sink: Arc<dyn FrameSink>,
        ports: BridgePorts,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self::assemble(BridgeService::new(config, state, sink, ports, clock), None)
    }

    fn assemble(service: BridgeService, transport: Option<WsTransport>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            service: Arc::new(service),
            transport,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn service(&self) -> Arc<BridgeService> {
        Arc::clone(&self.service)
    }

    /// Connect (when a transport is present) and start the timers.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if !self.tasks.is_empty() {
            return Err(BridgeError::AlreadyStarted);
        }
        let _ = self.shutdown_tx.send(false);

        if let Some(transport) = self.transport.as_mut() {
            let events = transport.start()?;
            self.tasks.push(spawn_event_loop(
                Arc::clone(&self.service),
                events,
                self.shutdown_tx.subscribe(),
            ));
        }

        let timers = self.service.config().timers.clone();
        let schedule: [(&'static str, u64, fn(&BridgeService)); 5] = [
            ("admission", timers.admission_ms, BridgeService::tick_admission),
            ("send_queue", timers.send_queue_ms, BridgeService::tick_send_queue),
            ("retraction", timers.retraction_ms, BridgeService::tick_retraction),
            ("side_effects", timers.side_effects_ms, BridgeService::tick_side_effects),
            ("cleanup", timers.cleanup_ms, BridgeService::tick_cleanup),
        ];
        for (name, period_ms, tick) in schedule {
            self.tasks.push(spawn_timer(
                name,
                Duration::from_millis(period_ms.max(1)),
                Arc::clone(&self.service),
                self.shutdown_tx.subscribe(),
                tick,
            ));
        }

        info!(
            groups = ?self.service.config().groups,
            transport = self.transport.is_some(),
            "Bridge started"
        );
        Ok(())
    }

    /// Stop every task and close the connection. Queued deliveries are
    /// dropped.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(transport) = self.transport.as_mut() {
            transport.stop().await;
        }
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "Bridge task ended abnormally");
            }
        }
        let dropped = self.service.state.lock().send_queue.clear();
        info!(dropped, "Bridge stopped");
    }
}

impl Deref for Bridge {
    type Target = BridgeService;

    fn deref(&self) -> &BridgeService {
        &self.service
    }
}

fn spawn_event_loop(
    service: Arc<BridgeService>,
    mut events: mpsc::Receiver<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Event loop shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => service.on_connected(),
                    Some(TransportEvent::Disconnected { reason }) => {
                        warn!(reason = %reason, "Platform connection lost");
                    }
                    Some(TransportEvent::Frame(text)) => service.handle_frame(&text).await,
                    None => break,
                },
            }
        }
    })
}

fn spawn_timer(
    name: &'static str,
    period: Duration,
    service: Arc<BridgeService>,
    mut shutdown: watch::Receiver<bool>,
    tick: fn(&BridgeService),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(timer = name, "Timer shutting down");
                    break;
                }
                _ = interval.tick() => tick(&service),
            }
        }
    })
}
