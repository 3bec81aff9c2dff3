use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::handlers::InteractionHandler;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

/// Decoded gateway dispatch, already stripped of opcodes and sequencing.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayEvent {
    Ready { guild_count: u64, user_count: u64 },
    Interaction(serde_json::Value),
    HeartbeatAck { ping_ms: u64 },
    Unsupported { event_type: String },
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_event(&self) -> Result<Option<GatewayEvent>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<GatewayEvent>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Live connection state, shared with the HTTP status surface.
#[derive(Default)]
pub struct BotStatus {
    ready: AtomicBool,
    guild_count: AtomicU64,
    user_count: AtomicU64,
    ping_ms: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub ready: bool,
    pub guild_count: u64,
    pub user_count: u64,
    pub ping_ms: u64,
}

impl BotStatus {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self, guild_count: u64, user_count: u64) {
        self.guild_count.store(guild_count, Ordering::SeqCst);
        self.user_count.store(user_count, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_disconnected(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn set_ping(&self, ping_ms: u64) {
        self.ping_ms.store(ping_ms, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            ready: self.ready.load(Ordering::SeqCst),
            guild_count: self.guild_count.load(Ordering::SeqCst),
            user_count: self.user_count.load(Ordering::SeqCst),
            ping_ms: self.ping_ms.load(Ordering::SeqCst),
        }
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    handler: Arc<InteractionHandler>,
    status: Arc<BotStatus>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        handler: Arc<InteractionHandler>,
        status: Arc<BotStatus>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, status, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    self.status.mark_disconnected();
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(attempt, "gateway connected");

        loop {
            let Some(event) = self.transport.next_event().await? else {
                info!(attempt, "gateway stream closed");
                self.status.mark_disconnected();
                self.transport.disconnect().await?;
                return Ok(());
            };

            match event {
                GatewayEvent::Ready { guild_count, user_count } => {
                    self.status.mark_ready(guild_count, user_count);
                    info!(
                        event_name = "gateway.ready",
                        guild_count, user_count, "bot is ready"
                    );
                }
                GatewayEvent::HeartbeatAck { ping_ms } => {
                    self.status.set_ping(ping_ms);
                    debug!(event_name = "gateway.heartbeat_ack", ping_ms, "heartbeat ack");
                }
                GatewayEvent::Interaction(payload) => {
                    if let Err(error) = self.handler.handle(&payload).await {
                        warn!(
                            event_name = "gateway.interaction_failed",
                            error = %error,
                            "interaction handling failed; continuing gateway loop"
                        );
                    }
                }
                GatewayEvent::Unsupported { event_type } => {
                    debug!(event_name = "gateway.unsupported", event_type, "ignored event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{
        BotStatus, GatewayEvent, GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError,
    };
    use crate::api::RecordingDiscordApi;
    use crate::handlers::InteractionHandler;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        events: VecDeque<Result<Option<GatewayEvent>, TransportError>>,
        connect_attempts: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            events: Vec<Result<Option<GatewayEvent>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    events: events.into(),
                    connect_attempts: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_event(&self) -> Result<Option<GatewayEvent>, TransportError> {
            let mut state = self.state.lock().await;
            state.events.pop_front().unwrap_or(Ok(None))
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn runner_with(
        transport: Arc<ScriptedTransport>,
        status: Arc<BotStatus>,
    ) -> (GatewayRunner, Arc<RecordingDiscordApi>) {
        let api = Arc::new(RecordingDiscordApi::default());
        let handler = Arc::new(InteractionHandler::new(
            Arc::new(crate::handlers::tests::FixedResponseService::default()),
            api.clone(),
        ));
        let runner = GatewayRunner::new(
            transport,
            handler,
            status,
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );
        (runner, api)
    }

    #[tokio::test]
    async fn ready_event_updates_the_status_counters() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(GatewayEvent::Ready { guild_count: 3, user_count: 120 })),
                Ok(Some(GatewayEvent::HeartbeatAck { ping_ms: 42 })),
                Ok(None),
            ],
        ));
        let status = Arc::new(BotStatus::default());
        let (runner, _api) = runner_with(transport, status.clone());

        runner.start().await.expect("runner should not fail");

        let snapshot = status.snapshot();
        assert!(!snapshot.ready, "stream close marks the bot disconnected");
        assert_eq!(snapshot.guild_count, 3);
        assert_eq!(snapshot.user_count, 120);
        assert_eq!(snapshot.ping_ms, 42);
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(None)],
        ));
        let status = Arc::new(BotStatus::default());
        let (runner, _api) = runner_with(transport.clone(), status);

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));
        let status = Arc::new(BotStatus::default());
        let (runner, _api) = runner_with(transport.clone(), status);

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn interactions_are_answered_and_loop_survives_bad_payloads() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                // Unparseable payload must not abort the loop.
                Ok(Some(GatewayEvent::Interaction(json!({ "type": 2 })))),
                Ok(Some(GatewayEvent::Interaction(json!({
                    "id": "int-1",
                    "type": 1,
                    "token": "tok"
                })))),
                Ok(None),
            ],
        ));
        let status = Arc::new(BotStatus::default());
        let (runner, api) = runner_with(transport, status);

        runner.start().await.expect("runner should not fail");

        let responses = api.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, "int-1");
    }
}
