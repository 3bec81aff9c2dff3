//! Self-ping loop that keeps idling hosts from putting the bot to sleep.
//! Disabled entirely when no public URL is configured.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(15);
const PING_USER_AGENT: &str = "BroBot-KeepAlive/1.0";
const DIAGNOSTIC_USER_AGENT: &str = "BroBot-Diagnostic/1.0";

// 10 minutes worth of 30s pings between aggregate summaries.
const SUMMARY_EVERY_PINGS: u64 = 20;
const DIAGNOSTIC_AFTER_FAILURES: u32 = 3;
const HEALTHY_SUCCESS_RATE: f64 = 0.8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PingOutcome {
    pub status: u16,
    pub duration_ms: u64,
}

impl PingOutcome {
    /// Only a 2xx answer counts as the service being awake; a host that
    /// responds 5xx is treated the same as one that does not respond.
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PingError(pub String);

#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<PingOutcome, PingError>;
}

pub struct HttpPinger {
    client: reqwest::Client,
}

impl HttpPinger {
    pub fn new() -> Result<Self, PingError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PingError(format!("http client construction failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Pinger for HttpPinger {
    async fn ping(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<PingOutcome, PingError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| PingError(e.to_string()))?;
        Ok(PingOutcome {
            status: response.status().as_u16(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KeepAliveStats {
    pub active: bool,
    pub total_pings: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl Counters {
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

pub struct KeepAliveService {
    pinger: Arc<dyn Pinger>,
    url: Option<String>,
    state: Mutex<Counters>,
}

impl KeepAliveService {
    pub fn new(pinger: Arc<dyn Pinger>, url: Option<String>) -> Self {
        Self { pinger, url, state: Mutex::new(Counters::default()) }
    }

    pub fn is_active(&self) -> bool {
        self.url.is_some()
    }

    /// Active service with no pings yet is considered healthy; after that,
    /// healthy means the success rate holds and no failure streak is running.
    pub fn is_healthy(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        let state = self.state.lock().expect("keep-alive state lock poisoned");
        state.total == 0
            || (state.success_rate() >= HEALTHY_SUCCESS_RATE
                && state.consecutive_failures < DIAGNOSTIC_AFTER_FAILURES)
    }

    pub fn stats(&self) -> KeepAliveStats {
        let state = self.state.lock().expect("keep-alive state lock poisoned");
        KeepAliveStats {
            active: self.is_active(),
            total_pings: state.total,
            successes: state.successes,
            failures: state.failures,
            consecutive_failures: state.consecutive_failures,
            success_rate: state.success_rate(),
            last_success_at: state.last_success_at,
            last_failure_at: state.last_failure_at,
        }
    }

    /// One self-ping, counters updated. `None` when the service is disabled.
    pub async fn ping_once(&self) -> Option<Result<PingOutcome, PingError>> {
        let url = self.url.as_deref()?;
        let result = self.pinger.ping(url, PING_TIMEOUT, PING_USER_AGENT).await;

        let run_diagnostic = {
            let mut state = self.state.lock().expect("keep-alive state lock poisoned");
            state.total += 1;
            match &result {
                Ok(outcome) if outcome.success() => {
                    state.successes += 1;
                    state.consecutive_failures = 0;
                    state.last_success_at = Some(Utc::now());
                    debug!(
                        event_name = "keep_alive.ping_ok",
                        status = outcome.status,
                        duration_ms = outcome.duration_ms,
                        "keep-alive ping succeeded"
                    );
                    false
                }
                Ok(outcome) => {
                    state.failures += 1;
                    state.consecutive_failures += 1;
                    state.last_failure_at = Some(Utc::now());
                    warn!(
                        event_name = "keep_alive.ping_failed",
                        status = outcome.status,
                        consecutive_failures = state.consecutive_failures,
                        "keep-alive ping answered with a non-success status"
                    );
                    state.consecutive_failures == DIAGNOSTIC_AFTER_FAILURES
                }
                Err(error) => {
                    state.failures += 1;
                    state.consecutive_failures += 1;
                    state.last_failure_at = Some(Utc::now());
                    warn!(
                        event_name = "keep_alive.ping_failed",
                        consecutive_failures = state.consecutive_failures,
                        error = %error,
                        "keep-alive ping failed"
                    );
                    state.consecutive_failures == DIAGNOSTIC_AFTER_FAILURES
                }
            }
        };

        if run_diagnostic {
            self.diagnostic_ping(url).await;
        }

        Some(result)
    }

    /// One out-of-band probe with a longer timeout; logs what it sees and
    /// leaves the counters alone.
    async fn diagnostic_ping(&self, url: &str) {
        match self.pinger.ping(url, DIAGNOSTIC_TIMEOUT, DIAGNOSTIC_USER_AGENT).await {
            Ok(outcome) => info!(
                event_name = "keep_alive.diagnostic",
                status = outcome.status,
                duration_ms = outcome.duration_ms,
                "diagnostic ping reached the public URL"
            ),
            Err(error) => warn!(
                event_name = "keep_alive.diagnostic",
                error = %error,
                "diagnostic ping also failed"
            ),
        }
    }

    fn log_summary(&self) {
        let stats = self.stats();
        if stats.success_rate < HEALTHY_SUCCESS_RATE {
            warn!(
                event_name = "keep_alive.summary",
                total = stats.total_pings,
                successes = stats.successes,
                failures = stats.failures,
                success_rate = stats.success_rate,
                "keep-alive success rate degraded"
            );
        } else {
            info!(
                event_name = "keep_alive.summary",
                total = stats.total_pings,
                successes = stats.successes,
                failures = stats.failures,
                success_rate = stats.success_rate,
                "keep-alive summary"
            );
        }
    }

    /// Starts the 30s ping loop; the first ping fires one interval in.
    /// Returns `None` (and logs) when no public URL is configured.
    pub fn spawn(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let Some(url) = self.url.clone() else {
            info!(event_name = "keep_alive.disabled", "keep-alive disabled (no public URL)");
            return None;
        };
        info!(event_name = "keep_alive.start", url = %url, "keep-alive service started");

        let service = self;
        Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + PING_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, PING_INTERVAL);
            let mut ticks: u64 = 0;
            loop {
                ticker.tick().await;
                service.ping_once().await;
                ticks += 1;
                if ticks % SUMMARY_EVERY_PINGS == 0 {
                    service.log_summary();
                }
            }
        }))
    }
}
