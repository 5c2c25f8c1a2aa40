//! Wait for the backend to accept requests before start-up work.

use crate::SearchBackend;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Retry budget for [`await_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Total number of probes, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed wait between failed probes, in milliseconds.
    #[serde(default = "default_interval", with = "millis")]
    pub interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_interval(),
        }
    }
}

impl ReadinessConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Probe the backend until it answers or the attempts run out.
///
/// Returns `true` as soon as a probe succeeds. Probe errors and negative
/// answers are logged and retried after `config.interval`; nothing is raised.
pub async fn await_ready(backend: &dyn SearchBackend, config: &ReadinessConfig) -> bool {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        match backend.ping().await {
            Ok(true) => {
                tracing::info!(attempt, "backend is ready");
                return true;
            }
            Ok(false) => {
                tracing::info!(attempt, max_attempts = attempts, "waiting for backend (probe declined)");
            }
            Err(err) => {
                tracing::info!(attempt, max_attempts = attempts, error = %err, "waiting for backend");
            }
        }
        if attempt < attempts {
            sleep(config.interval).await;
        }
    }
    tracing::error!(max_attempts = attempts, "backend did not become ready");
    false
}
