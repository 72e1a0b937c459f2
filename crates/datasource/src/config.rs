//! Read configuration and per-read context.

use std::time::Duration;

use tokio::time::Instant;

/// Default per-read deadline, matching the runtime's read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConfig {
    pub timeout: Duration,
}

impl Default for ReadConfig {
    fn default() -> Self { Self { timeout: DEFAULT_READ_TIMEOUT } }
}

impl ReadConfig {
    /// `CUMULUS_READ_TIMEOUT_SECS` overrides the deadline; unparsable or zero
    /// values fall back to the default.
    pub fn from_env() -> Self {
        let timeout = std::env::var("CUMULUS_READ_TIMEOUT_SECS")
            .ok()
            .and_then(|s| parse_secs(&s))
            .unwrap_or(DEFAULT_READ_TIMEOUT);
        Self { timeout }
    }
}

fn parse_secs(s: &str) -> Option<Duration> {
    s.trim().parse::<u64>().ok().filter(|n| *n > 0).map(Duration::from_secs)
}

/// Context handed to a read and on to its fetcher.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext {
    deadline: Instant,
}

impl ReadContext {
    pub fn with_timeout(timeout: Duration) -> Self { Self { deadline: Instant::now() + timeout } }

    pub fn from_config(cfg: &ReadConfig) -> Self { Self::with_timeout(cfg.timeout) }

    pub fn deadline(&self) -> Instant { self.deadline }

    pub fn remaining(&self) -> Duration { self.deadline.saturating_duration_since(Instant::now()) }
}
