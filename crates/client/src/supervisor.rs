//! Reconnect policy: connection state machine plus exponential backoff.

use std::time::Duration;

use {
    rand::Rng,
    tracing::{debug, info, warn},
    wicket_config::ReconnectConfig,
};

/// Fraction of each delay that is randomized in either direction.
const JITTER: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

/// What the run loop does after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Sleep, then connect again.
    Retry(Duration),
    /// Stop for good.
    Exit,
}

/// Exponential backoff: `min(initial * 2^(n-1), max)` for retry `n >= 1`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            jitter: JITTER,
        }
    }

    /// Same curve without randomization.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Un-jittered delay before retry `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Delay before retry `attempt`, jittered by up to ±10% and never past
    /// the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64(factor).min(self.max)
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay())
    }
}

/// Tracks connection state and decides whether and when to reconnect.
#[derive(Debug)]
pub struct Supervisor {
    state: ConnectionState,
    retries: u32,
    max_retries: Option<u32>,
    backoff: Backoff,
}

impl Supervisor {
    pub fn new(backoff: Backoff, max_retries: Option<u32>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(Backoff::from(config), config.max_retries)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn connected(&mut self) {
        if self.retries > 0 {
            info!(after = self.retries, "reconnected");
        }
        self.retries = 0;
        self.state = ConnectionState::Connected;
    }

    pub fn connect_failed(&mut self) -> Next {
        self.retry()
    }

    /// The connection dropped. Reconnect unless a shutdown was requested.
    pub fn disconnected(&mut self, shutdown_requested: bool) -> Next {
        if shutdown_requested {
            debug!("disconnected after shutdown request");
            self.state = ConnectionState::ShuttingDown;
            return Next::Exit;
        }
        self.retry()
    }

    fn retry(&mut self) -> Next {
        self.retries = self.retries.saturating_add(1);
        if let Some(max) = self.max_retries
            && self.retries > max
        {
            warn!(retries = self.retries, max, "giving up on reconnecting");
            self.state = ConnectionState::ShuttingDown;
            return Next::Exit;
        }
        self.state = ConnectionState::Connecting;
        Next::Retry(self.backoff.delay(self.retries))
    }
}
