//! Connection state machine for streaming venues.
//!
//! States are {Disconnected, Connecting, Connected, Backoff}. Failures back
//! off exponentially up to a maximum delay. After `max_retries` consecutive
//! failures the next wait is the cool-down and the retry counter resets, so
//! the connection keeps recovering on its own once the venue is back.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WebSocketConfig;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
const BACKOFF_MULTIPLIER: u32 = 2;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// Reconnect delays and retry cap.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl BackoffPolicy {
    /// Builds a policy from websocket settings; zero values keep defaults.
    pub fn from_config(ws: Option<&WebSocketConfig>) -> Self {
        let defaults = Self::default();
        let Some(ws) = ws else {
            return defaults;
        };

        let pick = |value: Duration, default: Duration| {
            if value.is_zero() { default } else { value }
        };

        let initial_delay = pick(ws.reconnect_delay, defaults.initial_delay);
        Self {
            initial_delay,
            max_delay: pick(ws.max_reconnect_delay, defaults.max_delay).max(initial_delay),
            max_retries: ws.max_retries.filter(|n| *n > 0).unwrap_or(defaults.max_retries),
            cooldown: pick(ws.cooldown, defaults.cooldown),
        }
    }
}

/// ConnectionMachine tracks the state of one streaming connection.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: BackoffPolicy,
    failures: u32,
    next_delay: Duration,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        let next_delay = policy.initial_delay;
        Self {
            state: ConnectionState::Disconnected,
            policy,
            failures: 0,
            next_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful open or cool-down.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Disconnected or Backoff -> Connecting. Returns false otherwise.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Backoff => {
                self.state = ConnectionState::Connecting;
                true
            }
            state => {
                debug!(state = %state, "Ignoring connect in current state");
                false
            }
        }
    }

    /// Connecting -> Connected. Resets the backoff.
    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring open in current state");
            return false;
        }
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.next_delay = self.policy.initial_delay;
        true
    }

    /// Connecting or Connected -> Backoff after an error or close.
    ///
    /// Returns how long to wait before the next attempt, or `None` if the
    /// event does not apply to the current state.
    pub fn on_failure(&mut self) -> Option<Duration> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            state => {
                debug!(state = %state, "Ignoring failure in current state");
                return None;
            }
        }

        self.state = ConnectionState::Backoff;
        self.failures += 1;

        if self.failures >= self.policy.max_retries {
            warn!(
                failures = self.failures,
                cooldown = ?self.policy.cooldown,
                "Retry limit reached, cooling down"
            );
            self.failures = 0;
            self.next_delay = self.policy.initial_delay;
            return Some(self.policy.cooldown);
        }

        let delay = self.next_delay;
        self.next_delay = (self.next_delay * BACKOFF_MULTIPLIER).min(self.policy.max_delay);
        Some(delay)
    }

    /// Any state -> Disconnected.
    pub fn shutdown(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
