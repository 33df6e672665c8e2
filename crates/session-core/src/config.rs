//! Call-session configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{CallError, Result};

/// Environment variable prefix for layered configuration
pub const ENV_PREFIX: &str = "RTCALL";

/// What to do with an incoming call notice while another call is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Reply `decline-call` to the second caller
    #[default]
    Reject,
    /// Drop the notice without replying
    Ignore,
}

/// Configuration for a [`CallSession`](crate::api::CallSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSessionConfig {
    /// How long a call may stay in `Ringing` before it times out
    pub ring_timeout_ms: u64,
    /// How long a closed channel waits for the peer's termination notice
    /// before the call is ended as a transport loss
    pub close_grace_ms: u64,
    /// Tone played to the caller while waiting for an answer
    pub outgoing_tone: String,
    /// Tone played to the callee while the call rings
    pub incoming_tone: String,
    /// Capacity of the `CallEvent` broadcast channel
    pub event_broadcast_capacity: usize,
    pub busy_policy: BusyPolicy,
}

impl Default for CallSessionConfig {
    fn default() -> Self {
        Self {
            ring_timeout_ms: 30_000,
            close_grace_ms: 500,
            outgoing_tone: "calling".to_string(),
            incoming_tone: "receiving".to_string(),
            event_broadcast_capacity: 64,
            busy_policy: BusyPolicy::Reject,
        }
    }
}

impl CallSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_tones(mut self, outgoing: impl Into<String>, incoming: impl Into<String>) -> Self {
        self.outgoing_tone = outgoing.into();
        self.incoming_tone = incoming.into();
        self
    }

    pub fn with_event_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.event_broadcast_capacity = capacity;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Check the configuration for values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ring_timeout_ms == 0 {
            return Err(CallError::config("ring_timeout_ms must be greater than zero"));
        }
        if self.event_broadcast_capacity == 0 {
            return Err(CallError::config(
                "event_broadcast_capacity must be greater than zero",
            ));
        }
        if self.outgoing_tone.trim().is_empty() || self.incoming_tone.trim().is_empty() {
            return Err(CallError::config("tone names cannot be empty"));
        }
        Ok(())
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| CallError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then the optional TOML file, then `RTCALL_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = rtcall_infra_common::load_layered(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }
}
