//! Link configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_HANDSHAKE_TIMEOUT_MS, ReconnectPolicy, ResolverConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub resolver: ResolverConfig,
    pub policy: ReconnectPolicy,
    /// A handshake that takes longer counts as an unreachable vehicle
    pub handshake_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            policy: ReconnectPolicy::default(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
