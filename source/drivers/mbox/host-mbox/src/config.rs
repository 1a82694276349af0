// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MboxError, Result};

/// Upper bound for both poll timings. In timer mode the tick is the only
/// wake source, so it must stay within a bounded notification cycle.
pub const MAX_POLL_MS: u64 = 60_000;

/// Tunables for bringing up a mailbox transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MboxConfig {
    /// Name used when claiming the interrupt line and in log lines.
    pub device_name: String,
    /// Delay before the first poll tick when no interrupt is available.
    pub poll_initial_delay_ms: u64,
    /// Period between poll ticks.
    pub poll_interval_ms: u64,
    /// Register-level interrupt enables, one bit per data slot (low byte
    /// covers slots 0-7). Readiness only uses the control-register RECV
    /// interrupt, so this stays 0 unless the peer protocol needs slot events.
    pub data_irq_enable: u16,
}

impl Default for MboxConfig {
    fn default() -> Self {
        Self {
            device_name: "mbox-host".to_string(),
            poll_initial_delay_ms: 10,
            poll_interval_ms: 500,
            data_irq_enable: 0,
        }
    }
}

impl MboxConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| MboxError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(MboxError::Config("poll_interval_ms must be non-zero".to_string()));
        }
        if self.poll_interval_ms > MAX_POLL_MS {
            return Err(MboxError::Config(format!(
                "poll_interval_ms must be at most {MAX_POLL_MS}"
            )));
        }
        if self.poll_initial_delay_ms > MAX_POLL_MS {
            return Err(MboxError::Config(format!(
                "poll_initial_delay_ms must be at most {MAX_POLL_MS}"
            )));
        }
        if self.device_name.is_empty() {
            return Err(MboxError::Config("device_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
