//! Worker timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Loop cadences and retry budgets.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_cadence"))]
pub struct WorkerConfig {
    /// Lifecycle reconciliation tick
    #[serde(default = "default_reconcile_interval_ms")]
    #[validate(range(min = 1))]
    pub reconcile_interval_ms: u64,
    /// Flush + aggregation tick while a session is live
    #[serde(default = "default_aggregate_interval_ms")]
    #[validate(range(min = 1))]
    pub aggregate_interval_ms: u64,
    /// Pause between finalization attempts
    #[serde(default = "default_finalize_delay_ms")]
    pub finalize_delay_ms: u64,
    /// Finalization attempts before giving up (0 = unbounded)
    #[serde(default = "default_finalize_max_attempts")]
    pub finalize_max_attempts: u32,
    /// Capacity of the inbound chat channel
    #[serde(default = "default_chat_channel_capacity")]
    #[validate(range(min = 1))]
    pub chat_channel_capacity: usize,
    /// How often a metrics summary is logged
    #[serde(default = "default_metrics_log_interval_secs")]
    #[validate(range(min = 1))]
    pub metrics_log_interval_secs: u64,
}

fn default_reconcile_interval_ms() -> u64 {
    10_000
}

fn default_aggregate_interval_ms() -> u64 {
    1_000
}

fn default_finalize_delay_ms() -> u64 {
    10_000
}

fn default_finalize_max_attempts() -> u32 {
    360 // one hour at the default delay
}

fn default_chat_channel_capacity() -> usize {
    4096
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: default_reconcile_interval_ms(),
            aggregate_interval_ms: default_aggregate_interval_ms(),
            finalize_delay_ms: default_finalize_delay_ms(),
            finalize_max_attempts: default_finalize_max_attempts(),
            chat_channel_capacity: default_chat_channel_capacity(),
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
        }
    }
}

/// The aggregation tick must be strictly faster than reconciliation.
fn validate_cadence(config: &WorkerConfig) -> Result<(), ValidationError> {
    if config.aggregate_interval_ms >= config.reconcile_interval_ms {
        return Err(ValidationError::new("aggregate_interval_not_faster"));
    }
    Ok(())
}

impl WorkerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn aggregate_interval(&self) -> Duration {
        Duration::from_millis(self.aggregate_interval_ms)
    }

    pub fn finalize_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_delay_ms)
    }

    /// `None` means retry until success or shutdown.
    pub fn finalize_max_attempts(&self) -> Option<u32> {
        (self.finalize_max_attempts > 0).then_some(self.finalize_max_attempts)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_log_interval_secs)
    }
}
