//! Reconnect backoff policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Linear backoff with a ceiling, bounded by an attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Connection attempts, the first one included, before giving up
    pub max_attempts: u32,
    /// Delay before the first reconnect
    pub base_delay_ms: u64,
    /// Added per previous attempt
    pub step_ms: u64,
    /// Upper bound on any delay
    pub cap_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 3000,
            step_ms: 2000,
            cap_ms: 15000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self
            .base_delay_ms
            .saturating_add(self.step_ms.saturating_mul(attempt as u64))
            .min(self.cap_ms);
        Duration::from_millis(ms)
    }

    /// Whether another reconnect may be scheduled after `attempt` of them.
    /// The initial connect counts against the budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }

    /// Every delay the policy will ever produce, in order
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();

        assert_eq!(delays, vec![3000, 5000, 7000, 9000]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for(6), Duration::from_millis(15000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(15000));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..Default::default()
        };

        assert!(policy.allows(0));
        assert!(!policy.allows(1));
        assert_eq!(policy.delays().count(), 1);
    }

    #[test]
    fn test_single_attempt_never_reconnects() {
        let policy = ReconnectPolicy {
            max_attempts: 1,
            ..Default::default()
        };

        assert!(!policy.allows(0));
        assert_eq!(policy.delays().count(), 0);

        let none = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!none.allows(0));
        assert_eq!(none.delays().count(), 0);
    }
}
