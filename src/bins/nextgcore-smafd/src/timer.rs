//! SMAF Timer Configuration

use std::time::Duration;

use crate::config::Timers;

// ============================================================================
// Timer IDs
// ============================================================================

/// SMAF timer identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmafTimerId {
    /// Bound on the join over all forwarding-node responses of one operation
    PfcpResponse,
    /// Delay between NRF registration attempts
    NrfRegistrationRetry,
}

impl SmafTimerId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PfcpResponse => "SMAF_TIMER_PFCP_RESPONSE",
            Self::NrfRegistrationRetry => "SMAF_TIMER_NRF_REGISTRATION_RETRY",
        }
    }
}

// ============================================================================
// Timer Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Maximum attempt count (0 means unbounded)
    pub max_count: u32,
    pub duration: Duration,
}

impl TimerConfig {
    pub fn new_millis(max_count: u32, duration_millis: u64) -> Self {
        Self {
            max_count,
            duration: Duration::from_millis(duration_millis),
        }
    }
}

/// SMAF timer configurations
#[derive(Debug, Clone)]
pub struct SmafTimerConfigs {
    pub pfcp_response: TimerConfig,
    pub nrf_registration_retry: TimerConfig,
}

impl Default for SmafTimerConfigs {
    fn default() -> Self {
        Self::from_config(&Timers::default())
    }
}

impl SmafTimerConfigs {
    pub fn from_config(timers: &Timers) -> Self {
        Self {
            pfcp_response: TimerConfig::new_millis(0, timers.pfcp_response_timeout_ms),
            // 1 second between registration attempts
            nrf_registration_retry: TimerConfig::new_millis(timers.nrf_registration_retry, 1000),
        }
    }

    pub fn get(&self, timer_id: SmafTimerId) -> &TimerConfig {
        match timer_id {
            SmafTimerId::PfcpResponse => &self.pfcp_response,
            SmafTimerId::NrfRegistrationRetry => &self.nrf_registration_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_id_names() {
        assert_eq!(SmafTimerId::PfcpResponse.name(), "SMAF_TIMER_PFCP_RESPONSE");
        assert_eq!(
            SmafTimerId::NrfRegistrationRetry.name(),
            "SMAF_TIMER_NRF_REGISTRATION_RETRY"
        );
    }

    #[test]
    fn test_timer_config_default() {
        let configs = SmafTimerConfigs::default();
        assert_eq!(configs.pfcp_response.duration, Duration::from_millis(3000));
        assert_eq!(configs.get(SmafTimerId::NrfRegistrationRetry).max_count, 3);
    }

    #[test]
    fn test_timer_config_from_timers() {
        let timers = Timers {
            pfcp_response_timeout_ms: 250,
            nrf_registration_retry: 5,
        };
        let configs = SmafTimerConfigs::from_config(&timers);
        assert_eq!(configs.get(SmafTimerId::PfcpResponse).duration, Duration::from_millis(250));
        assert_eq!(configs.nrf_registration_retry.max_count, 5);
    }
}
