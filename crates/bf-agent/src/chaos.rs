//! Fault injection for resilience testing
//!
//! Configured from the comma-separated `BOT_CHAOS` variable, e.g.
//! `BOT_CHAOS=flaky=0.1,ignore-terminate`.

use std::str::FromStr;

use bf_core::error::WorkerEnvError;
use bf_core::worker_env::BOT_CHAOS;

/// Faults a worker should inject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChaosConfig {
    /// Never send `READY`
    pub skip_ready: bool,
    /// Keep running after SIGTERM
    pub ignore_terminate: bool,
    /// Always answer health checks with `false`
    pub unhealthy: bool,
    /// Probability of answering a health check with `false`
    pub flaky_rate: Option<f64>,
}

impl ChaosConfig {
    pub fn is_enabled(&self) -> bool {
        *self != Self::default()
    }

    /// Health verdict forced by chaos, if any
    pub fn forced_health(&self) -> Option<bool> {
        if self.unhealthy {
            return Some(false);
        }
        match self.flaky_rate {
            Some(rate) if rand::random::<f64>() < rate => Some(false),
            _ => None,
        }
    }
}

impl FromStr for ChaosConfig {
    type Err = WorkerEnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = ChaosConfig::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item.split_once('=') {
                None if item == "skip-ready" => config.skip_ready = true,
                None if item == "ignore-terminate" => config.ignore_terminate = true,
                None if item == "unhealthy" => config.unhealthy = true,
                Some(("flaky", rate)) => {
                    let rate: f64 = rate.trim().parse().map_err(|_| WorkerEnvError::Invalid {
                        name: BOT_CHAOS,
                        reason: format!("flaky rate {:?} is not a number", rate),
                    })?;
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(WorkerEnvError::Invalid {
                            name: BOT_CHAOS,
                            reason: format!("flaky rate {} is outside 0..=1", rate),
                        });
                    }
                    config.flaky_rate = Some(rate);
                }
                _ => {
                    return Err(WorkerEnvError::Invalid {
                        name: BOT_CHAOS,
                        reason: format!("unknown fault {:?}", item),
                    })
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_faults() {
        let config: ChaosConfig = "skip-ready, ignore-terminate,unhealthy,flaky=0.25"
            .parse()
            .unwrap();
        assert!(config.skip_ready);
        assert!(config.ignore_terminate);
        assert!(config.unhealthy);
        assert_eq!(config.flaky_rate, Some(0.25));
        assert!(config.is_enabled());
    }

    #[test]
    fn test_empty_is_disabled() {
        let config: ChaosConfig = "".parse().unwrap();
        assert!(!config.is_enabled());
        assert_eq!(config.forced_health(), None);
    }

    #[test]
    fn test_rejects_unknown_and_bad_rate() {
        assert!("explode".parse::<ChaosConfig>().is_err());
        assert!("flaky=lots".parse::<ChaosConfig>().is_err());
        assert!("flaky=1.5".parse::<ChaosConfig>().is_err());
    }

    #[test]
    fn test_forced_health() {
        let always = ChaosConfig {
            flaky_rate: Some(1.0),
            ..Default::default()
        };
        assert_eq!(always.forced_health(), Some(false));

        let never = ChaosConfig {
            flaky_rate: Some(0.0),
            ..Default::default()
        };
        assert_eq!(never.forced_health(), None);
    }
}
