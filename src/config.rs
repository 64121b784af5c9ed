//! Process-wide configuration for the background timer.
//!
//! The configuration is read exactly once, when the first stopwatch that
//! needs a timer starts the global scheduler. Install a custom
//! configuration with [`configure`] before that happens:
//!
//! ```rust
//! use overdue::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_json(r#"{ "thread_name": "slow-op-timer" }"#).unwrap();
//! if let Err(err) = overdue::configure(config) {
//!     eprintln!("keeping the existing timer configuration: {err}");
//! }
//! ```

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DeadlineError;

const DEFAULT_THREAD_NAME: &str = "overdue-timer";
const DEFAULT_FIRE_THREAD_NAME: &str = "overdue-fire";
const DEFAULT_COMPACT_AFTER: usize = 64;

/// Settings for the background timer thread.
///
/// Every field has a default, so a partial JSON document is enough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name of the long-lived thread that waits for deadlines.
    pub thread_name: String,
    /// Name of the short-lived threads that deliver `timed_out` notifications.
    pub fire_thread_name: String,
    /// Minimum number of stopped timers before the queue is compacted.
    pub compact_after: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            fire_thread_name: DEFAULT_FIRE_THREAD_NAME.to_string(),
            compact_after: DEFAULT_COMPACT_AFTER,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, DeadlineError> {
        let config: SchedulerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Thread names must be non-empty and free of NUL bytes.
    pub fn validate(&self) -> Result<(), DeadlineError> {
        for (field, name) in [
            ("thread_name", &self.thread_name),
            ("fire_thread_name", &self.fire_thread_name),
        ] {
            if name.is_empty() {
                return Err(DeadlineError::InvalidConfig(format!("{field} is empty")));
            }
            if name.contains('\0') {
                return Err(DeadlineError::InvalidConfig(format!(
                    "{field} contains a NUL byte"
                )));
            }
        }
        Ok(())
    }
}

static CONFIG: OnceCell<SchedulerConfig> = OnceCell::new();

/// Install the configuration used by the global scheduler.
///
/// Call this once at application startup, before the first deadline that
/// arms a timer. Once the scheduler has started (or a configuration has been
/// installed), further calls are rejected with
/// [`DeadlineError::AlreadyConfigured`].
pub fn configure(config: SchedulerConfig) -> Result<(), DeadlineError> {
    config.validate()?;
    if CONFIG.set(config).is_err() {
        warn!(
            event = "Configure",
            "Scheduler configuration was already installed. Ignoring subsequent configure call. Configure before the first deadline."
        );
        return Err(DeadlineError::AlreadyConfigured);
    }
    Ok(())
}

/// The installed configuration, falling back to the defaults.
pub(crate) fn installed() -> &'static SchedulerConfig {
    CONFIG.get_or_init(SchedulerConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use yare::parameterized;

    #[test]
    fn test_default_config_serialization() {
        insta::assert_json_snapshot!(SchedulerConfig::default(), @r#"
        {
          "thread_name": "overdue-timer",
          "fire_thread_name": "overdue-fire",
          "compact_after": 64
        }
        "#);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SchedulerConfig::from_json(r#"{ "compact_after": 8 }"#).unwrap();
        assert_eq!(config.compact_after, 8);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert_eq!(config.fire_thread_name, DEFAULT_FIRE_THREAD_NAME);
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[parameterized(
        empty_thread_name = { r#"{ "thread_name": "" }"#, "thread_name is empty" },
        empty_fire_thread_name = { r#"{ "fire_thread_name": "" }"#, "fire_thread_name is empty" },
        nul_thread_name = { r#"{ "thread_name": "a\u0000b" }"#, "thread_name contains a NUL byte" },
    )]
    fn test_invalid_names_are_rejected(json: &str, reason: &str) {
        let err = SchedulerConfig::from_json(json).unwrap_err();
        assert_eq!(err, DeadlineError::InvalidConfig(reason.to_string()));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = SchedulerConfig::from_json(r#"{ "compact_after": "lots" }"#).unwrap_err();
        assert!(matches!(err, DeadlineError::InvalidConfig(_)));
    }

    #[test]
    #[serial]
    fn test_configure_rejects_invalid_before_checking_installed() {
        let config = SchedulerConfig {
            thread_name: String::new(),
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            configure(config),
            Err(DeadlineError::InvalidConfig(_))
        ));
    }

    #[test]
    #[serial]
    fn test_configure_after_install_is_rejected() {
        let _ = installed();
        assert_eq!(
            configure(SchedulerConfig::default()),
            Err(DeadlineError::AlreadyConfigured)
        );
    }
}
