use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`backoff.init` must be greater than zero")]
    ZeroBackoff,

    #[error("`backoff.init` ({init:?}) must not be greater than `backoff.max` ({max:?})")]
    BackoffOutOfOrder { init: Duration, max: Duration },

    #[error("`close.on_state_change.check_interval` must be greater than zero")]
    ZeroCheckInterval,
}

const fn default_backoff_init() -> Duration {
    Duration::from_secs(2)
}

const fn default_backoff_max() -> Duration {
    Duration::from_secs(10)
}

/// How long to wait before reading again, once the end of the file is reached.
/// The wait doubles for every unproductive read, until `max` is reached.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// The first wait after an EOF.
    #[serde(default = "default_backoff_init", with = "humanize::duration::serde")]
    pub init: Duration,

    /// The maximum wait.
    #[serde(default = "default_backoff_max", with = "humanize::duration::serde")]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init: default_backoff_init(),
            max: default_backoff_max(),
        }
    }
}

const fn default_check_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_inactive() -> Option<Duration> {
    Some(Duration::from_secs(5 * 60))
}

const fn default_removed() -> bool {
    true
}

/// Conditions checked periodically, in the background, to decide whether the
/// file should be closed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StateChangeConfig {
    /// How often the conditions are evaluated.
    #[serde(default = "default_check_interval", with = "humanize::duration::serde")]
    pub check_interval: Duration,

    /// Close the file if nothing is read for this long.
    #[serde(default = "default_inactive", with = "humanize::duration::serde_option")]
    pub inactive: Option<Duration>,

    /// Close the file once it has been removed.
    #[serde(default = "default_removed")]
    pub removed: bool,

    /// Close the file once it has been renamed, or something else has taken
    /// its path.
    #[serde(default)]
    pub renamed: bool,
}

impl Default for StateChangeConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            inactive: default_inactive(),
            removed: default_removed(),
            renamed: false,
        }
    }
}

impl StateChangeConfig {
    /// The inactive threshold, a zero duration disables it.
    pub fn inactive(&self) -> Option<Duration> {
        self.inactive.filter(|d| !d.is_zero())
    }

    /// Whether the periodic state check has anything to do at all.
    pub fn enabled(&self) -> bool {
        self.inactive().is_some() || self.removed || self.renamed
    }
}

/// Conditions evaluated by the reader itself.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReaderCloseConfig {
    /// Stop reading once the end of the file is reached, instead of waiting
    /// for more data.
    #[serde(default)]
    pub on_eof: bool,

    /// Close the file after this long, no matter whether it is still active.
    #[serde(default, with = "humanize::duration::serde_option")]
    pub after_interval: Option<Duration>,
}

impl ReaderCloseConfig {
    /// The hard timeout, a zero duration disables it.
    pub fn after_interval(&self) -> Option<Duration> {
        self.after_interval.filter(|d| !d.is_zero())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CloseConfig {
    #[serde(default)]
    pub on_state_change: StateChangeConfig,

    #[serde(default)]
    pub reader: ReaderCloseConfig,
}

/// Configuration of a single [`Harvester`](crate::Harvester), it is immutable
/// for the lifetime of the harvester.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub close: CloseConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff.init.is_zero() {
            return Err(ConfigError::ZeroBackoff);
        }

        if self.backoff.init > self.backoff.max {
            return Err(ConfigError::BackoffOutOfOrder {
                init: self.backoff.init,
                max: self.backoff.max,
            });
        }

        let state = &self.close.on_state_change;
        if state.enabled() && state.check_interval.is_zero() {
            return Err(ConfigError::ZeroCheckInterval);
        }

        Ok(())
    }
}
