use std::path::Path;

use serde::{Deserialize, Serialize};
use tail::{BackoffConfig, BoxError, CloseConfig};

const fn default_buffer_size() -> usize {
    16 * 1024
}

/// Configuration of the `filestream` command, loaded from a YAML file.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The most bytes a single read returns.
    #[serde(default = "default_buffer_size", with = "humanize::bytes::serde")]
    pub buffer_size: usize,

    /// Where to start reading, in bytes. For compressed files it counts the
    /// decompressed bytes.
    #[serde(default)]
    pub offset: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub close: CloseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_size: default_buffer_size(),
            offset: 0,
            backoff: BackoffConfig::default(),
            close: CloseConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, BoxError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str::<Config>(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BoxError> {
        if self.buffer_size == 0 {
            return Err("`buffer_size` must be greater than zero".into());
        }

        self.harvester().validate()?;

        Ok(())
    }

    /// Configuration for every harvester started by this command.
    pub fn harvester(&self) -> tail::Config {
        tail::Config {
            backoff: self.backoff.clone(),
            close: self.close.clone(),
        }
    }
}
