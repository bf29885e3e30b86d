mod config;
mod error;
mod file;
mod harvester;
mod report;
mod state;
mod task;
#[cfg(test)]
mod testing;

#[macro_use]
extern crate tracing;

// re-export
pub use config::{
    BackoffConfig, CloseConfig, Config, ConfigError, ReaderCloseConfig, StateChangeConfig,
};
pub use error::Error;
pub use file::{
    ChecksumMismatch, FileHandle, FileId, FileInfo, FileMonitor, LogFile, PathMonitor,
    is_checksum_mismatch,
};
pub use harvester::Harvester;
pub use report::{CloseReason, NoopReporter, Reporter};
pub use task::{BoxError, TaskError, TaskGroup};
