use std::fmt::{Display, Formatter};
use std::path::Path;

/// Why a background check decided the file should be closed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CloseReason {
    Inactive,
    Removed,
    Renamed,
    Timeout,
}

impl CloseReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Inactive => "inactive",
            CloseReason::Removed => "removed",
            CloseReason::Renamed => "renamed",
            CloseReason::Timeout => "timeout",
        }
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hooks for metrics of harvesters, every method is a no-op by default.
///
/// Implementations are called from the reading task and the monitoring tasks
/// concurrently.
pub trait Reporter: Send + Sync {
    fn opened(&self, _path: &Path, _offset: u64) {}

    fn bytes_read(&self, _path: &Path, _size: usize) {}

    fn close_requested(&self, _path: &Path, _reason: CloseReason) {}

    fn closed(&self, _path: &Path) {}
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}
