use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tripwire::{Trigger, Tripwire};

use crate::file::FileMonitor;
use crate::report::{CloseReason, Reporter};
use crate::task::BoxError;

/// Cancel reason of harvesters closed for inactivity.
pub(crate) const INACTIVE: &str = "inactive";

/// Read progress of a harvester. It is written by the reading task only, and
/// read by the state checker, which tolerates slightly stale values.
#[derive(Debug)]
pub(crate) struct ReadState {
    epoch: Instant,

    offset: AtomicU64,
    // nanoseconds since `epoch`
    last_read: AtomicU64,
}

impl ReadState {
    pub(crate) fn new(offset: u64) -> ReadState {
        ReadState {
            epoch: Instant::now(),
            offset: AtomicU64::new(offset),
            last_read: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Record `size` consumed bytes, and returns the new offset.
    pub(crate) fn advance(&self, size: usize) -> u64 {
        let offset = self.offset.fetch_add(size as u64, Ordering::AcqRel) + size as u64;
        self.last_read
            .store(self.epoch.elapsed().as_nanos() as u64, Ordering::Release);

        offset
    }

    /// Time passed since the last successful read.
    pub(crate) fn idle(&self) -> Duration {
        let last_read = Duration::from_nanos(self.last_read.load(Ordering::Acquire));
        self.epoch.elapsed().saturating_sub(last_read)
    }
}

/// Decides whether a file should be closed, because it is inactive, removed
/// or renamed.
pub(crate) struct StateChecker {
    path: PathBuf,
    state: Arc<ReadState>,

    inactive: Option<Duration>,
    removed: bool,
    renamed: bool,
    // only needed when `removed` or `renamed` is enabled
    monitor: Option<Box<dyn FileMonitor>>,
}

impl StateChecker {
    pub(crate) fn new(
        path: PathBuf,
        state: Arc<ReadState>,
        inactive: Option<Duration>,
        removed: bool,
        renamed: bool,
        monitor: Option<Box<dyn FileMonitor>>,
    ) -> StateChecker {
        StateChecker {
            path,
            state,
            inactive,
            removed,
            renamed,
            monitor,
        }
    }

    /// Inactivity is checked first, it needs no syscall at all. The filesystem
    /// is only touched when removal or rename detection is enabled.
    pub(crate) fn should_close(&self) -> Option<CloseReason> {
        if let Some(inactive) = self.inactive {
            if self.state.idle() > inactive {
                debug!(
                    message = "File is inactive",
                    path = ?self.path,
                    idle = ?self.state.idle(),
                );

                return Some(CloseReason::Inactive);
            }
        }

        if !self.removed && !self.renamed {
            return None;
        }

        let monitor = self.monitor.as_ref()?;

        let info = match monitor.stat() {
            Ok(info) => info,
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    if self.removed {
                        debug!(
                            message = "File has been removed, and `close.on_state_change.removed` is enabled",
                            path = ?self.path,
                        );

                        return Some(CloseReason::Removed);
                    }

                    // moved away, and nothing took its path
                    debug!(
                        message = "File has been renamed, and `close.on_state_change.renamed` is enabled",
                        path = ?self.path,
                    );

                    return Some(CloseReason::Renamed);
                }

                // keep the file open, hoping everything goes back to normal
                error!(
                    message = "Unexpected error stating file",
                    path = ?self.path,
                    %err,
                );

                return None;
            }
        };

        if self.renamed && info.id != monitor.id() {
            debug!(
                message = "File has been renamed, and `close.on_state_change.renamed` is enabled",
                path = ?self.path,
            );

            return Some(CloseReason::Renamed);
        }

        if self.removed && monitor.is_removed() {
            debug!(
                message = "File has been removed, and `close.on_state_change.removed` is enabled",
                path = ?self.path,
            );

            return Some(CloseReason::Removed);
        }

        None
    }

    /// Evaluate the close conditions, and cancel the reader if one applies.
    /// Returns true once the reader is cancelled, by this check or anything
    /// else.
    ///
    /// The reason is reported only if this check cancelled the reader, a
    /// reader already closed keeps its cause.
    pub(crate) fn check(&self, reader: &Trigger, reporter: &dyn Reporter) -> bool {
        let Some(reason) = self.should_close() else {
            return reader.is_cancelled();
        };

        let won = match reason {
            CloseReason::Inactive => reader.cancel_with(INACTIVE),
            _ => reader.cancel(),
        };
        if won {
            reporter.close_requested(&self.path, reason);
        } else {
            debug!(
                message = "Reader closed already, keep its cause",
                path = ?self.path,
                ?reason,
            );
        }

        true
    }
}

/// Evaluate the checker every `interval`, and cancel the reader once it says
/// the file should be closed.
pub(crate) async fn periodic_state_check(
    checker: StateChecker,
    interval: Duration,
    reader: Trigger,
    mut tripwire: Tripwire,
    reporter: Arc<dyn Reporter>,
) -> Result<(), BoxError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut tripwire => break,
            _ = ticker.tick() => {}
        }

        if checker.check(&reader, &*reporter) {
            break;
        }
    }

    Ok(())
}

/// Cancel the reader once `timeout` elapsed, no matter what.
pub(crate) async fn close_if_timeout(
    path: PathBuf,
    timeout: Duration,
    reader: Trigger,
    tripwire: Tripwire,
    reporter: Arc<dyn Reporter>,
) -> Result<(), BoxError> {
    tokio::select! {
        biased;

        _ = tripwire => {},
        _ = tokio::time::sleep(timeout) => {
            debug!(
                message = "Closing file, `close.reader.after_interval` reached",
                ?path,
                ?timeout,
            );

            if reader.cancel() {
                reporter.close_requested(&path, CloseReason::Timeout);
            }
        }
    }

    Ok(())
}
