use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backoff::ExponentialBackoff;
use tripwire::{Trigger, Tripwire};

use crate::config::Config;
use crate::error::Error;
use crate::file::{FileHandle, LogFile, is_checksum_mismatch};
use crate::report::{NoopReporter, Reporter};
use crate::state::{INACTIVE, ReadState, StateChecker, close_if_timeout, periodic_state_check};
use crate::task::TaskGroup;

/// What to do once the underlying read reports the end of the file.
enum Next {
    /// The end of file is terminal, there is nothing more to wait for.
    Eof,
    /// Back off, and read again.
    Wait,
}

/// Reads a single file, waiting for new data once the end of the file is
/// reached, until it is cancelled or one of the close conditions applies.
///
/// Background tasks watch the file and cancel the harvester when it should be
/// closed, the next `read` observes the cancellation and returns
/// [`Error::Inactive`] or [`Error::Closed`].
pub struct Harvester<F: FileHandle = LogFile> {
    file: F,
    path: PathBuf,
    close_on_eof: bool,

    state: Arc<ReadState>,
    backoff: ExponentialBackoff,

    trigger: Trigger,
    tripwire: Tripwire,
    tasks: TaskGroup,

    reporter: Arc<dyn Reporter>,
    closed: bool,
}

impl<F: FileHandle> Harvester<F> {
    /// Create a harvester reading `file` from its current position. It is
    /// cancelled once `parent` is.
    ///
    /// Must be called within a Tokio runtime, monitoring tasks are spawned
    /// onto it.
    pub fn new(file: F, parent: &Tripwire, config: &Config) -> io::Result<Self> {
        Self::with_reporter(file, parent, config, Arc::new(NoopReporter))
    }

    pub fn with_reporter(
        mut file: F,
        parent: &Tripwire,
        config: &Config,
        reporter: Arc<dyn Reporter>,
    ) -> io::Result<Self> {
        config
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        let offset = file.seek(SeekFrom::Current(0))?;
        let path = file.name().to_path_buf();
        let (trigger, tripwire) = parent.child(format!("harvester {}", path.display()));
        let state = Arc::new(ReadState::new(offset));
        let mut tasks = TaskGroup::new(&tripwire, "monitors");

        if let Some(timeout) = config.close.reader.after_interval() {
            let path = path.clone();
            let reader = trigger.clone();
            let reporter = Arc::clone(&reporter);

            if let Err(err) = tasks.spawn("close_if_timeout", move |tripwire| {
                close_if_timeout(path, timeout, reader, tripwire, reporter)
            }) {
                debug!(message = "Timeout closer not started", %err);
            }
        }

        let on_state_change = &config.close.on_state_change;
        if on_state_change.enabled() {
            let removed = on_state_change.removed;
            let renamed = on_state_change.renamed;
            let monitor = if removed || renamed {
                Some(file.monitor()?)
            } else {
                None
            };

            let checker = StateChecker::new(
                path.clone(),
                Arc::clone(&state),
                on_state_change.inactive(),
                removed,
                renamed,
                monitor,
            );
            let interval = on_state_change.check_interval;
            let reader = trigger.clone();
            let reporter = Arc::clone(&reporter);

            if let Err(err) = tasks.spawn("periodic_state_check", move |tripwire| {
                periodic_state_check(checker, interval, reader, tripwire, reporter)
            }) {
                debug!(message = "State checker not started", %err);
            }
        }

        debug!(
            message = "Harvester started",
            ?path,
            offset,
            monitors = tasks.len(),
        );
        reporter.opened(&path, offset);

        Ok(Harvester {
            file,
            path,
            close_on_eof: config.close.reader.on_eof,
            state,
            backoff: ExponentialBackoff::new(config.backoff.init, config.backoff.max),
            trigger,
            tripwire,
            tasks,
            reporter,
            closed: false,
        })
    }

    /// Bytes consumed so far, including the start offset.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.state.offset()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read whatever is available into `buf`, waiting with backoff when there
    /// is nothing new yet.
    ///
    /// Returns as soon as any bytes are read, even if `buf` is not filled.
    /// `Ok(0)` is returned for a non-empty `buf` only when the end of file is
    /// terminal, `close.reader.on_eof` is set or the file is compressed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            if self.tripwire.is_cancelled() {
                return Err(self.cancelled());
            }

            if buf.is_empty() {
                return Ok(0);
            }

            match self.file.read(buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.state.advance(n);
                    self.backoff.reset();
                    self.reporter.bytes_read(&self.path, n);

                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if is_checksum_mismatch(&err) => {
                    // the decoder consumed everything already
                    warn!(
                        message = "Gzip checksum mismatch, treat it as end of file",
                        path = ?self.path,
                        offset = self.state.offset(),
                    );
                }
                Err(err) => {
                    error!(
                        message = "Unexpected error reading file",
                        path = ?self.path,
                        %err,
                    );

                    return Err(self.fail(Error::Read(err)));
                }
            }

            match self.handle_eof() {
                Ok(Next::Eof) => {
                    debug!(message = "End of file reached", path = ?self.path);
                    return Ok(0);
                }
                Ok(Next::Wait) => {}
                Err(err) => return Err(self.fail(err)),
            }

            debug!(
                message = "End of file reached, backing off",
                path = ?self.path,
                wait = ?self.backoff.current(),
            );

            // interrupted waits are handled at the top of the loop
            self.backoff.wait_until(&mut self.tripwire).await;
        }
    }

    fn handle_eof(&self) -> Result<Next, Error> {
        // compressed files never grow
        if self.close_on_eof || self.file.is_compressed() {
            return Ok(Next::Eof);
        }

        let info = self.file.stat().map_err(|err| {
            error!(
                message = "Unexpected error reading stat of file",
                path = ?self.path,
                %err,
            );

            Error::Stat(err)
        })?;

        let offset = self.state.offset();
        if info.size < offset {
            debug!(
                message = "File was truncated",
                path = ?self.path,
                offset,
                size = info.size,
            );

            return Err(Error::Truncated {
                offset,
                size: info.size,
            });
        }

        Ok(Next::Wait)
    }

    /// The harvester is done once a terminal error is returned, cancel the
    /// scope so monitors stop and later reads fail fast.
    fn fail(&self, err: Error) -> Error {
        self.trigger.cancel();
        err
    }

    /// The cause is decided by whoever cancelled the scope first.
    fn cancelled(&self) -> Error {
        if self.tripwire.reason() == Some(INACTIVE) {
            Error::Inactive
        } else {
            Error::Closed
        }
    }

    /// Cancel the harvester, close the file, and wait for all monitoring tasks
    /// to stop. Calling it again is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.trigger.cancel();
        let result = self.file.close();

        for err in self.tasks.stop().await {
            warn!(
                message = "Monitoring task failed",
                path = ?self.path,
                %err,
            );
        }

        self.reporter.closed(&self.path);
        debug!(
            message = "Harvester closed",
            path = ?self.path,
            offset = self.state.offset(),
        );

        result
    }
}

impl<F: FileHandle> Drop for Harvester<F> {
    fn drop(&mut self) {
        self.trigger.cancel();
    }
}
