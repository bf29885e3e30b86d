use std::io;

/// Terminal outcomes of [`Harvester::read`](crate::Harvester::read).
///
/// Once any of them is returned the harvester must be closed, further reads
/// fail with `Closed`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reader was cancelled, by its owner, by the parent scope or by the
    /// `close.reader.after_interval` timeout.
    #[error("reader closed")]
    Closed,

    /// Nothing was read for longer than `close.on_state_change.inactive`.
    #[error("inactive file, reader closed")]
    Inactive,

    /// The file shrank below the offset we already consumed, it must be read
    /// again from the beginning by a new harvester.
    #[error("detected file being truncated, offset {offset} > size {size}")]
    Truncated { offset: u64, size: u64 },

    #[error("stat file failed: {0}")]
    Stat(#[source] io::Error),

    #[error("read file failed: {0}")]
    Read(#[source] io::Error),
}

impl Error {
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }

    #[inline]
    pub fn is_inactive(&self) -> bool {
        matches!(self, Error::Inactive)
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Error::Truncated { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Stat(err) | Error::Read(err) => err,
            Error::Closed | Error::Inactive => io::Error::new(io::ErrorKind::Interrupted, err),
            Error::Truncated { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
