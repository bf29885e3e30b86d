use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::file::{FileHandle, FileId, FileInfo, FileMonitor};
use crate::report::{CloseReason, Reporter};

const MOCK_ID: FileId = FileId { dev: 1, inode: 1 };

#[derive(Clone, Copy, Debug)]
pub enum PathState {
    Same,
    Missing,
    Replaced,
    Error(io::ErrorKind),
}

pub struct Shared {
    pub data: Mutex<Vec<u8>>,
    pub path_state: Mutex<PathState>,
    pub read_error: Mutex<Option<fn() -> io::Error>>,
    pub stat_error: AtomicBool,
    pub unlinked: AtomicBool,

    pub reads: AtomicUsize,
    pub stats: AtomicUsize,
    pub path_stats: AtomicUsize,
    pub removed_checks: AtomicUsize,
    pub closes: AtomicUsize,
    pub monitors_alive: AtomicUsize,
}

/// An in-memory file, which counts every operation.
pub struct MockFile {
    pub shared: Arc<Shared>,
    position: usize,
    compressed: bool,
}

impl MockFile {
    pub fn new(data: &[u8]) -> MockFile {
        MockFile {
            shared: Arc::new(Shared {
                data: Mutex::new(data.to_vec()),
                path_state: Mutex::new(PathState::Same),
                read_error: Mutex::new(None),
                stat_error: AtomicBool::new(false),
                unlinked: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
                stats: AtomicUsize::new(0),
                path_stats: AtomicUsize::new(0),
                removed_checks: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                monitors_alive: AtomicUsize::new(0),
            }),
            position: 0,
            compressed: false,
        }
    }

    pub fn compressed(mut self) -> MockFile {
        self.compressed = true;
        self
    }

    pub fn truncate(&self, size: usize) {
        self.shared.data.lock().unwrap().truncate(size);
    }

    pub fn set_path_state(&self, state: PathState) {
        *self.shared.path_state.lock().unwrap() = state;
    }

    pub fn fail_reads_with(&self, f: fn() -> io::Error) {
        *self.shared.read_error.lock().unwrap() = Some(f);
    }

    pub fn reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }
}

impl FileHandle for MockFile {
    fn name(&self) -> &Path {
        Path::new("mock.log")
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.shared.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(f) = *self.shared.read_error.lock().unwrap() {
            return Err(f());
        }

        let data = self.shared.data.lock().unwrap();
        if self.position >= data.len() {
            return Ok(0);
        }

        let size = buf.len().min(data.len() - self.position);
        buf[..size].copy_from_slice(&data[self.position..self.position + size]);
        self.position += size;

        Ok(size)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => self.position = offset as usize,
            SeekFrom::Current(delta) => self.position = (self.position as i64 + delta) as usize,
            SeekFrom::End(delta) => {
                let len = self.shared.data.lock().unwrap().len();
                self.position = (len as i64 + delta) as usize;
            }
        }

        Ok(self.position as u64)
    }

    fn stat(&self) -> io::Result<FileInfo> {
        self.shared.stats.fetch_add(1, Ordering::SeqCst);

        if self.shared.stat_error.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }

        Ok(FileInfo {
            size: self.shared.data.lock().unwrap().len() as u64,
            id: MOCK_ID,
        })
    }

    fn is_compressed(&self) -> bool {
        self.compressed
    }

    fn monitor(&self) -> io::Result<Box<dyn FileMonitor>> {
        self.shared.monitors_alive.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockMonitor {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn close(&mut self) -> io::Result<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockMonitor {
    shared: Arc<Shared>,
}

impl Drop for MockMonitor {
    fn drop(&mut self) {
        self.shared.monitors_alive.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FileMonitor for MockMonitor {
    fn stat(&self) -> io::Result<FileInfo> {
        self.shared.path_stats.fetch_add(1, Ordering::SeqCst);

        let size = self.shared.data.lock().unwrap().len() as u64;
        match *self.shared.path_state.lock().unwrap() {
            PathState::Same => Ok(FileInfo { size, id: MOCK_ID }),
            PathState::Missing => Err(io::Error::from(io::ErrorKind::NotFound)),
            PathState::Replaced => Ok(FileInfo {
                size: 0,
                id: FileId { dev: 1, inode: 2 },
            }),
            PathState::Error(kind) => Err(io::Error::from(kind)),
        }
    }

    fn id(&self) -> FileId {
        MOCK_ID
    }

    fn is_removed(&self) -> bool {
        self.shared.removed_checks.fetch_add(1, Ordering::SeqCst);
        self.shared.unlinked.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordReporter {
    reasons: Mutex<Vec<CloseReason>>,
    pub read: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl RecordReporter {
    pub fn reasons(&self) -> Vec<CloseReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl Reporter for RecordReporter {
    fn opened(&self, _path: &Path, _offset: u64) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn bytes_read(&self, _path: &Path, size: usize) {
        self.read.fetch_add(size, Ordering::SeqCst);
    }

    fn close_requested(&self, _path: &Path, reason: CloseReason) {
        self.reasons.lock().unwrap().push(reason);
    }

    fn closed(&self, _path: &Path) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Timers fire on millisecond ticks, so allow a little slack.
#[track_caller]
pub fn assert_elapsed(start: Instant, want: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= want && elapsed < want + Duration::from_millis(50),
        "elapsed {elapsed:?}, want {want:?}"
    );
}
