use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use flate2::bufread::MultiGzDecoder;

/// Identity of the underlying file, it does not change when the file is
/// renamed, but a new file created at the same path has a new one.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileId {
    pub dev: u64,
    pub inode: u64,
}

impl From<&Metadata> for FileId {
    fn from(metadata: &Metadata) -> Self {
        FileId {
            dev: metadata.dev(),
            inode: metadata.ino(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FileInfo {
    pub size: u64,
    pub id: FileId,
}

impl From<&Metadata> for FileInfo {
    fn from(metadata: &Metadata) -> Self {
        FileInfo {
            size: metadata.size(),
            id: FileId::from(metadata),
        }
    }
}

/// The gzip trailer does not match the decompressed content. It shows up
/// only after all data has been consumed.
#[derive(Debug, thiserror::Error)]
#[error("gzip stream does not have a matching checksum")]
pub struct ChecksumMismatch;

/// Returns true if `err` wraps a [`ChecksumMismatch`].
pub fn is_checksum_mismatch(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<ChecksumMismatch>())
}

/// An open file, exclusively owned by one harvester.
pub trait FileHandle: Send + 'static {
    /// The path this file was opened with.
    fn name(&self) -> &Path;

    /// `Ok(0)` with a non-empty `buf` means the end of the file is reached,
    /// at least for now.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Stat the open handle.
    fn stat(&self) -> io::Result<FileInfo>;

    /// Compressed files can not grow, so there is no point to wait for more
    /// data once EOF is reached.
    fn is_compressed(&self) -> bool;

    /// Returns the probe used by background state checks.
    fn monitor(&self) -> io::Result<Box<dyn FileMonitor>>;

    fn close(&mut self) -> io::Result<()>;
}

/// Filesystem queries for a tracked file, which never touch the reading
/// position of the handle.
pub trait FileMonitor: Send + Sync + 'static {
    /// Stat by path.
    fn stat(&self) -> io::Result<FileInfo>;

    /// Identity of the open handle.
    fn id(&self) -> FileId;

    /// Whether the file of the open handle has been unlinked, even if the path
    /// resolves to another file now.
    fn is_removed(&self) -> bool;
}

enum Reader {
    Plain(File),
    Gzip {
        decoder: Box<MultiGzDecoder<BufReader<File>>>,
        // decompressed bytes consumed
        position: u64,
    },
}

struct Inner {
    // kept for stat, `Reader` owns a duplicated descriptor
    file: File,
    reader: Reader,
}

/// A file on the local filesystem, gzip compressed files are decompressed
/// transparently.
pub struct LogFile {
    path: PathBuf,
    id: FileId,
    compressed: bool,

    inner: Option<Inner>,
}

impl LogFile {
    /// Open the file and move to `offset`. For compressed files offset counts
    /// decompressed bytes.
    pub fn open(path: impl AsRef<Path>, offset: u64) -> io::Result<LogFile> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let id = FileId::from(&file.metadata()?);

        let mut buffered = BufReader::new(file.try_clone()?);
        let reader = if is_gzipped(&mut buffered)? {
            let mut decoder = MultiGzDecoder::new(buffered);

            // compressed stream is not seekable, decode and drop
            if offset != 0 {
                let skipped = io::copy(&mut (&mut decoder).take(offset), &mut io::sink())
                    .map_err(map_checksum_error)?;
                if skipped < offset {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("offset {offset} is beyond the decompressed size {skipped}"),
                    ));
                }
            }

            Reader::Gzip {
                decoder: Box::new(decoder),
                position: offset,
            }
        } else {
            // `fill_buf` moved the shared cursor already, seek is always needed
            let mut file = buffered.into_inner();
            file.seek(SeekFrom::Start(offset))?;

            Reader::Plain(file)
        };

        Ok(LogFile {
            path,
            id,
            compressed: matches!(reader, Reader::Gzip { .. }),
            inner: Some(Inner { file, reader }),
        })
    }

    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    fn inner(&self) -> io::Result<&Inner> {
        self.inner.as_ref().ok_or_else(closed)
    }
}

impl FileHandle for LogFile {
    fn name(&self) -> &Path {
        &self.path
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(closed)?;

        match &mut inner.reader {
            Reader::Plain(file) => file.read(buf),
            Reader::Gzip { decoder, position } => {
                let n = decoder.read(buf).map_err(map_checksum_error)?;
                *position += n as u64;
                Ok(n)
            }
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let inner = self.inner.as_mut().ok_or_else(closed)?;

        match (&mut inner.reader, pos) {
            (Reader::Plain(file), pos) => file.seek(pos),
            (Reader::Gzip { position, .. }, SeekFrom::Current(0)) => Ok(*position),
            (Reader::Gzip { .. }, _) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "seek is not supported on compressed files",
            )),
        }
    }

    fn stat(&self) -> io::Result<FileInfo> {
        let metadata = self.inner()?.file.metadata()?;
        Ok(FileInfo::from(&metadata))
    }

    fn is_compressed(&self) -> bool {
        self.compressed
    }

    fn monitor(&self) -> io::Result<Box<dyn FileMonitor>> {
        let file = self.inner()?.file.try_clone()?;

        Ok(Box::new(PathMonitor {
            path: self.path.clone(),
            id: self.id,
            file,
        }))
    }

    fn close(&mut self) -> io::Result<()> {
        // descriptors are released on drop, closing twice is fine
        self.inner.take();
        Ok(())
    }
}

/// Stat the path of the tracked file, and hold a duplicated descriptor to
/// tell whether the file itself is unlinked.
pub struct PathMonitor {
    path: PathBuf,
    id: FileId,
    file: File,
}

impl FileMonitor for PathMonitor {
    fn stat(&self) -> io::Result<FileInfo> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(FileInfo::from(&metadata))
    }

    fn id(&self) -> FileId {
        self.id
    }

    fn is_removed(&self) -> bool {
        match self.file.metadata() {
            Ok(metadata) => metadata.nlink() == 0,
            Err(_) => true,
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("file already closed")
}

fn is_gzipped(r: &mut BufReader<File>) -> io::Result<bool> {
    let header_bytes = r.fill_buf()?;
    // WARN: The paired `BufReader::consume` is not called intentionally. If we
    // do we'll chop a decent part of the potential gzip stream off.
    Ok(header_bytes.starts_with(&[0x1f, 0x8b]))
}

// flate2 reports a mismatched trailer as `InvalidInput` without a dedicated
// error type.
fn map_checksum_error(err: io::Error) -> io::Error {
    if err.kind() == io::ErrorKind::InvalidInput && err.to_string().contains("checksum") {
        io::Error::new(io::ErrorKind::InvalidData, ChecksumMismatch)
    } else {
        err
    }
}
