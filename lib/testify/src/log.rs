use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Simulates an application writing, and a tool rotating, a log file.
///
/// Every operation panics on failure, it is meant for tests only.
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    /// Create the file, or truncate it if it exists already.
    pub fn create(path: impl AsRef<Path>) -> LogWriter {
        let path = path.as_ref().to_path_buf();
        File::create(&path).expect("create log file");

        LogWriter { path }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, data: impl AsRef<[u8]>) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .expect("open log file for appending");

        file.write_all(data.as_ref()).expect("append to log file");
        file.sync_data().expect("sync log file");
    }

    /// Append every line with a trailing newline.
    pub fn append_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut data = String::new();
        for line in lines {
            data.push_str(line.as_ref());
            data.push('\n');
        }

        self.append(data);
    }

    /// Shrink the file to `size` bytes, in place.
    pub fn truncate(&self, size: u64) {
        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_len(size))
            .expect("truncate log file");
    }

    /// Move the file away, like `logrotate` does, the writer follows it.
    pub fn rename(&mut self, to: impl AsRef<Path>) {
        std::fs::rename(&self.path, to.as_ref()).expect("rename log file");
        self.path = to.as_ref().to_path_buf();
    }

    pub fn remove(self) {
        std::fs::remove_file(&self.path).expect("remove log file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp::temp_file;

    #[test]
    fn rotate() {
        let path = temp_file();
        let mut writer = LogWriter::create(&path);
        writer.append_lines(["foo", "bar"]);
        assert_eq!(std::fs::read(&path).unwrap(), b"foo\nbar\n");

        writer.truncate(4);
        assert_eq!(std::fs::read(&path).unwrap(), b"foo\n");

        let rotated = path.with_extension("1");
        writer.rename(&rotated);
        assert!(!path.exists());
        assert_eq!(writer.path(), rotated);

        writer.remove();
        assert!(!rotated.exists());
    }
}
