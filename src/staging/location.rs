//! External locations: where imported bytes come from and exported bytes go.
//!
//! The engine never interprets a location's addressing scheme. It only asks
//! a source for a reader and hands a destination a reader to drain.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A caller-supplied handle that can be read once as a byte stream.
pub trait ExternalSource: Send + Sync {
    /// Open the source for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened.
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Human-readable description for logs and reports.
    fn describe(&self) -> String;
}

/// A caller-supplied handle that can be written once as a byte stream.
pub trait ExternalDestination: Send + Sync {
    /// Drain `reader` into the destination, returning the bytes written.
    ///
    /// Implementations must not leave a half-written artifact behind
    /// when they can avoid it.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be opened or written.
    fn write_from(&self, reader: &mut dyn Read) -> io::Result<u64>;

    /// Human-readable description for logs and reports.
    fn describe(&self) -> String;

    /// The local file this destination replaces, if it is one.
    ///
    /// The coordinator uses it to refuse exporting over the application
    /// database.
    fn local_path(&self) -> Option<&Path> {
        None
    }
}

/// A location on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    path: PathBuf,
}

impl FileLocation {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExternalSource for FileLocation {
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl ExternalDestination for FileLocation {
    /// Write atomically: temp file beside the target, fsync, rename.
    ///
    /// If any step fails, the original file (if any) remains untouched.
    fn write_from(&self, reader: &mut dyn Read) -> io::Result<u64> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let temp = tempfile::Builder::new()
            .prefix(".tabxfer-")
            .suffix(".partial")
            .tempfile_in(&parent)?;

        let written = {
            let mut writer = BufWriter::new(temp.as_file());
            let n = io::copy(reader, &mut writer)?;
            writer.flush()?;
            n
        };
        temp.as_file().sync_all()?;

        // Dropping `temp` on an earlier error removes the partial file
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(written)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Standard input (as a source) or standard output (as a destination).
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioLocation;

impl ExternalSource for StdioLocation {
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::stdin()))
    }

    fn describe(&self) -> String {
        "<stdin>".to_string()
    }
}

impl ExternalDestination for StdioLocation {
    fn write_from(&self, reader: &mut dyn Read) -> io::Result<u64> {
        let mut out = io::stdout().lock();
        let n = io::copy(reader, &mut out)?;
        out.flush()?;
        Ok(n)
    }

    fn describe(&self) -> String {
        "<stdout>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_source_reads_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("in.db");
        fs::write(&path, b"hello").unwrap();

        let mut buf = Vec::new();
        FileLocation::new(&path)
            .open_reader()
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn test_file_source_missing() {
        let result = FileLocation::new("/nonexistent/in.db").open_reader();
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_destination_writes_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.db");

        let written = FileLocation::new(&path)
            .write_from(&mut &b"payload"[..])
            .unwrap();

        assert_eq!(written, 7);
        assert_eq!(fs::read(&path).unwrap(), b"payload");

        // Only the target remains in the directory
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("source went away"))
        }
    }

    #[test]
    fn test_file_destination_failure_keeps_original() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.db");
        fs::write(&path, b"original").unwrap();

        let result = FileLocation::new(&path).write_from(&mut FailingReader);
        assert!(result.is_err());

        assert_eq!(fs::read(&path).unwrap(), b"original");
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "partial file should be cleaned up");
    }

    #[test]
    fn test_describe() {
        assert_eq!(ExternalSource::describe(&StdioLocation), "<stdin>");
        assert_eq!(ExternalDestination::describe(&StdioLocation), "<stdout>");
        assert_eq!(
            ExternalSource::describe(&FileLocation::new("/a/b.db")),
            "/a/b.db"
        );
    }
}
