//! Places backups are written to and read from.
//!
//! A handle is opened, used and closed inside a single export or import.
//! The writer or reader is dropped on every exit path, which closes it.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::Error;

/// Somewhere a backup can be written.
pub trait DestinationHandle: Send + 'static {
    /// Open for writing. `suggested_name` is a file name the handle may use
    /// if it picks its own location. Returns the writer and a human-readable
    /// description of where the bytes go.
    fn open_write(&self, suggested_name: &str) -> Result<(Box<dyn Write + Send>, String), Error>;
}

/// Somewhere a backup can be read from.
pub trait SourceHandle: Send + 'static {
    fn open_read(&self) -> Result<Box<dyn Read + Send>, Error>;

    /// Human-readable description of the source.
    fn describe(&self) -> String;
}

/// A user-picked file, used both for export and import.
#[derive(Debug, Clone)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DestinationHandle for FileHandle {
    fn open_write(&self, _suggested_name: &str) -> Result<(Box<dyn Write + Send>, String), Error> {
        let file = File::create(&self.path).map_err(|e| {
            Error::HandleUnavailable(format!("cannot create {}: {}", self.path.display(), e))
        })?;
        Ok((Box::new(BufWriter::new(file)), self.path.display().to_string()))
    }
}

impl SourceHandle for FileHandle {
    fn open_read(&self) -> Result<Box<dyn Read + Send>, Error> {
        let file = File::open(&self.path).map_err(|e| {
            Error::HandleUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A backup directory. Each export creates a new file named after the
/// suggested name; the directory is created on first use.
#[derive(Debug, Clone)]
pub struct BackupFolder {
    dir: PathBuf,
}

impl BackupFolder {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl DestinationHandle for BackupFolder {
    fn open_write(&self, suggested_name: &str) -> Result<(Box<dyn Write + Send>, String), Error> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::HandleUnavailable(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        FileHandle::new(self.dir.join(suggested_name)).open_write(suggested_name)
    }
}

/// Write `bytes` to `dest` and close it. Returns where they went.
pub(crate) fn write_to(
    dest: &dyn DestinationHandle,
    suggested_name: &str,
    bytes: &[u8],
) -> Result<String, Error> {
    let (mut writer, location) = dest.open_write(suggested_name)?;
    writer
        .write_all(bytes)
        .and_then(|()| writer.flush())
        .map_err(|e| Error::HandleUnavailable(format!("failed to write {}: {}", location, e)))?;
    Ok(location)
}

/// Read everything from `source` and close it.
pub(crate) fn read_from(source: &dyn SourceHandle) -> Result<Vec<u8>, Error> {
    let mut reader = source.open_read()?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(|e| {
        Error::HandleUnavailable(format!("failed to read {}: {}", source.describe(), e))
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_handle_write_then_read() {
        let temp = TempDir::new().unwrap();
        let handle = FileHandle::new(temp.path().join("backup.json"));

        let location = write_to(&handle, "ignored.json", b"[]").unwrap();
        assert!(location.ends_with("backup.json"));
        assert_eq!(read_from(&handle).unwrap(), b"[]");
    }

    #[test]
    fn test_backup_folder_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Download").join("sunote1");
        let folder = BackupFolder::new(&dir);

        let location = write_to(&folder, "sunote_backup_20260101_000000.json", b"[]").unwrap();
        assert!(dir.join("sunote_backup_20260101_000000.json").is_file());
        assert!(location.ends_with("sunote_backup_20260101_000000.json"));
    }

    #[test]
    fn test_missing_source_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let handle = FileHandle::new(temp.path().join("nope.json"));
        assert!(matches!(read_from(&handle), Err(Error::HandleUnavailable(_))));
    }
}
