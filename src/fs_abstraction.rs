//! Filesystem abstraction layer for testability
//!
//! The block store reads and writes its table through [`FileSystem`], which
//! lets unit tests simulate a full or read-only disk with `mockall`.

use std::io::{self, Write};
use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting the filesystem operations the block store needs.
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Replace `path` with `contents` so readers see either the old or the
    /// new file, never a torn write.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Real filesystem implementation using std::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    /// Uses tempfile + rename to prevent corruption on crash.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        // Same directory as the target so the rename stays on one filesystem
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(contents)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_real_fs_write_atomic_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("table.json");

        let fs = RealFileSystem;
        fs.write_atomic(&file_path, b"[]").unwrap();
        assert_eq!(fs.read_to_string(&file_path).unwrap(), "[]");
    }

    #[test]
    fn test_real_fs_write_atomic_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("table.json");

        let fs = RealFileSystem;
        fs.write_atomic(&file_path, b"first version, longer").unwrap();
        fs.write_atomic(&file_path, b"second").unwrap();
        assert_eq!(fs.read_to_string(&file_path).unwrap(), "second");
    }

    #[test]
    fn test_real_fs_write_atomic_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("table.json");

        RealFileSystem.write_atomic(&file_path, b"[]").unwrap();
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_real_fs_write_atomic_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("missing/table.json");
        assert!(RealFileSystem.write_atomic(&file_path, b"[]").is_err());
    }

    #[test]
    fn test_real_fs_exists_and_create_dir_all() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");

        let fs = RealFileSystem;
        assert!(!fs.exists(&nested));
        fs.create_dir_all(&nested).unwrap();
        assert!(fs.exists(&nested));
    }

    #[test]
    fn test_real_fs_read_nonexistent() {
        let err = RealFileSystem
            .read_to_string(Path::new("/nonexistent/pathwarden/table.json"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_real_fs_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RealFileSystem>();
    }

    #[test]
    fn test_mock_fs_error_simulation() {
        let mut mock = MockFileSystem::new();
        mock.expect_write_atomic()
            .returning(|_, _| Err(io::Error::new(ErrorKind::Other, "No space left on device")));

        let err = mock.write_atomic(Path::new("/x"), b"[]").unwrap_err();
        assert!(err.to_string().contains("No space"));
    }
}
