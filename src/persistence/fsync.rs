//! fsync helpers for journal durability.
//!
//! Creating a journal file adds an entry to its directory. That entry is only
//! durable once the directory itself has been synced, so new journals sync both.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn sync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs the directory containing `path`, making a newly created entry durable.
///
/// A bare file name (no parent component) syncs the current directory.
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = OpenOptions::new().read(true).open(parent)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn sync_file_works() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scans.log");

        let mut file = File::create(&path).unwrap();
        file.write_all(b"{}\n").unwrap();
        sync_file(&file).unwrap();
    }

    #[test]
    fn sync_parent_dir_works() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scans.log");
        File::create(&path).unwrap();

        sync_parent_dir(&path).unwrap();
    }

    #[test]
    fn sync_parent_dir_fails_when_directory_is_missing() {
        let result = sync_parent_dir(Path::new("/nonexistent/state/dir/scans.log"));
        assert!(result.is_err());
    }
}
