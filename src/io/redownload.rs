use crate::types::GridResult;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Why a file was flagged for another download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedownloadEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Files that failed to open or download and must be fetched again.
///
/// The queue is only a record; nothing is retried automatically.
#[derive(Debug, Default, Clone)]
pub struct RedownloadQueue {
    entries: Vec<RedownloadEntry>,
}

impl RedownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a file. A path already queued keeps its first reason.
    pub fn push(&mut self, path: &Path, reason: impl Into<String>) {
        if self.contains(path) {
            return;
        }
        let reason = reason.into();
        log::warn!("Flagged for redownload: {} ({})", path.display(), reason);
        self.entries.push(RedownloadEntry { path: path.to_path_buf(), reason });
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[RedownloadEntry] {
        &self.entries
    }

    /// Queued paths in sorted order
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.iter().map(|e| e.path.clone()).collect();
        paths.sort();
        paths
    }

    pub fn extend(&mut self, other: RedownloadQueue) {
        for entry in other.entries {
            self.push(&entry.path, entry.reason);
        }
    }

    /// Write one path per line
    pub fn persist(&self, list_path: &Path) -> GridResult<()> {
        let mut file = std::fs::File::create(list_path)?;
        for path in self.paths() {
            writeln!(file, "{}", path.display())?;
        }
        log::info!("Redownload list ({} files) saved to: {}", self.len(), list_path.display());
        Ok(())
    }

    /// Read a list written by [`persist`](Self::persist)
    pub fn load(list_path: &Path) -> GridResult<Self> {
        let content = std::fs::read_to_string(list_path)?;
        let mut queue = Self::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            queue.push(Path::new(line), "listed for redownload");
        }
        Ok(queue)
    }

    /// Delete the corrupt local copies so the next download starts clean.
    /// Files that are already gone are ignored.
    pub fn purge(&self) -> usize {
        let mut removed = 0;
        for entry in &self.entries {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) => log::debug!("Could not remove {}: {}", entry.path.display(), e),
            }
        }
        if removed > 0 {
            log::info!("Removed {} corrupt files", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_deduplicates() {
        let mut queue = RedownloadQueue::new();
        queue.push(Path::new("/data/b.nc"), "open failed");
        queue.push(Path::new("/data/a.nc"), "HTTP 500");
        queue.push(Path::new("/data/b.nc"), "again");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.entries()[0].reason, "open failed");
        assert_eq!(queue.paths(), vec![PathBuf::from("/data/a.nc"), PathBuf::from("/data/b.nc")]);
    }

    #[test]
    fn test_persist_load_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.nc");
        std::fs::write(&corrupt, b"not netcdf").unwrap();

        let mut queue = RedownloadQueue::new();
        queue.push(&corrupt, "open failed");
        queue.push(&dir.path().join("never_downloaded.nc"), "missing");

        let list = dir.path().join("redownload.txt");
        queue.persist(&list).unwrap();
        let loaded = RedownloadQueue::load(&list).unwrap();
        assert_eq!(loaded.paths(), queue.paths());

        assert_eq!(queue.purge(), 1);
        assert!(!corrupt.exists());
    }
}
