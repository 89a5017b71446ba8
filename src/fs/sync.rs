//! Sync Filesystem Bridge
//!
//! The execution engine is serial; the [`FileSystem`] trait is async so
//! hosts can back it with real I/O. `SyncFs` bridges the two with
//! `tokio::task::block_in_place`, which requires a multi-thread runtime.

use std::future::Future;
use std::sync::Arc;

use super::{DirEntry, FileStat, FileSystem, FsError};

/// Cheaply cloneable sync view over an async filesystem.
#[derive(Clone)]
pub struct SyncFs {
    inner: Arc<dyn FileSystem>,
    handle: tokio::runtime::Handle,
}

impl SyncFs {
    pub fn new(inner: Arc<dyn FileSystem>, handle: tokio::runtime::Handle) -> Self {
        Self { inner, handle }
    }

    /// The wrapped async filesystem.
    pub fn inner(&self) -> &Arc<dyn FileSystem> {
        &self.inner
    }

    fn block<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        tokio::task::block_in_place(|| self.handle.block_on(fut))
    }

    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.block(self.inner.read_file(path))
    }

    pub fn read_file_buffer(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.block(self.inner.read_file_buffer(path))
    }

    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.block(self.inner.write_file(path, content))
    }

    pub fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.block(self.inner.append_file(path, content))
    }

    pub fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        self.block(self.inner.mkdir(path, recursive))
    }

    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        self.block(self.inner.rmdir(path))
    }

    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        self.block(self.inner.unlink(path))
    }

    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        self.block(self.inner.stat(path))
    }

    pub fn lstat(&self, path: &str) -> Result<FileStat, FsError> {
        self.block(self.inner.lstat(path))
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.block(self.inner.readdir(path))
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.block(self.inner.rename(from, to))
    }

    pub fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<(), FsError> {
        self.block(self.inner.copy(from, to, recursive))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.block(self.inner.exists(path))
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.block(self.inner.chmod(path, mode))
    }

    pub fn symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        self.block(self.inner.symlink(target, link))
    }

    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        self.block(self.inner.readlink(path))
    }

    pub fn resolve_path(&self, base: &str, path: &str) -> String {
        self.inner.resolve_path(base, path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_directory).unwrap_or(false)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_file).unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    fn sync_fs() -> SyncFs {
        SyncFs::new(Arc::new(MemFs::new()), tokio::runtime::Handle::current())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_round_trip() {
        let fs = sync_fs();
        fs.write_file("/t.txt", b"hello").unwrap();
        assert_eq!(fs.read_file_buffer("/t.txt").unwrap(), b"hello");
        assert!(fs.is_file("/t.txt"));
        assert!(!fs.is_dir("/t.txt"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dirs() {
        let fs = sync_fs();
        fs.mkdir("/a/b", true).unwrap();
        assert!(fs.is_dir("/a/b"));
        let entries = fs.readdir("/a").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_path() {
        let fs = sync_fs();
        assert_eq!(fs.resolve_path("/home/user", "f"), "/home/user/f");
        assert_eq!(fs.resolve_path("/home/user", "/abs"), "/abs");
    }
}
