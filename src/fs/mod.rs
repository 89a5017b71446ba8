//! Virtual File System
//!
//! The interpreter touches storage only through the async [`FileSystem`]
//! trait. The bundled [`MemFs`] keeps everything in memory; hosts may
//! supply their own backend. All file content is bytes.

pub mod memfs;
pub mod sync;

pub use memfs::MemFs;
pub use sync::SyncFs;

use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

/// File system errors, displayed errno-style to match shell diagnostics.
#[derive(Error, Debug, Clone)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("EEXIST: file already exists, {operation} '{path}'")]
    AlreadyExists { path: String, operation: String },

    #[error("EISDIR: illegal operation on a directory, {operation} '{path}'")]
    IsDirectory { path: String, operation: String },

    #[error("ENOTDIR: not a directory, {operation} '{path}'")]
    NotDirectory { path: String, operation: String },

    #[error("ENOTEMPTY: directory not empty, {operation} '{path}'")]
    NotEmpty { path: String, operation: String },

    #[error("EINVAL: invalid argument, {operation} '{path}'")]
    InvalidArgument { path: String, operation: String },

    #[error("ELOOP: too many levels of symbolic links, {operation} '{path}'")]
    SymlinkLoop { path: String, operation: String },

    #[error("{message}")]
    Other { message: String },
}

impl FsError {
    /// Short message suitable for `bash: path: message` diagnostics.
    pub fn shell_message(&self) -> &'static str {
        match self {
            FsError::NotFound { .. } => "No such file or directory",
            FsError::AlreadyExists { .. } => "File exists",
            FsError::IsDirectory { .. } => "Is a directory",
            FsError::NotDirectory { .. } => "Not a directory",
            FsError::NotEmpty { .. } => "Directory not empty",
            FsError::InvalidArgument { .. } => "Invalid argument",
            FsError::SymlinkLoop { .. } => "Too many levels of symbolic links",
            FsError::Other { .. } => "I/O error",
        }
    }
}

/// File status information.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Directory entry with type information.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
}

/// Abstract filesystem consumed by the interpreter and by commands.
///
/// Path resolution normalizes `.`/`..` and never escapes the root; all
/// content is bytes (the `read_file` convenience decodes lossily).
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file decoded as UTF-8 (invalid sequences replaced).
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Read a file as raw bytes.
    async fn read_file_buffer(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Write bytes to a file, creating it and parent dirs as needed.
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Append bytes to a file, creating it if missing.
    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Create a directory; `recursive` creates missing parents.
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &str) -> Result<(), FsError>;

    /// Remove a file or symlink.
    async fn unlink(&self, path: &str) -> Result<(), FsError>;

    /// Stat following symlinks.
    async fn stat(&self, path: &str) -> Result<FileStat, FsError>;

    /// Stat without following the final symlink.
    async fn lstat(&self, path: &str) -> Result<FileStat, FsError>;

    /// List directory entries with type information.
    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;

    /// Rename/move a file or directory.
    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Copy a file (or a tree when `recursive`).
    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<(), FsError>;

    /// Whether the path exists (following symlinks).
    async fn exists(&self, path: &str) -> bool;

    /// Change permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError>;

    /// Create a symbolic link at `link` pointing to `target`.
    async fn symlink(&self, target: &str, link: &str) -> Result<(), FsError>;

    /// Read a symlink target.
    async fn readlink(&self, path: &str) -> Result<String, FsError>;

    /// Resolve `path` against `base`, normalizing `.` and `..`.
    /// Purely lexical; never escapes the filesystem root.
    fn resolve_path(&self, base: &str, path: &str) -> String;
}

/// Lexically normalize an absolute path: collapse `//`, `.` and `..`,
/// clamping `..` at the root.
pub fn normalize_path(path: &str) -> String {
    let mut resolved: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    if resolved.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", resolved.join("/"))
    }
}

/// Resolve `path` against `base` (both `/`-separated), then normalize.
pub fn resolve(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else if base == "/" || base.is_empty() {
        normalize_path(&format!("/{}", path))
    } else {
        normalize_path(&format!("{}/{}", base, path))
    }
}

/// Parent directory of a normalized path.
pub fn dirname(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return "/".to_string();
    }
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => normalized[..pos].to_string(),
        None => "/".to_string(),
    }
}

/// Final component of a normalized path.
pub fn basename(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return "/".to_string();
    }
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("/a/./b"), "/a/b");
        assert_eq!(normalize_path("/a/../b"), "/b");
        assert_eq!(normalize_path("/../.."), "/");
        assert_eq!(normalize_path("//a///b"), "/a/b");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("/home/user", "file.txt"), "/home/user/file.txt");
        assert_eq!(resolve("/home/user", "/abs"), "/abs");
        assert_eq!(resolve("/home/user", ".."), "/home");
        assert_eq!(resolve("/", "x"), "/x");
        assert_eq!(resolve("/a", "../../.."), "/");
    }

    #[test]
    fn test_dirname_basename() {
        assert_eq!(dirname("/a/b/c"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(basename("/a/b/c"), "c");
        assert_eq!(basename("/"), "/");
    }

    #[test]
    fn test_fs_error_messages() {
        let err = FsError::NotFound { path: "/x".into(), operation: "open".into() };
        assert!(err.to_string().contains("ENOENT"));
        assert_eq!(err.shell_message(), "No such file or directory");
    }
}
