//! In-Memory File System
//!
//! The default sandbox backend: a flat map of normalized absolute paths to
//! entries, guarded by an RwLock. Symlinks are resolved lexically with a
//! loop cap.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;

use super::{dirname, normalize_path, resolve, DirEntry, FileStat, FileSystem, FsError};

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    File { content: Vec<u8>, mode: u32, mtime: SystemTime },
    Dir { mode: u32, mtime: SystemTime },
    Symlink { target: String, mode: u32, mtime: SystemTime },
}

impl Node {
    fn file(content: Vec<u8>) -> Self {
        Node::File { content, mode: 0o644, mtime: SystemTime::now() }
    }

    fn dir() -> Self {
        Node::Dir { mode: 0o755, mtime: SystemTime::now() }
    }

    fn stat(&self, is_symlink: bool) -> FileStat {
        match self {
            Node::File { content, mode, mtime } => FileStat {
                is_file: true,
                is_directory: false,
                is_symlink,
                mode: *mode,
                size: content.len() as u64,
                mtime: *mtime,
            },
            Node::Dir { mode, mtime } => FileStat {
                is_file: false,
                is_directory: true,
                is_symlink,
                mode: *mode,
                size: 0,
                mtime: *mtime,
            },
            Node::Symlink { target, mode, mtime } => FileStat {
                is_file: false,
                is_directory: false,
                is_symlink: true,
                mode: *mode,
                size: target.len() as u64,
                mtime: *mtime,
            },
        }
    }
}

/// In-memory virtual filesystem.
pub struct MemFs {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemFs {
    /// Create an empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::dir());
        Self { nodes: RwLock::new(nodes) }
    }

    /// Create a filesystem pre-seeded with files (paths are normalized,
    /// parent directories created).
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Vec<u8>>,
    {
        let fs = Self::new();
        {
            let mut nodes = fs.nodes.write().unwrap_or_else(|e| e.into_inner());
            for (path, content) in files {
                let normalized = normalize_path(path.as_ref());
                ensure_parents(&mut nodes, &normalized);
                nodes.insert(normalized, Node::file(content.into()));
            }
        }
        fs
    }

    fn with_read<T>(&self, f: impl FnOnce(&HashMap<String, Node>) -> T) -> T {
        let guard = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn with_write<T>(&self, f: impl FnOnce(&mut HashMap<String, Node>) -> T) -> T {
        let mut guard = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_parents(nodes: &mut HashMap<String, Node>, path: &str) {
    let dir = dirname(path);
    if dir == "/" {
        return;
    }
    if !nodes.contains_key(&dir) {
        ensure_parents(nodes, &dir);
        nodes.insert(dir, Node::dir());
    }
}

fn link_target(link_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize_path(target)
    } else {
        resolve(&dirname(link_path), target)
    }
}

/// Follow symlinks in every component, including the final one.
fn follow(nodes: &HashMap<String, Node>, path: &str, op: &str) -> Result<String, FsError> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return Ok(normalized);
    }
    let mut resolved = String::new();
    let mut seen = HashSet::new();
    for part in normalized[1..].split('/') {
        resolved.push('/');
        resolved.push_str(part);
        let mut hops = 0;
        while let Some(Node::Symlink { target, .. }) = nodes.get(&resolved) {
            if hops >= MAX_SYMLINK_HOPS || !seen.insert(resolved.clone()) {
                return Err(FsError::SymlinkLoop { path: path.to_string(), operation: op.to_string() });
            }
            resolved = link_target(&resolved, target);
            hops += 1;
        }
    }
    Ok(resolved)
}

/// Follow symlinks in every component except the final one.
fn follow_parent(nodes: &HashMap<String, Node>, path: &str, op: &str) -> Result<String, FsError> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return Ok(normalized);
    }
    let dir = follow(nodes, &dirname(&normalized), op)?;
    let base = normalized.rsplit('/').next().unwrap_or("");
    if dir == "/" {
        Ok(format!("/{}", base))
    } else {
        Ok(format!("{}/{}", dir, base))
    }
}

fn read_node<'a>(
    nodes: &'a HashMap<String, Node>,
    path: &str,
    op: &str,
) -> Result<(&'a Node, String), FsError> {
    let resolved = follow(nodes, path, op)?;
    match nodes.get(&resolved) {
        Some(node) => Ok((node, resolved)),
        None => Err(FsError::NotFound { path: path.to_string(), operation: op.to_string() }),
    }
}

#[async_trait]
impl FileSystem for MemFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let bytes = self.read_file_buffer(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn read_file_buffer(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.with_read(|nodes| {
            let (node, resolved) = read_node(nodes, path, "open")?;
            match node {
                Node::File { content, .. } => Ok(content.clone()),
                Node::Dir { .. } => {
                    Err(FsError::IsDirectory { path: resolved, operation: "read".to_string() })
                }
                Node::Symlink { .. } => {
                    Err(FsError::NotFound { path: resolved, operation: "open".to_string() })
                }
            }
        })
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let resolved = follow_parent(nodes, path, "open")?;
            let target = match nodes.get(&resolved) {
                Some(Node::Symlink { .. }) => follow(nodes, &resolved, "open")?,
                Some(Node::Dir { .. }) => {
                    return Err(FsError::IsDirectory { path: resolved, operation: "open".to_string() });
                }
                _ => resolved,
            };
            ensure_parents(nodes, &target);
            nodes.insert(target, Node::file(content.to_vec()));
            Ok(())
        })
    }

    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let resolved = follow(nodes, path, "open")?;
            match nodes.get_mut(&resolved) {
                Some(Node::File { content: existing, mtime, .. }) => {
                    existing.extend_from_slice(content);
                    *mtime = SystemTime::now();
                    Ok(())
                }
                Some(Node::Dir { .. }) => {
                    Err(FsError::IsDirectory { path: resolved, operation: "open".to_string() })
                }
                _ => {
                    ensure_parents(nodes, &resolved);
                    nodes.insert(resolved, Node::file(content.to_vec()));
                    Ok(())
                }
            }
        })
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let normalized = normalize_path(path);
            if nodes.contains_key(&normalized) {
                if recursive {
                    return Ok(());
                }
                return Err(FsError::AlreadyExists { path: normalized, operation: "mkdir".to_string() });
            }
            let parent = dirname(&normalized);
            if !nodes.contains_key(&parent) {
                if !recursive {
                    return Err(FsError::NotFound { path: parent, operation: "mkdir".to_string() });
                }
                ensure_parents(nodes, &normalized);
            }
            if let Some(Node::File { .. }) = nodes.get(&parent) {
                return Err(FsError::NotDirectory { path: parent, operation: "mkdir".to_string() });
            }
            nodes.insert(normalized, Node::dir());
            Ok(())
        })
    }

    async fn rmdir(&self, path: &str) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let normalized = normalize_path(path);
            match nodes.get(&normalized) {
                Some(Node::Dir { .. }) => {}
                Some(_) => {
                    return Err(FsError::NotDirectory { path: normalized, operation: "rmdir".to_string() });
                }
                None => {
                    return Err(FsError::NotFound { path: normalized, operation: "rmdir".to_string() });
                }
            }
            let prefix = if normalized == "/" { "/".to_string() } else { format!("{}/", normalized) };
            if nodes.keys().any(|k| k != &normalized && k.starts_with(&prefix)) {
                return Err(FsError::NotEmpty { path: normalized, operation: "rmdir".to_string() });
            }
            nodes.remove(&normalized);
            Ok(())
        })
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let resolved = follow_parent(nodes, path, "unlink")?;
            match nodes.get(&resolved) {
                Some(Node::Dir { .. }) => {
                    Err(FsError::IsDirectory { path: resolved, operation: "unlink".to_string() })
                }
                Some(_) => {
                    nodes.remove(&resolved);
                    Ok(())
                }
                None => Err(FsError::NotFound { path: resolved, operation: "unlink".to_string() }),
            }
        })
    }

    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        self.with_read(|nodes| {
            let (node, _) = read_node(nodes, path, "stat")?;
            Ok(node.stat(false))
        })
    }

    async fn lstat(&self, path: &str) -> Result<FileStat, FsError> {
        self.with_read(|nodes| {
            let resolved = follow_parent(nodes, path, "lstat")?;
            match nodes.get(&resolved) {
                Some(node @ Node::Symlink { .. }) => Ok(node.stat(true)),
                Some(node) => Ok(node.stat(false)),
                None => Err(FsError::NotFound { path: resolved, operation: "lstat".to_string() }),
            }
        })
    }

    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.with_read(|nodes| {
            let (node, resolved) = read_node(nodes, path, "scandir")?;
            if !matches!(node, Node::Dir { .. }) {
                return Err(FsError::NotDirectory { path: resolved, operation: "scandir".to_string() });
            }
            let prefix = if resolved == "/" { "/".to_string() } else { format!("{}/", resolved) };
            let mut entries: Vec<DirEntry> = Vec::new();
            for (key, child) in nodes.iter() {
                if let Some(rest) = key.strip_prefix(&prefix) {
                    if rest.is_empty() || rest.contains('/') {
                        continue;
                    }
                    entries.push(DirEntry {
                        name: rest.to_string(),
                        is_file: matches!(child, Node::File { .. }),
                        is_directory: matches!(child, Node::Dir { .. }),
                        is_symlink: matches!(child, Node::Symlink { .. }),
                    });
                }
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let src = normalize_path(from);
            let dst = normalize_path(to);
            if !nodes.contains_key(&src) {
                return Err(FsError::NotFound { path: src, operation: "rename".to_string() });
            }
            ensure_parents(nodes, &dst);
            let src_prefix = format!("{}/", src);
            let moved: Vec<(String, Node)> = nodes
                .iter()
                .filter(|(k, _)| **k == src || k.starts_with(&src_prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, node) in moved {
                nodes.remove(&key);
                let new_key = if key == src {
                    dst.clone()
                } else {
                    format!("{}{}", dst, &key[src.len()..])
                };
                nodes.insert(new_key, node);
            }
            Ok(())
        })
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let src = follow(nodes, from, "copy")?;
            let dst = normalize_path(to);
            match nodes.get(&src) {
                Some(Node::File { .. }) => {
                    let node = nodes.get(&src).cloned();
                    if let Some(node) = node {
                        ensure_parents(nodes, &dst);
                        nodes.insert(dst, node);
                    }
                    Ok(())
                }
                Some(Node::Dir { .. }) if recursive => {
                    let src_prefix = format!("{}/", src);
                    let copied: Vec<(String, Node)> = nodes
                        .iter()
                        .filter(|(k, _)| **k == src || k.starts_with(&src_prefix))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    ensure_parents(nodes, &dst);
                    for (key, node) in copied {
                        let new_key = if key == src {
                            dst.clone()
                        } else {
                            format!("{}{}", dst, &key[src.len()..])
                        };
                        nodes.insert(new_key, node);
                    }
                    Ok(())
                }
                Some(Node::Dir { .. }) => {
                    Err(FsError::IsDirectory { path: src, operation: "copy".to_string() })
                }
                _ => Err(FsError::NotFound { path: src, operation: "copy".to_string() }),
            }
        })
    }

    async fn exists(&self, path: &str) -> bool {
        self.with_read(|nodes| match follow(nodes, path, "stat") {
            Ok(resolved) => nodes.contains_key(&resolved),
            Err(_) => false,
        })
    }

    async fn chmod(&self, path: &str, new_mode: u32) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let resolved = follow(nodes, path, "chmod")?;
            match nodes.get_mut(&resolved) {
                Some(Node::File { mode, .. })
                | Some(Node::Dir { mode, .. })
                | Some(Node::Symlink { mode, .. }) => {
                    *mode = new_mode & 0o7777;
                    Ok(())
                }
                None => Err(FsError::NotFound { path: resolved, operation: "chmod".to_string() }),
            }
        })
    }

    async fn symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        self.with_write(|nodes| {
            let normalized = normalize_path(link);
            if nodes.contains_key(&normalized) {
                return Err(FsError::AlreadyExists { path: normalized, operation: "symlink".to_string() });
            }
            ensure_parents(nodes, &normalized);
            nodes.insert(
                normalized,
                Node::Symlink { target: target.to_string(), mode: 0o777, mtime: SystemTime::now() },
            );
            Ok(())
        })
    }

    async fn readlink(&self, path: &str) -> Result<String, FsError> {
        self.with_read(|nodes| {
            let resolved = follow_parent(nodes, path, "readlink")?;
            match nodes.get(&resolved) {
                Some(Node::Symlink { target, .. }) => Ok(target.clone()),
                Some(_) => {
                    Err(FsError::InvalidArgument { path: resolved, operation: "readlink".to_string() })
                }
                None => Err(FsError::NotFound { path: resolved, operation: "readlink".to_string() }),
            }
        })
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        resolve(base, path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemFs::new();
        fs.write_file("/a/b/c.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file_buffer("/a/b/c.txt").await.unwrap(), b"hello");
        assert!(fs.exists("/a/b").await);
        assert!(fs.stat("/a").await.unwrap().is_directory);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let fs = MemFs::new();
        assert!(matches!(
            fs.read_file_buffer("/nope").await,
            Err(FsError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_append() {
        let fs = MemFs::new();
        fs.append_file("/log", b"a").await.unwrap();
        fs.append_file("/log", b"b").await.unwrap();
        assert_eq!(fs.read_file_buffer("/log").await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_readdir_sorted() {
        let fs = MemFs::new();
        fs.write_file("/d/b", b"").await.unwrap();
        fs.write_file("/d/a", b"").await.unwrap();
        fs.mkdir("/d/sub", false).await.unwrap();
        let entries = fs.readdir("/d").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "sub"]);
        assert!(entries[2].is_directory);
    }

    #[tokio::test]
    async fn test_rmdir_nonempty() {
        let fs = MemFs::new();
        fs.write_file("/d/f", b"x").await.unwrap();
        assert!(matches!(fs.rmdir("/d").await, Err(FsError::NotEmpty { .. })));
        fs.unlink("/d/f").await.unwrap();
        fs.rmdir("/d").await.unwrap();
        assert!(!fs.exists("/d").await);
    }

    #[tokio::test]
    async fn test_rename_tree() {
        let fs = MemFs::new();
        fs.write_file("/src/x", b"1").await.unwrap();
        fs.write_file("/src/sub/y", b"2").await.unwrap();
        fs.rename("/src", "/dst").await.unwrap();
        assert!(!fs.exists("/src").await);
        assert_eq!(fs.read_file_buffer("/dst/x").await.unwrap(), b"1");
        assert_eq!(fs.read_file_buffer("/dst/sub/y").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_symlink_follow() {
        let fs = MemFs::new();
        fs.write_file("/real", b"data").await.unwrap();
        fs.symlink("/real", "/link").await.unwrap();
        assert_eq!(fs.read_file_buffer("/link").await.unwrap(), b"data");
        assert!(fs.stat("/link").await.unwrap().is_file);
        assert!(fs.lstat("/link").await.unwrap().is_symlink);
        assert_eq!(fs.readlink("/link").await.unwrap(), "/real");
    }

    #[tokio::test]
    async fn test_symlink_loop() {
        let fs = MemFs::new();
        fs.symlink("/b", "/a").await.unwrap();
        fs.symlink("/a", "/b").await.unwrap();
        assert!(matches!(
            fs.read_file_buffer("/a").await,
            Err(FsError::SymlinkLoop { .. })
        ));
    }

    #[tokio::test]
    async fn test_with_files() {
        let fs = MemFs::with_files(vec![("/etc/motd", "hi"), ("/data/raw", "x")]);
        assert_eq!(fs.read_file("/etc/motd").await.unwrap(), "hi");
        assert!(fs.stat("/data").await.unwrap().is_directory);
    }

    #[tokio::test]
    async fn test_binary_content_preserved() {
        let fs = MemFs::new();
        fs.write_file("/bin.dat", &[0xff, 0x00, 0xfe]).await.unwrap();
        assert_eq!(fs.read_file_buffer("/bin.dat").await.unwrap(), vec![0xff, 0x00, 0xfe]);
    }
}
