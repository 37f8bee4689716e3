//! Local file storage: the admin file browser and order attachments.
//!
//! Every path handed to [`LocalStorage`] is relative to its root. Paths that
//! are absolute, contain `..` or NUL, or resolve outside the root (for
//! example through a symlink) are rejected before touching the filesystem.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};

use merch_crm_core::UserId;

use crate::db::{RepositoryError, audit};

/// Entity type written to the audit log for storage mutations.
const AUDIT_ENTITY: &str = "local_storage";

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path escapes the storage root")]
    PathEscapesRoot,

    #[error("not found")]
    NotFound,

    #[error("destination already exists")]
    AlreadyExists,

    #[error("directory is not empty")]
    DirectoryNotEmpty,

    #[error("io error: {0}")]
    Io(std::io::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty,
            _ => Self::Io(e),
        }
    }
}

/// A file or folder in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct StorageEntry {
    pub name: String,
    /// Relative path; folders end with `/`.
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Recursive usage totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_size: u64,
    pub files: u64,
    pub folders: u64,
}

/// A per-path failure from a batch delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteFailure {
    pub path: String,
    pub error: String,
}

/// Filesystem access confined to one root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path under the root.
    ///
    /// An empty path is the root itself.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for absolute paths, `..` or NUL.
    /// Returns `StorageError::PathEscapesRoot` if the path, or the deepest
    /// part of it that already exists, resolves outside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        if relative.contains('\0') {
            return Err(StorageError::InvalidPath("contains NUL".to_owned()));
        }
        let relative = relative.trim_matches('/');
        let path = Path::new(relative);

        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StorageError::InvalidPath("contains ..".to_owned()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath("must be relative".to_owned()));
                }
            }
        }

        // Symlinks may point anywhere. New paths are created under their
        // deepest existing ancestor, so that is where the check applies.
        if let Ok(root) = self.root.canonicalize()
            && let Some(existing) = resolved
                .ancestors()
                .find(|p| p.symlink_metadata().is_ok())
        {
            match existing.canonicalize() {
                Ok(real) if real.starts_with(&root) => {}
                _ => return Err(StorageError::PathEscapesRoot),
            }
        }

        Ok(resolved)
    }

    /// Folders then files directly under `prefix`, each group sorted by name.
    ///
    /// A missing root lists as empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the path is invalid or can't be read.
    pub async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let dir = self.resolve(prefix)?;
        let base = prefix.trim_matches('/');

        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound && base.is_empty() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_folder = metadata.is_dir();
            let mut path = if base.is_empty() {
                name.clone()
            } else {
                format!("{base}/{name}")
            };
            if is_folder {
                path.push('/');
            }
            entries.push(StorageEntry {
                name,
                path,
                is_folder,
                size: if is_folder { 0 } else { metadata.len() },
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| b.is_folder.cmp(&a.is_folder).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Total size and file and folder counts under the root.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if a directory can't be read.
    pub async fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = reader.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    stats.folders += 1;
                    pending.push(entry.path());
                } else {
                    stats.files += 1;
                    stats.total_size += metadata.len();
                }
            }
        }

        Ok(stats)
    }

    /// Create a folder and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the path is invalid or the folder can't be created.
    pub async fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        let dir = self.resolve_child(path)?;
        fs::create_dir_all(dir).await?;
        Ok(())
    }

    /// Remove a file, or a directory when it is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is there.
    /// Returns `StorageError::DirectoryNotEmpty` for a non-empty directory.
    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve_child(path)?;
        let metadata = fs::symlink_metadata(&target).await?;
        if metadata.is_dir() {
            if fs::read_dir(&target).await?.next_entry().await?.is_some() {
                return Err(StorageError::DirectoryNotEmpty);
            }
            fs::remove_dir(&target).await?;
        } else {
            fs::remove_file(&target).await?;
        }
        Ok(())
    }

    /// Delete several paths, collecting failures instead of stopping.
    pub async fn delete_many(&self, paths: &[String]) -> Vec<DeleteFailure> {
        let mut failures = Vec::new();
        for path in paths {
            if let Err(e) = self.delete(path).await {
                failures.push(DeleteFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
        failures
    }

    /// Rename or move a file or folder.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the destination exists.
    /// Returns `StorageError::NotFound` if the source doesn't.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.resolve_child(from)?;
        let destination = self.resolve_child(to)?;

        if fs::try_exists(&destination).await? {
            return Err(StorageError::AlreadyExists);
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(source, destination).await?;
        Ok(())
    }

    /// Write a file, creating parent folders. Returns the byte count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the path is invalid or the write fails.
    pub async fn write(&self, path: &str, bytes: &[u8]) -> Result<u64, StorageError> {
        let target = self.resolve_child(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the file doesn't exist.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve_child(path)?;
        Ok(fs::read(target).await?)
    }

    /// Like [`Self::resolve`], but the root itself is not a valid target.
    fn resolve_child(&self, path: &str) -> Result<PathBuf, StorageError> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(StorageError::InvalidPath("path is empty".to_owned()));
        }
        Ok(resolved)
    }
}

/// Replace anything but ASCII letters, digits, `.`, `-` and `_` with `_`.
///
/// Leading dots are dropped so uploads can't become hidden files.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_owned()
    } else {
        cleaned.to_owned()
    }
}

/// The admin file browser: [`LocalStorage`] plus audit entries.
pub struct StorageService<'a> {
    pool: &'a PgPool,
    storage: &'a LocalStorage,
}

impl<'a> StorageService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, storage: &'a LocalStorage) -> Self {
        Self { pool, storage }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the folder can't be created or audited.
    #[instrument(skip(self))]
    pub async fn create_folder(&self, path: &str, actor: UserId) -> Result<(), StorageError> {
        self.storage.create_folder(path).await?;
        self.audit(actor, "Folder created", json!({ "path": path })).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the path can't be deleted or audited.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str, actor: UserId) -> Result<(), StorageError> {
        self.storage.delete(path).await?;
        self.audit(actor, "File deleted", json!({ "path": path })).await
    }

    /// Delete several paths; failures are returned, not raised.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Repository` if the audit entry can't be written.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    pub async fn delete_many(
        &self,
        paths: &[String],
        actor: UserId,
    ) -> Result<Vec<DeleteFailure>, StorageError> {
        let failures = self.storage.delete_many(paths).await;
        self.audit(
            actor,
            "Files deleted",
            json!({ "paths": paths, "failed": failures.len() }),
        )
        .await?;
        Ok(failures)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the rename fails or can't be audited.
    #[instrument(skip(self))]
    pub async fn rename(&self, from: &str, to: &str, actor: UserId) -> Result<(), StorageError> {
        self.storage.rename(from, to).await?;
        self.audit(actor, "File renamed", json!({ "from": from, "to": to }))
            .await
    }

    async fn audit(
        &self,
        actor: UserId,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        audit::record(&mut conn, Some(actor), action, AUDIT_ENTITY, None, details).await?;
        info!(action, "Storage changed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_storage(name: &str) -> LocalStorage {
        let root = std::env::temp_dir().join(format!("merch-crm-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        LocalStorage::new(root)
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let storage = temp_storage("resolve");

        assert!(matches!(
            storage.resolve("../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.resolve("a/../../b"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.resolve("bad\0name"),
            Err(StorageError::InvalidPath(_))
        ));
        assert_eq!(
            storage.resolve("orders/report.pdf").unwrap(),
            storage.root().join("orders").join("report.pdf")
        );
        // Leading slashes are treated as relative to the root.
        assert_eq!(storage.resolve("/logo.png").unwrap(), storage.root().join("logo.png"));
        assert_eq!(storage.resolve("").unwrap(), storage.root());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_out_of_root() {
        let storage = temp_storage("symlink");
        let outside = std::env::temp_dir();
        std::os::unix::fs::symlink(&outside, storage.root().join("escape")).unwrap();

        assert!(matches!(
            storage.resolve("escape"),
            Err(StorageError::PathEscapesRoot)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_new_paths_under_symlink_out_of_root_are_rejected() {
        let storage = temp_storage("symlink-new");
        let outside = std::env::temp_dir().join(format!("merch-crm-outside-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, storage.root().join("escape")).unwrap();
        std::os::unix::fs::symlink(outside.join("missing"), storage.root().join("dangling"))
            .unwrap();

        assert!(matches!(
            storage.write("escape/new.txt", b"x").await,
            Err(StorageError::PathEscapesRoot)
        ));
        assert!(matches!(
            storage.create_folder("escape/newdir/deeper").await,
            Err(StorageError::PathEscapesRoot)
        ));
        assert!(matches!(
            storage.write("dangling", b"x").await,
            Err(StorageError::PathEscapesRoot)
        ));
        assert!(!outside.join("new.txt").exists());
        assert!(!outside.join("newdir").exists());
        assert!(!outside.join("missing").exists());

        // Paths that don't exist yet inside the root are still fine.
        storage.write("fresh/inner/new.txt", b"ok").await.unwrap();
        assert_eq!(storage.read("fresh/inner/new.txt").await.unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_list_puts_folders_first() {
        let storage = temp_storage("list");
        storage.write("b.txt", b"hello").await.unwrap();
        storage.write("a.txt", b"hi").await.unwrap();
        storage.create_folder("zeta").await.unwrap();

        let entries = storage.list("").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["zeta/", "a.txt", "b.txt"]);
        assert_eq!(entries[2].size, 5);
    }

    #[tokio::test]
    async fn test_stats_are_recursive() {
        let storage = temp_storage("stats");
        storage.write("orders/1/a.bin", &[0; 10]).await.unwrap();
        storage.write("orders/2/b.bin", &[0; 5]).await.unwrap();
        storage.write("c.bin", &[0; 1]).await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(
            stats,
            StorageStats {
                total_size: 16,
                files: 3,
                folders: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_directory() {
        let storage = temp_storage("delete");
        storage.write("docs/readme.txt", b"x").await.unwrap();

        assert!(matches!(
            storage.delete("docs").await,
            Err(StorageError::DirectoryNotEmpty)
        ));
        storage.delete("docs/readme.txt").await.unwrap();
        storage.delete("docs").await.unwrap();
        assert!(matches!(storage.delete("docs").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_many_reports_failures() {
        let storage = temp_storage("delete-many");
        storage.write("one.txt", b"1").await.unwrap();

        let failures = storage
            .delete_many(&["one.txt".to_owned(), "missing.txt".to_owned()])
            .await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "missing.txt");
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_destination() {
        let storage = temp_storage("rename");
        storage.write("a.txt", b"a").await.unwrap();
        storage.write("b.txt", b"b").await.unwrap();

        assert!(matches!(
            storage.rename("a.txt", "b.txt").await,
            Err(StorageError::AlreadyExists)
        ));
        storage.rename("a.txt", "archive/a.txt").await.unwrap();
        assert_eq!(storage.read("archive/a.txt").await.unwrap(), b"a");
    }

    #[test]
    fn test_root_is_not_a_target() {
        let storage = temp_storage("root");
        assert!(matches!(
            storage.resolve_child("/"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("mock up (v2).png"), "mock_up__v2_.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(".env"), "env");
        assert_eq!(sanitize_file_name("макет.pdf"), "_____.pdf");
        assert_eq!(sanitize_file_name(""), "file");
    }
}
