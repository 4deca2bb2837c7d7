//! File storage service
//!
//! Owns the storage root and provides the filesystem operations behind the
//! HTTP handlers: creating upload targets, listing stored files, and
//! resolving download requests without leaving the root.

use crate::config::StorageConfig;
use crate::error::AppError;
use crate::services::naming::generate_filename;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Attempts at finding a free generated name before giving up
const MAX_NAME_ATTEMPTS: usize = 4;

/// Metadata returned for each file accepted by an upload
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
    pub path: String,
}

/// Stored file as reported by `GET /files`
#[derive(Debug, Serialize, Clone)]
pub struct StoredFileInfo {
    pub filename: String,
    pub size: u64,
    /// `None` on platforms without birth time support
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// An opened, not yet completed upload target
///
/// Dropping it before [`PendingUpload::finish`] succeeds removes the file, so
/// an aborted request never leaves a truncated upload behind.
pub struct PendingUpload {
    file: fs::File,
    filename: String,
    path: PathBuf,
    written: u64,
    completed: bool,
}

impl PendingUpload {
    /// Generated name of the file being written
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append a chunk to the file
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| AppError::io("Error uploading file", e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and sync the file, returning the stored name and byte count
    pub async fn finish(mut self) -> Result<(String, u64), AppError> {
        self.file
            .flush()
            .await
            .map_err(|e| AppError::io("Error uploading file", e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| AppError::io("Error uploading file", e))?;
        self.completed = true;
        Ok((std::mem::take(&mut self.filename), self.written))
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial upload {}", self.path.display()),
            Err(e) => warn!("Failed to remove partial upload {}: {}", self.path.display(), e),
        }
    }
}

/// Stored files of one request, removed again unless the request succeeds
pub struct UploadBatch<'a> {
    service: &'a FileService,
    filenames: Vec<String>,
    committed: bool,
}

impl<'a> UploadBatch<'a> {
    /// Start an empty batch
    pub fn new(service: &'a FileService) -> Self {
        Self {
            service,
            filenames: Vec::new(),
            committed: false,
        }
    }

    /// Record a completed file as part of the batch
    pub fn track(&mut self, filename: &str) {
        self.filenames.push(filename.to_string());
    }

    /// Number of files in the batch
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    /// Whether the batch holds no files
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    /// Keep every tracked file
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for UploadBatch<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for filename in &self.filenames {
            self.service.remove(filename);
        }
    }
}

/// An opened stored file ready to be streamed to a client
pub struct Download {
    pub file: fs::File,
    pub filename: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// File storage service rooted at a single directory
#[derive(Debug, Clone)]
pub struct FileService {
    /// Canonical absolute storage root
    root: PathBuf,
    /// Storage directory as configured, used in responses
    display_dir: String,
}

impl FileService {
    /// Ensure the storage directory exists and open the service on it
    ///
    /// The directory (and any missing parents) is created if absent. Existing
    /// contents are left untouched.
    pub async fn new(config: &StorageConfig) -> Result<Self, AppError> {
        let dir = Path::new(&config.upload_dir);

        if !fs::try_exists(dir).await.unwrap_or(false) {
            fs::create_dir_all(dir).await.map_err(|e| {
                AppError::io(
                    format!("Error creating upload directory {}", config.upload_dir),
                    e,
                )
            })?;
            info!("Created upload directory: {}", config.upload_dir);
        }

        let root = fs::canonicalize(dir).await.map_err(|e| {
            AppError::io(
                format!("Error resolving upload directory {}", config.upload_dir),
                e,
            )
        })?;

        if !fs::metadata(&root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(AppError::io(
                format!("Upload directory is not a directory: {}", config.upload_dir),
                std::io::Error::other("not a directory"),
            ));
        }

        Ok(Self {
            root,
            display_dir: config.upload_dir.clone(),
        })
    }

    /// Canonical storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage directory as configured
    pub fn upload_dir(&self) -> &str {
        &self.display_dir
    }

    /// Path reported to clients for a stored file
    pub fn display_path(&self, filename: &str) -> String {
        Path::new(&self.display_dir)
            .join(filename)
            .to_string_lossy()
            .into_owned()
    }

    /// Create a new, empty file for an upload received in `field`
    ///
    /// The file is opened with create-new semantics so an existing file is
    /// never overwritten; a fresh name is generated on collision.
    pub async fn create_upload(
        &self,
        field: &str,
        original_name: &str,
    ) -> Result<PendingUpload, AppError> {
        let names = (0..MAX_NAME_ATTEMPTS).map(|_| generate_filename(field, original_name));
        self.create_with_names(names).await
    }

    /// Open the first candidate name that does not exist yet
    async fn create_with_names(
        &self,
        names: impl Iterator<Item = String>,
    ) -> Result<PendingUpload, AppError> {
        let mut last_err = None;

        for filename in names {
            let path = self.root.join(&filename);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(PendingUpload {
                        file,
                        filename,
                        path,
                        written: 0,
                        completed: false,
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(filename = %filename, "Generated filename already exists, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(AppError::io("Error uploading file", e)),
            }
        }

        Err(AppError::io(
            "Error uploading file",
            last_err.unwrap_or_else(|| ErrorKind::AlreadyExists.into()),
        ))
    }

    /// Remove a stored file by generated name
    ///
    /// Used to roll back files of a request that failed part way through.
    /// Synchronous so it can run while a cancelled request is being dropped.
    pub fn remove(&self, filename: &str) {
        let path = self.root.join(filename);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }

    /// List regular files in the storage root, sorted by name
    pub async fn list(&self) -> Result<Vec<StoredFileInfo>, AppError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::io("Error reading upload directory", e))?;

        let mut files = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::io("Error reading upload directory", e))?
        {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(AppError::io(
                        format!("Error reading metadata for {}", entry.path().display()),
                        e,
                    ))
                }
            };

            if !metadata.is_file() {
                debug!("Skipping non-file entry {}", entry.path().display());
                continue;
            }

            files.push(StoredFileInfo {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                created: metadata.created().ok().map(DateTime::<Utc>::from),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Resolve a client-supplied name to a path strictly inside the root
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Canonical path of an existing regular file
    /// * `Err(AppError::InvalidFilename)` - Name is not a single path component
    /// * `Err(AppError::FileNotFound)` - Missing, not a file, or outside the root
    pub async fn resolve(&self, name: &str) -> Result<PathBuf, AppError> {
        if !is_plain_name(name) {
            return Err(AppError::InvalidFilename(name.to_string()));
        }

        let canonical = match fs::canonicalize(self.root.join(name)).await {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::FileNotFound(name.to_string()))
            }
            Err(e) => return Err(AppError::io("Error downloading file", e)),
        };

        // Symlinks may still point elsewhere.
        if !canonical.starts_with(&self.root) {
            warn!(requested = %name, "Rejected download resolving outside upload directory");
            return Err(AppError::FileNotFound(name.to_string()));
        }

        let metadata = fs::metadata(&canonical)
            .await
            .map_err(|e| AppError::io("Error downloading file", e))?;
        if !metadata.is_file() {
            return Err(AppError::FileNotFound(name.to_string()));
        }

        Ok(canonical)
    }

    /// Open a stored file for download
    pub async fn open(&self, name: &str) -> Result<Download, AppError> {
        let path = self.resolve(name).await?;

        let file = fs::File::open(&path)
            .await
            .map_err(|e| AppError::io("Error downloading file", e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| AppError::io("Error downloading file", e))?;

        Ok(Download {
            file,
            filename: name.to_string(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

/// A name is plain when it is a single, normal path component
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn service_in(dir: &Path) -> FileService {
        let config = StorageConfig::with_dir(dir.to_string_lossy());
        FileService::new(&config)
            .await
            .expect("Failed to create file service")
    }

    async fn store(service: &FileService, field: &str, name: &str, data: &[u8]) -> String {
        let mut upload = service
            .create_upload(field, name)
            .await
            .expect("Failed to create upload");
        upload.write_chunk(data).await.expect("Failed to write");
        let (filename, size) = upload.finish().await.expect("Failed to finish");
        assert_eq!(size, data.len() as u64);
        filename
    }

    #[tokio::test]
    async fn test_new_creates_nested_directory() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("a").join("b").join("uploads");

        let service = service_in(&nested).await;
        assert!(nested.is_dir());
        assert!(service.root().is_absolute());
    }

    #[tokio::test]
    async fn test_new_preserves_existing_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("keep.txt"), "kept").expect("Failed to write");

        let service = service_in(temp_dir.path()).await;
        let files = service.list().await.expect("Failed to list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "keep.txt");
    }

    #[tokio::test]
    async fn test_new_rejects_file_as_root() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join("not-a-dir");
        std::fs::write(&file_path, "x").expect("Failed to write");

        let config = StorageConfig::with_dir(file_path.to_string_lossy());
        let result = FileService::new(&config).await;
        assert!(matches!(result, Err(AppError::Io { .. })));
    }

    #[tokio::test]
    async fn test_store_and_list() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;

        let filename = store(&service, "file", "hello.txt", b"hello").await;
        assert!(filename.starts_with("file-"));
        assert!(filename.ends_with(".txt"));

        let files = service.list().await.expect("Failed to list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, filename);
        assert_eq!(files[0].size, 5);
        assert!(files[0].modified.is_some());
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_sorts() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("b.txt"), "bb").expect("Failed to write");
        std::fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write");
        std::fs::create_dir(temp_dir.path().join("subdir")).expect("Failed to create dir");

        let service = service_in(temp_dir.path()).await;
        let files = service.list().await.expect("Failed to list");
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_list_fails_when_directory_removed() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("gone");
        let service = service_in(&root).await;
        std::fs::remove_dir(&root).expect("Failed to remove dir");

        let result = service.list().await;
        match result {
            Err(AppError::Io { context, .. }) => {
                assert_eq!(context, "Error reading upload directory");
            }
            other => panic!("Expected Io error, got: {:?}", other.map(|f| f.len())),
        }
    }

    #[tokio::test]
    async fn test_dropping_unfinished_upload_removes_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;

        let mut upload = service
            .create_upload("files", "big.bin")
            .await
            .expect("Failed to create upload");
        upload.write_chunk(b"partial").await.expect("Failed to write");
        assert_eq!(upload.written(), 7);
        drop(upload);

        assert!(service.list().await.expect("Failed to list").is_empty());
    }

    #[tokio::test]
    async fn test_finished_upload_survives_drop() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;

        let filename = store(&service, "file", "kept.txt", b"kept").await;
        let files = service.list().await.expect("Failed to list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, filename);
    }

    #[tokio::test]
    async fn test_create_skips_existing_name() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;
        std::fs::write(temp_dir.path().join("taken.txt"), "original").expect("Failed to write");

        let names = ["taken.txt", "fresh.txt"].into_iter().map(String::from);
        let mut upload = service
            .create_with_names(names)
            .await
            .expect("Failed to create upload");
        assert_eq!(upload.filename(), "fresh.txt");
        upload.write_chunk(b"replacement").await.expect("Failed to write");
        upload.finish().await.expect("Failed to finish");

        let existing = std::fs::read_to_string(temp_dir.path().join("taken.txt")).unwrap();
        assert_eq!(existing, "original");
        let fresh = std::fs::read_to_string(temp_dir.path().join("fresh.txt")).unwrap();
        assert_eq!(fresh, "replacement");
    }

    #[tokio::test]
    async fn test_create_fails_when_every_name_taken() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;
        std::fs::write(temp_dir.path().join("taken.txt"), "original").expect("Failed to write");

        let names = std::iter::repeat("taken.txt".to_string()).take(3);
        let result = service.create_with_names(names).await;
        match result {
            Err(AppError::Io { source, .. }) => {
                assert_eq!(source.kind(), ErrorKind::AlreadyExists);
            }
            Err(other) => panic!("Expected Io error, got: {:?}", other),
            Ok(_) => panic!("Expected Io error, got an upload"),
        }

        let existing = std::fs::read_to_string(temp_dir.path().join("taken.txt")).unwrap();
        assert_eq!(existing, "original");
    }

    #[tokio::test]
    async fn test_batch_rolls_back_unless_committed() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;

        let first = store(&service, "files", "a.txt", b"a").await;
        let mut batch = UploadBatch::new(&service);
        batch.track(&first);
        assert_eq!(batch.len(), 1);
        drop(batch);
        assert!(service.list().await.expect("Failed to list").is_empty());

        let second = store(&service, "files", "b.txt", b"b").await;
        let mut batch = UploadBatch::new(&service);
        batch.track(&second);
        batch.commit();
        let files = service.list().await.expect("Failed to list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, second);
    }

    #[tokio::test]
    async fn test_open_roundtrip() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;
        let filename = store(&service, "file", "data.bin", &[0, 1, 2, 255]).await;

        let download = service.open(&filename).await.expect("Failed to open");
        assert_eq!(download.size, 4);
        assert_eq!(download.filename, filename);
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;

        let result = service.resolve("nope.txt").await;
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("uploads");
        std::fs::write(temp_dir.path().join("secret.txt"), "secret").expect("Failed to write");
        let service = service_in(&root).await;

        for name in ["../secret.txt", "..", ".", "", "a\\..\\b", "sub/x"] {
            let result = service.resolve(name).await;
            assert!(
                matches!(result, Err(AppError::InvalidFilename(_))),
                "name {:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_directory() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        std::fs::create_dir(temp_dir.path().join("subdir")).expect("Failed to create dir");
        let service = service_in(temp_dir.path()).await;

        let result = service.resolve("subdir").await;
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("uploads");
        let outside = temp_dir.path().join("outside.txt");
        std::fs::write(&outside, "outside").expect("Failed to write");
        let service = service_in(&root).await;
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).expect("Failed to link");

        let result = service.resolve("link.txt").await;
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_display_path_uses_configured_dir() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let service = service_in(temp_dir.path()).await;
        let path = service.display_path("file-1-abc.txt");
        assert!(path.ends_with("file-1-abc.txt"));
        assert!(path.starts_with(temp_dir.path().to_string_lossy().as_ref()));
        assert_eq!(service.upload_dir(), temp_dir.path().to_string_lossy());
    }
}
