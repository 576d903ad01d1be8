//! Reference filesystem backend (§4.1 "Filesystem backend specifics").
//!
//! Each upload is two files under a configured root directory:
//! `<root>/<id>` (payload) and `<root>/<id>.info` (JSON `FileInfo`). A
//! pre-create hook may override the payload path via
//! `info.storage["Path"]`; relative paths are joined to and confined within
//! `root`, absolute paths are rejected outright since this backend is
//! always constructed as a confined root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::error::StorageError;
use crate::http_types::BodyReader;
use crate::model::FileInfo;

use super::{Concater, ContentServer, DataStore, LengthDeclarer, Terminater};

const CHUNK_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Opens (creating on demand, directory mode `0754` on unix) a
    /// filesystem-backed store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::Io {
                source,
                path: root.clone(),
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o754);
            let _ = fs::set_permissions(&root, perms).await;
        }

        Ok(Self { root })
    }

    fn info_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.info"))
    }

    /// Resolves a *freshly-created* upload's payload path, confining any
    /// hook-supplied relative override to `root` and rejecting absolute
    /// overrides. Only called from `new_upload`, before `info.storage["Path"]`
    /// is populated with the confined, absolute path this returns.
    fn resolve_new_payload_path(&self, info: &FileInfo) -> Result<PathBuf, StorageError> {
        match info.storage.get("Path") {
            None => Ok(self.root.join(&info.id)),
            Some(custom) => {
                let custom = Path::new(custom);
                if custom.is_absolute() {
                    return Err(StorageError::PathConfinement(custom.to_path_buf()));
                }
                let joined = self.root.join(custom);
                let canonical_root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
                let confined = joined
                    .parent()
                    .map(|parent| {
                        parent
                            .canonicalize()
                            .map(|p| p.starts_with(&canonical_root))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
                    || joined.starts_with(&self.root);
                if !confined {
                    return Err(StorageError::PathConfinement(joined));
                }
                Ok(joined)
            }
        }
    }

    /// Returns the payload path for an *existing* upload. `info.storage["Path"]`
    /// was already resolved to an absolute, confined path by
    /// `resolve_new_payload_path` at creation time and never mutated since
    /// (§3 "Storage mapping is set at creation ... not mutate thereafter"),
    /// so this trusts it directly rather than re-running confinement checks
    /// that only make sense against a relative, hook-supplied override.
    fn stored_payload_path(&self, info: &FileInfo) -> PathBuf {
        match info.storage.get("Path") {
            Some(path) => PathBuf::from(path),
            None => self.root.join(&info.id),
        }
    }

    async fn read_info(&self, id: &str) -> Result<FileInfo, StorageError> {
        let path = self.info_path(id);
        let bytes = fs::read(&path).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StorageError::NotFound { id: id.to_string() }
            } else {
                StorageError::Io { source, path: path.clone() }
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_info(&self, info: &FileInfo) -> Result<(), StorageError> {
        let path = self.info_path(&info.id);
        let bytes = serde_json::to_vec(info)?;
        fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io { source, path })
    }
}

#[async_trait]
impl DataStore for FilesystemStore {
    #[instrument(skip(self, info), fields(upload_id = %info.id))]
    async fn new_upload(&self, mut info: FileInfo) -> Result<FileInfo, StorageError> {
        let payload_path = self.resolve_new_payload_path(&info)?;
        if let Some(parent) = payload_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io { source, path: parent.to_path_buf() })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&payload_path)
            .await
            .map_err(|source| StorageError::Io { source, path: payload_path.clone() })?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o664);
            let _ = fs::set_permissions(&payload_path, perms).await;
        }

        info.storage
            .insert("Path".to_string(), payload_path.to_string_lossy().into_owned());
        self.write_info(&info).await?;
        debug!("created upload");
        Ok(info)
    }

    async fn get_info(&self, id: &str) -> Result<FileInfo, StorageError> {
        self.read_info(id).await
    }

    #[instrument(skip(self, reader), fields(upload_id = %id, offset))]
    async fn write_chunk(
        &self,
        id: &str,
        offset: u64,
        mut reader: BodyReader,
    ) -> Result<u64, StorageError> {
        let info = self.read_info(id).await?;
        let payload_path = self.stored_payload_path(&info);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&payload_path)
            .await
            .map_err(|source| StorageError::Io { source, path: payload_path.clone() })?;

        let mut buf = vec![0u8; CHUNK_BUF_SIZE];
        let mut written: u64 = 0;
        let mut read_err: Option<std::io::Error> = None;

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(source) = file.write_all(&buf[..n]).await {
                        read_err = Some(source);
                        break;
                    }
                    written += n as u64;
                }
                Err(source) => {
                    read_err = Some(source);
                    break;
                }
            }
        }

        // Close errors are propagated, never masked (§4.1).
        let close_err = file.shutdown().await.err();

        let mut info = info;
        info.offset = offset + written;
        self.write_info(&info).await?;

        if let Some(source) = close_err {
            return Err(StorageError::Io { source, path: payload_path });
        }

        match read_err {
            None => Ok(written),
            Some(source) if source.kind() == ErrorKind::UnexpectedEof => {
                // Truncated network read: a non-fatal resume point (§4.1, §7).
                warn!(bytes = written, "chunk write truncated by unexpected EOF");
                Ok(written)
            }
            Some(source) => Err(StorageError::Io { source, path: payload_path }),
        }
    }

    async fn get_reader(&self, id: &str) -> Result<BodyReader, StorageError> {
        let info = self.read_info(id).await?;
        let payload_path = self.stored_payload_path(&info);
        let file = File::open(&payload_path)
            .await
            .map_err(|source| StorageError::Io { source, path: payload_path })?;
        Ok(Box::pin(file.take(info.offset)))
    }
}

#[async_trait]
impl Terminater for FilesystemStore {
    #[instrument(skip(self), fields(upload_id = %id))]
    async fn terminate(&self, id: &str) -> Result<(), StorageError> {
        let payload_path = match self.read_info(id).await {
            Ok(info) => Some(self.stored_payload_path(&info)),
            Err(StorageError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        if let Some(path) = payload_path {
            tolerate_missing(fs::remove_file(&path).await)?;
        }
        tolerate_missing(fs::remove_file(self.info_path(id)).await)?;
        Ok(())
    }
}

fn tolerate_missing(result: std::io::Result<()>) -> Result<(), StorageError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io { source: e, path: PathBuf::new() }),
    }
}

#[async_trait]
impl LengthDeclarer for FilesystemStore {
    async fn declare_length(&self, id: &str, size: u64) -> Result<(), StorageError> {
        let mut info = self.read_info(id).await?;
        if info.offset > size {
            return Err(StorageError::Io {
                source: std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("declared length {size} is below already-committed offset {}", info.offset),
                ),
                path: self.info_path(id),
            });
        }
        info.size = size;
        info.size_is_deferred = false;
        self.write_info(&info).await
    }
}

#[async_trait]
impl Concater for FilesystemStore {
    #[instrument(skip(self, parts), fields(upload_id = %id))]
    async fn concat_uploads(&self, id: &str, parts: &[FileInfo]) -> Result<(), StorageError> {
        let mut info = self.read_info(id).await?;
        let payload_path = self.stored_payload_path(&info);

        let mut out = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&payload_path)
            .await
            .map_err(|source| StorageError::Io { source, path: payload_path.clone() })?;

        let mut total: u64 = 0;
        for part in parts {
            let part_path = self.stored_payload_path(part);
            let mut part_file = File::open(&part_path)
                .await
                .map_err(|source| StorageError::Io { source, path: part_path.clone() })?;
            total += tokio::io::copy(&mut part_file, &mut out)
                .await
                .map_err(|source| StorageError::Io { source, path: payload_path.clone() })?;
        }
        out.shutdown()
            .await
            .map_err(|source| StorageError::Io { source, path: payload_path })?;

        info.offset = total;
        info.size = total;
        info.size_is_deferred = false;
        self.write_info(&info).await?;
        debug!(bytes = total, "assembled final upload from partials");
        Ok(())
    }
}

impl ContentServer for FilesystemStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn store() -> (FilesystemStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn write_chunk_advances_offset() {
        let (store, _dir) = store().await;
        let mut info = FileInfo::new("abc".to_string());
        info.size = 11;
        let info = store.new_upload(info).await.unwrap();
        assert_eq!(info.offset, 0);

        let written = store
            .write_chunk("abc", 0, Box::pin(Cursor::new(b"hello".to_vec())))
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(store.get_info("abc").await.unwrap().offset, 5);

        let written = store
            .write_chunk("abc", 5, Box::pin(Cursor::new(b" world".to_vec())))
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(store.get_info("abc").await.unwrap().offset, 11);

        let mut reader = store.get_reader("abc").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let (store, _dir) = store().await;
        let info = FileInfo::new("gone".to_string());
        store.new_upload(info).await.unwrap();

        Terminater::terminate(&store, "gone").await.unwrap();
        // Second call against an already-missing upload must not error.
        Terminater::terminate(&store, "gone").await.unwrap();
    }

    #[tokio::test]
    async fn concat_assembles_partials_in_order() {
        let (store, _dir) = store().await;

        let mut a = FileInfo::new("A".to_string());
        a.size = 3;
        a.is_partial = true;
        let a = store.new_upload(a).await.unwrap();
        store
            .write_chunk("A", 0, Box::pin(Cursor::new(b"abc".to_vec())))
            .await
            .unwrap();
        let a = store.get_info(&a.id).await.unwrap();

        let mut b = FileInfo::new("B".to_string());
        b.size = 3;
        b.is_partial = true;
        let b = store.new_upload(b).await.unwrap();
        store
            .write_chunk("B", 0, Box::pin(Cursor::new(b"def".to_vec())))
            .await
            .unwrap();
        let b = store.get_info(&b.id).await.unwrap();

        let mut f = FileInfo::new("F".to_string());
        f.is_final = true;
        f.partial_uploads = vec!["A".to_string(), "B".to_string()];
        store.new_upload(f).await.unwrap();

        store.concat_uploads("F", &[a, b]).await.unwrap();

        let info = store.get_info("F").await.unwrap();
        assert_eq!(info.offset, 6);
        assert_eq!(info.size, 6);

        let mut reader = store.get_reader("F").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abcdef");
    }
}
