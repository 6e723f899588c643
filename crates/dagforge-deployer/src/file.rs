//! Local directory object store (`file:///path`).

use async_trait::async_trait;
use bytes::Bytes;
use dagforge_core::artifact::{ContentHash, ObjectMeta, ObjectStore};
use dagforge_core::secret::SecretValue;
use dagforge_core::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::store::{StoreBackend, check_object_path};

#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackend;

impl FileBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StoreBackend for FileBackend {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn open(
        &self,
        project: &str,
        location: &Url,
        _credential: &SecretValue,
    ) -> Result<Arc<dyn ObjectStore>> {
        let root = location.to_file_path().map_err(|_| {
            Error::storage_config(project, format!("'{}' is not a local path", location))
        })?;
        Ok(Arc::new(FileStore::new(root)))
    }
}

/// Objects stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        check_object_path(path)?;
        Ok(self.root.join(path))
    }
}

fn io_error(what: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Storage(format!("{} {}: {}", what, path.display(), err))
}

#[async_trait]
impl ObjectStore for FileStore {
    fn scheme(&self) -> &'static str {
        "file"
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create", &dir, e))?;

        // Write to a sibling temp file and rename, so readers see either the
        // old content or the new one.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".dagforge-")
                .tempfile_in(&dir)
                .map_err(|e| io_error("create temp in", &dir, e))?;
            tmp.write_all(&data)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| io_error("write", tmp.path(), e))?;
            tmp.persist(&target)
                .map_err(|e| io_error("rename to", &target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &target, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error("list", &dir, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("list", &dir, e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error("stat", &entry.path(), e))?;
                let full = entry.path();
                if file_type.is_dir() {
                    pending.push(full);
                    continue;
                }
                // Temp files from in-flight writes
                if entry.file_name().to_string_lossy().starts_with(".dagforge-") {
                    continue;
                }
                let Ok(relative) = full.strip_prefix(&self.root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !relative.starts_with(prefix) {
                    continue;
                }
                let data = tokio::fs::read(&full)
                    .await
                    .map_err(|e| io_error("read", &full, e))?;
                objects.push(ObjectMeta {
                    path: relative,
                    content_hash: Some(ContentHash::sha256_of(&data)),
                });
            }
        }

        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_is_visible_and_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .write("dags/orders.py", Bytes::from_static(b"dag"))
            .await
            .unwrap();
        store
            .write("dags/__lib.py", Bytes::from_static(b"lib"))
            .await
            .unwrap();

        let content = std::fs::read(dir.path().join("dags/orders.py")).unwrap();
        assert_eq!(content, b"dag");

        let listed = store.list("dags/").await.unwrap();
        let paths: Vec<_> = listed.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["dags/__lib.py", "dags/orders.py"]);
        assert_eq!(listed[1].content_hash, Some(ContentHash::sha256_of(b"dag")));
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.write("dags/a.py", Bytes::from_static(b"1")).await.unwrap();
        store.write("dags/a.py", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("dags/a.py")).unwrap(), b"2");

        store.delete("dags/a.py").await.unwrap();
        store.delete("dags/a.py").await.unwrap();
        assert!(store.list("dags/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nope"));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[test]
    fn test_backend_requires_local_path() {
        let backend = FileBackend::new();
        let secret = SecretValue::from("");
        let url = Url::parse("file://remote-host/share").unwrap();
        assert!(backend.open("acme", &url, &secret).is_err());
    }
}
