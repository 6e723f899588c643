//! Process-local object store (`mem://name`), used by tests and dry runs.

use async_trait::async_trait;
use bytes::Bytes;
use dagforge_core::artifact::{ContentHash, ObjectMeta, ObjectStore};
use dagforge_core::secret::SecretValue;
use dagforge_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use url::Url;

use crate::store::{StoreBackend, check_object_path};

/// Backend for the `mem` scheme. Opening the same location twice yields the
/// same store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `location`, created on first use.
    pub fn store(&self, location: &str) -> Arc<MemoryStore> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores
            .entry(location.trim_end_matches('/').to_string())
            .or_default()
            .clone()
    }
}

impl StoreBackend for MemoryBackend {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    fn open(
        &self,
        _project: &str,
        location: &Url,
        _credential: &SecretValue,
    ) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.store(location.as_str()))
    }
}

/// Objects kept in a map, with counters and fault injection for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
    failing: Mutex<BTreeSet<String>>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.read().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Make every write and delete of `path` fail.
    pub fn fail_path(&self, path: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful deletes so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check_fault(&self, path: &str) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(path) {
            return Err(Error::Storage(format!("injected failure for {}", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        check_object_path(path)?;
        self.check_fault(path)?;
        self.objects.write().await.insert(path.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        check_object_path(path)?;
        self.check_fault(path)?;
        if self.objects.write().await.remove(path).is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, data)| ObjectMeta {
                path: path.clone(),
                content_hash: Some(ContentHash::sha256_of(data)),
            })
            .collect())
    }
}
