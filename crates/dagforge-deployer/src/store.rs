//! Storage backend registry and the per-project store factory.

use dagforge_core::artifact::ObjectStore;
use dagforge_core::project::{ProjectSpec, STORAGE_SECRET_NAME};
use dagforge_core::secret::SecretValue;
use dagforge_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Opens object stores for one URL scheme.
pub trait StoreBackend: Send + Sync {
    fn scheme(&self) -> &'static str;

    /// Open the store rooted at `location` for `project`.
    fn open(
        &self,
        project: &str,
        location: &Url,
        credential: &SecretValue,
    ) -> Result<Arc<dyn ObjectStore>>;
}

/// Backends keyed by scheme.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    backends: BTreeMap<&'static str, Arc<dyn StoreBackend>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. A scheme can only be registered once.
    pub fn register(&mut self, backend: Arc<dyn StoreBackend>) -> Result<()> {
        let scheme = backend.scheme();
        if self.backends.contains_key(scheme) {
            return Err(Error::Conflict(format!(
                "storage scheme '{}' already registered",
                scheme
            )));
        }
        self.backends.insert(scheme, backend);
        Ok(())
    }

    pub fn with(mut self, backend: Arc<dyn StoreBackend>) -> Result<Self> {
        self.register(backend)?;
        Ok(self)
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn StoreBackend>> {
        self.backends.get(scheme)
    }

    pub fn schemes(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Builds the object store a project's artifacts are deployed to.
pub trait StoreFactory: Send + Sync {
    fn for_project(&self, project: &ProjectSpec) -> Result<Arc<dyn ObjectStore>>;
}

/// [`StoreFactory`] reading `storage-path` and `STORAGE_SECRET` from the
/// project and dispatching on the URL scheme.
#[derive(Debug, Clone)]
pub struct ProjectStoreFactory {
    registry: StoreRegistry,
}

impl ProjectStoreFactory {
    pub fn new(registry: StoreRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }
}

impl StoreFactory for ProjectStoreFactory {
    fn for_project(&self, project: &ProjectSpec) -> Result<Arc<dyn ObjectStore>> {
        let name = project.name.as_str();
        let path = project
            .storage_path()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::storage_config(name, "missing config 'storage-path'"))?;
        let credential = project
            .secret(STORAGE_SECRET_NAME)
            .ok_or_else(|| {
                Error::storage_config(name, format!("missing secret '{}'", STORAGE_SECRET_NAME))
            })?;
        let location = Url::parse(path).map_err(|e| {
            Error::storage_config(name, format!("invalid storage-path '{}': {}", path, e))
        })?;
        let backend = self.registry.get(location.scheme()).ok_or_else(|| {
            Error::storage_config(
                name,
                format!("unsupported storage scheme '{}'", location.scheme()),
            )
        })?;
        backend.open(name, &location, credential)
    }
}

/// Reject object paths that could escape the store root.
pub(crate) fn check_object_path(path: &str) -> Result<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(Error::InvalidInput(format!("invalid object path '{}'", path)));
    }
    Ok(())
}
