//! Project (tenant) specifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::RecordId;
use crate::secret::SecretValue;

/// Config key naming the object-store destination for compiled artifacts.
pub const STORAGE_PATH_KEY: &str = "storage-path";

/// Secret holding the credential for the storage backend.
pub const STORAGE_SECRET_NAME: &str = "STORAGE_SECRET";

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    #[serde(default)]
    pub id: RecordId,
    /// Unique project name.
    pub name: String,
    /// Free-form configuration, e.g. `storage-path`.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Named secrets. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub secrets: BTreeMap<String, SecretValue>,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            config: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<SecretValue>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn storage_path(&self) -> Option<&str> {
        self.config.get(STORAGE_PATH_KEY).map(|s| s.as_str())
    }

    pub fn secret(&self, name: &str) -> Option<&SecretValue> {
        self.secrets.get(name)
    }
}
