//! Compiled artifacts and the object store they are deployed to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;

/// Prefix of object names in the jobs dir that belong to the scheduler
/// itself (shared libraries etc.) and are never garbage-collected.
pub const RESERVED_PREFIX: &str = "__";

/// The scheduler-native definition of one job, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub job: String,
    /// Path relative to the project's storage root.
    pub path: String,
    pub payload: Bytes,
}

impl CompiledArtifact {
    /// Hex SHA-256 of the payload.
    pub fn content_hash(&self) -> String {
        content_hash(&self.payload)
    }
}

pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest of stored content as a backend reports it. Backends that cannot
/// compute SHA-256 cheaply report the digest they keep natively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "hex", rename_all = "lowercase")]
pub enum ContentHash {
    Sha256(String),
    Md5(String),
}

impl ContentHash {
    pub fn sha256_of(data: &[u8]) -> Self {
        Self::Sha256(content_hash(data))
    }

    pub fn md5_of(data: &[u8]) -> Self {
        Self::Md5(format!("{:x}", md5::compute(data)))
    }

    /// Whether `data` has this digest, computed with the same algorithm.
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            Self::Sha256(hex) => hex.eq_ignore_ascii_case(&content_hash(data)),
            Self::Md5(hex) => hex.eq_ignore_ascii_case(&format!("{:x}", md5::compute(data))),
        }
    }
}

/// Where a scheduler expects job definitions inside a project's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub jobs_dir: String,
    pub extension: String,
}

impl ArtifactLayout {
    pub fn new(jobs_dir: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            jobs_dir: jobs_dir.into().trim_matches('/').to_string(),
            extension: extension.into(),
        }
    }

    pub fn path_for(&self, job: &str) -> String {
        format!("{}/{}{}", self.jobs_dir, job, self.extension)
    }

    /// Prefix to list when looking for existing artifacts.
    pub fn prefix(&self) -> String {
        format!("{}/", self.jobs_dir)
    }

    /// Job name an object path belongs to, if it is a collectable job artifact.
    pub fn job_for(&self, path: &str) -> Option<String> {
        let file = path.strip_prefix(&self.prefix())?;
        if file.contains('/') || file.starts_with(RESERVED_PREFIX) {
            return None;
        }
        let job = file.strip_suffix(self.extension.as_str())?;
        (!job.is_empty()).then(|| job.to_string())
    }
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub path: String,
    /// Digest of the content, when the backend can report one cheaply.
    pub content_hash: Option<ContentHash>,
}

/// A project-scoped object store. Paths are relative to the project's
/// configured storage root. Writes must be all-or-nothing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend scheme, e.g. `gs`.
    fn scheme(&self) -> &'static str;

    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
}
