//! The asset renderer callback contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;
use crate::job::JobSpec;

/// Rendered asset text keyed by asset name, for one (job, scheduled time).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderedAssetSet(BTreeMap<String, String>);

impl RenderedAssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.0.insert(name.into(), text.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for RenderedAssetSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Materializes a job's asset templates for a scheduled time.
///
/// Implementations must be pure: same inputs, same output, no I/O and no
/// wall clock. They are called from the resolver and the compiler, possibly
/// concurrently.
pub trait AssetRenderer: Send + Sync {
    fn render(&self, job: &JobSpec, scheduled_at: DateTime<Utc>) -> Result<RenderedAssetSet>;
}

impl<F> AssetRenderer for F
where
    F: Fn(&JobSpec, DateTime<Utc>) -> Result<RenderedAssetSet> + Send + Sync,
{
    fn render(&self, job: &JobSpec, scheduled_at: DateTime<Utc>) -> Result<RenderedAssetSet> {
        self(job, scheduled_at)
    }
}

/// Renderer that returns the raw asset text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawAssets;

impl AssetRenderer for RawAssets {
    fn render(&self, job: &JobSpec, _scheduled_at: DateTime<Utc>) -> Result<RenderedAssetSet> {
        Ok(job
            .assets
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
