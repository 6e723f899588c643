//! Task and hook units, and the registries that hold them.
//!
//! Units are plugins that interpret a job's task or hook config. Registries
//! are plain values handed to each component that needs them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::render::RenderedAssetSet;
use crate::{Error, Result};

/// What a unit sees of a job when asked about destinations and dependencies.
#[derive(Debug, Clone, Copy)]
pub struct UnitRequest<'a> {
    pub job: &'a str,
    pub config: &'a BTreeMap<String, String>,
    pub assets: &'a RenderedAssetSet,
}

pub trait TaskUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Container image the scheduler runs for this task.
    fn image(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// The resource this job produces, e.g. `bigquery://p:d.t`.
    fn destination(&self, request: &UnitRequest<'_>) -> Result<Option<String>>;

    /// Destinations of other resources this job reads.
    fn dependencies(&self, request: &UnitRequest<'_>) -> Result<Vec<String>>;
}

/// When a hook runs relative to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    Pre,
    Post,
    Fail,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Pre => "pre",
            HookKind::Post => "post",
            HookKind::Fail => "fail",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait HookUnit: Send + Sync {
    fn name(&self) -> &str;

    fn image(&self) -> &str;

    fn kind(&self) -> HookKind;

    /// Destinations this hook reads, found in its own config. The request
    /// carries the hook's config, not the task's.
    fn dependencies(&self, _request: &UnitRequest<'_>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Named units of one family.
pub struct UnitRegistry<T: ?Sized> {
    units: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> UnitRegistry<T> {
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.units.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn insert(&mut self, name: &str, unit: Arc<T>) -> Result<()> {
        if self.units.contains_key(name) {
            return Err(Error::Conflict(format!("unit '{}' already registered", name)));
        }
        self.units.insert(name.to_string(), unit);
        Ok(())
    }
}

impl<T: ?Sized> Default for UnitRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for UnitRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            units: self.units.clone(),
        }
    }
}

pub type TaskRegistry = UnitRegistry<dyn TaskUnit>;
pub type HookRegistry = UnitRegistry<dyn HookUnit>;

impl UnitRegistry<dyn TaskUnit> {
    pub fn register(&mut self, unit: Arc<dyn TaskUnit>) -> Result<()> {
        let name = unit.name().to_string();
        self.insert(&name, unit)
    }
}

impl UnitRegistry<dyn HookUnit> {
    pub fn register(&mut self, unit: Arc<dyn HookUnit>) -> Result<()> {
        let name = unit.name().to_string();
        self.insert(&name, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    impl HookUnit for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn image(&self) -> &str {
            "busybox"
        }

        fn kind(&self) -> HookKind {
            HookKind::Post
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut hooks = HookRegistry::new();
        hooks.register(Arc::new(Noop("notify"))).unwrap();
        assert!(matches!(
            hooks.register(Arc::new(Noop("notify"))),
            Err(Error::Conflict(_))
        ));
        assert!(hooks.contains("notify"));
        assert_eq!(hooks.names().collect::<Vec<_>>(), vec!["notify"]);
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = HookRegistry::new();
        let b = HookRegistry::new();
        a.register(Arc::new(Noop("x"))).unwrap();
        assert!(a.get("x").is_some());
        assert!(b.get("x").is_none());
    }
}
