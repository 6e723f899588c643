//! Built-in task and hook units.

use dagforge_core::unit::{HookKind, HookRegistry, HookUnit, TaskRegistry, TaskUnit, UnitRequest};
use dagforge_core::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

// Back-quoted `project.dataset.table` references in SQL
static TABLE_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([a-zA-Z0-9_-]+)\.([a-zA-Z0-9_]+)\.([a-zA-Z0-9_$]+)`").unwrap()
});

// Fully written `bigquery://project:dataset.table` destinations
static DESTINATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bigquery://([a-zA-Z0-9_-]+):([a-zA-Z0-9_]+)\.([a-zA-Z0-9_$]+)").unwrap()
});

/// Asset holding the transform query.
pub const QUERY_ASSET: &str = "query.sql";

fn bigquery_destination(project: &str, dataset: &str, table: &str) -> String {
    format!("bigquery://{}:{}.{}", project, dataset, table)
}

/// Table destinations named anywhere in a unit's config values, either
/// back-quoted or as full destinations.
fn config_references(config: &BTreeMap<String, String>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for value in config.values() {
        for caps in TABLE_REF_REGEX.captures_iter(value) {
            found.insert(bigquery_destination(&caps[1], &caps[2], &caps[3]));
        }
        for caps in DESTINATION_REGEX.captures_iter(value) {
            found.insert(bigquery_destination(&caps[1], &caps[2], &caps[3]));
        }
    }
    found
}

/// Runs a SQL query and writes the result into a warehouse table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlTransformTask;

impl SqlTransformTask {
    fn config<'a>(request: &'a UnitRequest<'_>, key: &str) -> Result<&'a str> {
        request
            .config
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!("job '{}' is missing config {}", request.job, key))
            })
    }
}

impl TaskUnit for SqlTransformTask {
    fn name(&self) -> &str {
        "sql-transform"
    }

    fn image(&self) -> &str {
        "ghcr.io/dagforge/task-sql-transform:latest"
    }

    fn description(&self) -> &str {
        "SQL query materialized into a warehouse table"
    }

    fn destination(&self, request: &UnitRequest<'_>) -> Result<Option<String>> {
        Ok(Some(bigquery_destination(
            Self::config(request, "PROJECT")?,
            Self::config(request, "DATASET")?,
            Self::config(request, "TABLE")?,
        )))
    }

    fn dependencies(&self, request: &UnitRequest<'_>) -> Result<Vec<String>> {
        let query = request.assets.get(QUERY_ASSET).ok_or_else(|| {
            Error::InvalidInput(format!(
                "job '{}' has no {} asset",
                request.job, QUERY_ASSET
            ))
        })?;
        let own = self.destination(request)?;

        let found: BTreeSet<String> = TABLE_REF_REGEX
            .captures_iter(query)
            .map(|caps| bigquery_destination(&caps[1], &caps[2], &caps[3]))
            .filter(|dest| Some(dest) != own.as_ref())
            .collect();
        Ok(found.into_iter().collect())
    }
}

/// Runs a command in a container. Produces nothing dagforge can track.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellTask;

impl TaskUnit for ShellTask {
    fn name(&self) -> &str {
        "shell"
    }

    fn image(&self) -> &str {
        "ghcr.io/dagforge/task-shell:latest"
    }

    fn destination(&self, _request: &UnitRequest<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn dependencies(&self, _request: &UnitRequest<'_>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Posts a message after the task succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyHook;

impl HookUnit for NotifyHook {
    fn name(&self) -> &str {
        "notify"
    }

    fn image(&self) -> &str {
        "ghcr.io/dagforge/hook-notify:latest"
    }

    fn kind(&self) -> HookKind {
        HookKind::Post
    }
}

/// Raises an SLA alert when the task fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlaCheckHook;

impl HookUnit for SlaCheckHook {
    fn name(&self) -> &str {
        "sla-check"
    }

    fn image(&self) -> &str {
        "ghcr.io/dagforge/hook-sla-check:latest"
    }

    fn kind(&self) -> HookKind {
        HookKind::Fail
    }

    /// The tables it watches for freshness.
    fn dependencies(&self, request: &UnitRequest<'_>) -> Result<Vec<String>> {
        Ok(config_references(request.config).into_iter().collect())
    }
}

/// Registry holding the built-in task units.
pub fn builtin_tasks() -> Result<TaskRegistry> {
    let mut tasks = TaskRegistry::new();
    tasks.register(Arc::new(SqlTransformTask))?;
    tasks.register(Arc::new(ShellTask))?;
    Ok(tasks)
}

/// Registry holding the built-in hook units.
pub fn builtin_hooks() -> Result<HookRegistry> {
    let mut hooks = HookRegistry::new();
    hooks.register(Arc::new(NotifyHook))?;
    hooks.register(Arc::new(SlaCheckHook))?;
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagforge_core::render::RenderedAssetSet;

    fn config() -> BTreeMap<String, String> {
        [("PROJECT", "acme"), ("DATASET", "sales"), ("TABLE", "orders_daily")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sql_destination() {
        let config = config();
        let assets = RenderedAssetSet::new();
        let req = UnitRequest {
            job: "orders-daily",
            config: &config,
            assets: &assets,
        };
        assert_eq!(
            SqlTransformTask.destination(&req).unwrap().as_deref(),
            Some("bigquery://acme:sales.orders_daily")
        );
    }

    #[test]
    fn test_sql_dependencies_exclude_own_table() {
        let config = config();
        let mut assets = RenderedAssetSet::new();
        assets.insert(
            QUERY_ASSET,
            "insert into `acme.sales.orders_daily` \
             select * from `acme.sales.orders` o \
             join `finance.fx.rates` r on true \
             join `acme.sales.orders` again on true",
        );
        let req = UnitRequest {
            job: "orders-daily",
            config: &config,
            assets: &assets,
        };
        assert_eq!(
            SqlTransformTask.dependencies(&req).unwrap(),
            vec!["bigquery://acme:sales.orders", "bigquery://finance:fx.rates"]
        );
    }

    #[test]
    fn test_sql_missing_config() {
        let config = BTreeMap::new();
        let assets = RenderedAssetSet::new();
        let req = UnitRequest {
            job: "x",
            config: &config,
            assets: &assets,
        };
        assert!(SqlTransformTask.destination(&req).is_err());
        assert!(SqlTransformTask.dependencies(&req).is_err());
    }

    #[test]
    fn test_builtin_registries() {
        let tasks = builtin_tasks().unwrap();
        assert_eq!(tasks.names().collect::<Vec<_>>(), vec!["shell", "sql-transform"]);
        let hooks = builtin_hooks().unwrap();
        assert_eq!(hooks.get("sla-check").unwrap().kind(), HookKind::Fail);
        assert_eq!(hooks.get("notify").unwrap().kind(), HookKind::Post);
    }

    #[test]
    fn test_sla_hook_reads_tables_from_config() {
        let config: BTreeMap<String, String> = [
            ("WATCH_TABLE", "`acme.sales.orders`"),
            ("ALSO", "bigquery://finance:fx.rates, bigquery://finance:fx.rates"),
            ("CHANNEL", "#data-alerts"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let assets = RenderedAssetSet::new();
        let req = UnitRequest {
            job: "orders-daily",
            config: &config,
            assets: &assets,
        };
        assert_eq!(
            SlaCheckHook.dependencies(&req).unwrap(),
            vec!["bigquery://acme:sales.orders", "bigquery://finance:fx.rates"]
        );
        assert!(NotifyHook.dependencies(&req).unwrap().is_empty());
    }
}
