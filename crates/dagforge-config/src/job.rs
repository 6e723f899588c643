//! Job specification parsing.

use crate::{ConfigError, ConfigResult};
use chrono::NaiveDate;
use dagforge_core::job::{
    JobBehavior, JobHook, JobRef, JobSchedule, JobSpec, JobTask, RetryPolicy, Span, TruncateTo,
    Window,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::{BTreeMap, BTreeSet};

/// Parse a document holding exactly one `job` node.
pub fn parse_job(kdl: &str) -> ConfigResult<JobSpec> {
    let mut jobs = parse_jobs(kdl)?;
    match jobs.len() {
        1 => Ok(jobs.remove(0)),
        0 => Err(ConfigError::MissingField("job".to_string())),
        n => Err(ConfigError::InvalidValue {
            field: "job".to_string(),
            message: format!("expected one job, found {}", n),
        }),
    }
}

/// Parse every `job` node in a document.
pub fn parse_jobs(kdl: &str) -> ConfigResult<Vec<JobSpec>> {
    let doc: KdlDocument = kdl.parse()?;

    let mut jobs = Vec::new();
    let mut seen = BTreeSet::new();
    for node in doc.nodes() {
        if node.name().value() != "job" {
            continue; // Ignore unknown nodes
        }
        let job = parse_job_node(node)?;
        if !seen.insert(job.name.clone()) {
            return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
        }
        jobs.push(job);
    }
    Ok(jobs)
}

fn parse_job_node(node: &KdlNode) -> ConfigResult<JobSpec> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;
    let owner = get_string_prop(node, "owner")
        .ok_or_else(|| ConfigError::MissingField(format!("owner for job '{}'", name)))?;

    let mut description = String::new();
    let mut labels = BTreeMap::new();
    let mut schedule = None;
    let mut behavior = JobBehavior::default();
    let mut window = Window::default();
    let mut task = None;
    let mut hooks = Vec::new();
    let mut dependencies = Vec::new();
    let mut assets = BTreeMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "description" => {
                    description = get_first_string_arg(child).unwrap_or_default();
                }
                "label" => {
                    let args = get_all_string_args(child);
                    if let [key, value] = args.as_slice() {
                        labels.insert(key.clone(), value.clone());
                    } else {
                        return Err(invalid("label", "expected a key and a value"));
                    }
                }
                "schedule" => schedule = Some(parse_schedule(child, &name)?),
                "behavior" => behavior = parse_behavior(child)?,
                "window" => window = parse_window(child)?,
                "task" => {
                    if task.is_some() {
                        return Err(ConfigError::Duplicate(format!("task in job '{}'", name)));
                    }
                    let unit = get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField(format!("task unit for job '{}'", name))
                    })?;
                    task = Some(JobTask {
                        unit,
                        config: parse_config_block(child),
                    });
                }
                "hook" => {
                    let unit = get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField(format!("hook unit for job '{}'", name))
                    })?;
                    hooks.push(JobHook {
                        unit,
                        config: parse_config_block(child),
                    });
                }
                "depends-on" => {
                    for reference in get_all_string_args(child) {
                        let parsed: JobRef = reference.parse().map_err(|_| {
                            ConfigError::InvalidReference(format!(
                                "job '{}' depends on malformed '{}'",
                                name, reference
                            ))
                        })?;
                        dependencies.push(parsed);
                    }
                }
                "asset" => {
                    let args = get_all_string_args(child);
                    if let [asset_name, text] = args.as_slice() {
                        if assets.insert(asset_name.clone(), text.clone()).is_some() {
                            return Err(ConfigError::Duplicate(format!(
                                "asset '{}' in job '{}'",
                                asset_name, name
                            )));
                        }
                    } else {
                        return Err(invalid("asset", "expected a name and its content"));
                    }
                }
                _ => {}
            }
        }
    }

    let schedule =
        schedule.ok_or_else(|| ConfigError::MissingField(format!("schedule for job '{}'", name)))?;
    let task = task.ok_or_else(|| ConfigError::MissingField(format!("task for job '{}'", name)))?;

    let job = JobSpec {
        name,
        owner,
        description,
        labels,
        schedule,
        behavior,
        window,
        task,
        hooks,
        dependencies,
        assets,
    };
    job.validate()?;
    Ok(job)
}

fn parse_schedule(node: &KdlNode, job: &str) -> ConfigResult<JobSchedule> {
    let start = get_string_prop(node, "start")
        .ok_or_else(|| ConfigError::MissingField(format!("schedule start for job '{}'", job)))?;
    let interval = get_string_prop(node, "interval")
        .ok_or_else(|| ConfigError::MissingField(format!("schedule interval for job '{}'", job)))?;
    let end_date = get_string_prop(node, "end")
        .map(|end| parse_date("schedule end", &end))
        .transpose()?;

    Ok(JobSchedule {
        start_date: parse_date("schedule start", &start)?,
        end_date,
        interval,
    })
}

fn parse_behavior(node: &KdlNode) -> ConfigResult<JobBehavior> {
    let mut behavior = JobBehavior {
        depends_on_past: get_bool_prop(node, "depends-on-past").unwrap_or(false),
        catch_up: get_bool_prop(node, "catch-up").unwrap_or(false),
        retry: RetryPolicy::default(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "retry" {
                let mut retry = RetryPolicy::default();
                if let Some(count) = child.get("count").and_then(|v| v.as_integer()) {
                    retry.count =
                        u32::try_from(count).map_err(|_| invalid("retry count", "out of range"))?;
                }
                if let Some(delay) = get_string_prop(child, "delay") {
                    retry.delay = parse_span("retry delay", &delay)?;
                }
                retry.exponential_backoff =
                    get_bool_prop(child, "exponential-backoff").unwrap_or(false);
                behavior.retry = retry;
            }
        }
    }
    Ok(behavior)
}

fn parse_window(node: &KdlNode) -> ConfigResult<Window> {
    let mut window = Window::default();
    if let Some(size) = get_string_prop(node, "size") {
        window.size = parse_span("window size", &size)?;
    }
    if let Some(offset) = get_string_prop(node, "offset") {
        window.offset = parse_span("window offset", &offset)?;
    }
    if let Some(unit) = get_string_prop(node, "truncate-to") {
        window.truncate_to = unit
            .parse::<TruncateTo>()
            .map_err(|e| invalid("window truncate-to", &e.to_string()))?;
    }
    Ok(window)
}

/// Collect `config { KEY "value" }` children of a task or hook node.
fn parse_config_block(node: &KdlNode) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "config" {
                continue;
            }
            if let Some(entries) = child.children() {
                for entry in entries.nodes() {
                    let key = entry.name().value().to_string();
                    if let Some(val) = get_first_string_arg(entry) {
                        config.insert(key, val);
                    }
                }
            }
        }
    }
    config
}

fn parse_date(field: &str, value: &str) -> ConfigResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| invalid(field, &format!("'{}': {}", value, e)))
}

fn parse_span(field: &str, value: &str) -> ConfigResult<Span> {
    value
        .parse::<Span>()
        .map_err(|e| invalid(field, &e.to_string()))
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_job() {
        let kdl = r#"
            job "orders-raw" owner="data@example.com" {
                schedule start="2024-01-01" interval="@daily"
                task "shell" {
                    config {
                        COMMAND "ingest.sh"
                    }
                }
            }
        "#;

        let job = parse_job(kdl).unwrap();
        assert_eq!(job.name, "orders-raw");
        assert_eq!(job.owner, "data@example.com");
        assert_eq!(job.schedule.interval, "@daily");
        assert_eq!(job.task.unit, "shell");
        assert_eq!(job.task.config.get("COMMAND").map(String::as_str), Some("ingest.sh"));
        assert_eq!(job.window, Window::default());
        assert!(job.dependencies.is_empty());
    }

    #[test]
    fn test_parse_full_job() {
        let kdl = r#"
            job "orders-daily" owner="data@example.com" {
                description "daily orders rollup"
                label "team" "data"
                schedule start="2024-01-01" end="2024-12-31" interval="0 2 * * *"
                behavior depends-on-past=#true {
                    retry count=3 delay="10m" exponential-backoff=#true
                }
                window size="48h" offset="-2h" truncate-to="h"
                task "sql-transform" {
                    config {
                        PROJECT "acme"
                        DATASET "sales"
                        TABLE "orders_daily"
                    }
                }
                hook "notify" {
                    config {
                        CHANNEL "data-alerts"
                    }
                }
                depends-on "orders-raw" "finance/fx-rates"
                asset "query.sql" "select * from `acme.sales.orders`"
            }
        "#;

        let job = parse_job(kdl).unwrap();
        assert_eq!(job.description, "daily orders rollup");
        assert_eq!(job.labels.get("team").map(String::as_str), Some("data"));
        assert_eq!(
            job.schedule.end_date,
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert!(job.behavior.depends_on_past);
        assert!(!job.behavior.catch_up);
        assert_eq!(job.behavior.retry.count, 3);
        assert_eq!(job.behavior.retry.delay.seconds(), 600);
        assert!(job.behavior.retry.exponential_backoff);
        assert_eq!(job.window.size.seconds(), 48 * 3600);
        assert_eq!(job.window.offset.seconds(), -2 * 3600);
        assert_eq!(job.window.truncate_to, TruncateTo::Hour);
        assert_eq!(job.task.config.len(), 3);
        assert_eq!(job.hooks.len(), 1);
        assert_eq!(job.hooks[0].unit, "notify");
        assert_eq!(
            job.dependencies,
            vec![
                JobRef::local("orders-raw"),
                JobRef::qualified("finance", "fx-rates")
            ]
        );
        assert!(job.assets["query.sql"].contains("acme.sales.orders"));
    }

    #[test]
    fn test_missing_schedule() {
        let kdl = r#"
            job "a" owner="x" {
                task "shell"
            }
        "#;
        assert!(matches!(parse_job(kdl), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_missing_owner() {
        let kdl = r#"
            job "a" {
                schedule start="2024-01-01" interval="@daily"
                task "shell"
            }
        "#;
        assert!(matches!(parse_job(kdl), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_malformed_dependency() {
        let kdl = r#"
            job "a" owner="x" {
                schedule start="2024-01-01" interval="@daily"
                task "shell"
                depends-on "Not A Job"
            }
        "#;
        assert!(matches!(
            parse_job(kdl),
            Err(ConfigError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_invalid_window() {
        let kdl = r#"
            job "a" owner="x" {
                schedule start="2024-01-01" interval="@daily"
                window size="forever"
                task "shell"
            }
        "#;
        assert!(matches!(
            parse_job(kdl),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_jobs_in_document() {
        let kdl = r#"
            job "a" owner="x" {
                schedule start="2024-01-01" interval="@daily"
                task "shell"
            }
            job "a" owner="y" {
                schedule start="2024-01-01" interval="@daily"
                task "shell"
            }
        "#;
        assert!(matches!(parse_jobs(kdl), Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_parse_job_requires_exactly_one() {
        assert!(matches!(
            parse_job("other \"x\""),
            Err(ConfigError::MissingField(_))
        ));
    }
}
