//! CLI command implementations.

pub mod deploy;
pub mod jobs;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dagforge_config::{MacroRenderer, parse_jobs};
use dagforge_core::job::JobSpec;
use dagforge_core::render::AssetRenderer;

use crate::client::ApiClient;

/// Parse every job in a KDL file. Parsing validates each job.
pub fn load_jobs(path: &str) -> Result<Vec<JobSpec>> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    parse_jobs(&source).with_context(|| format!("failed to parse {}", path))
}

pub fn validate(path: &str) -> Result<()> {
    let jobs = load_jobs(path)?;
    for job in &jobs {
        let deps: Vec<String> = job.dependencies.iter().map(|d| d.to_string()).collect();
        println!(
            "✓ {} (owner: {}, unit: {}, deps: [{}])",
            job.name,
            job.owner,
            job.task.unit,
            deps.join(", ")
        );
    }
    println!("{} job(s) valid", jobs.len());
    Ok(())
}

/// Print every asset of every job in the file, rendered at `at` or each
/// job's anchor time.
pub fn render(path: &str, at: Option<&str>) -> Result<()> {
    let jobs = load_jobs(path)?;
    let at = at.map(parse_time).transpose()?;
    let renderer = MacroRenderer::new();

    for job in &jobs {
        let scheduled_at = at.unwrap_or_else(|| job.anchor_time());
        let assets = renderer.render(job, scheduled_at)?;
        println!("# {} @ {}", job.name, scheduled_at.to_rfc3339());
        for (name, text) in assets.iter() {
            println!("--- {}", name);
            println!("{}", text);
        }
    }
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 time: {}", raw))
}

pub async fn graph(api_url: &str, project: &str) -> Result<()> {
    let client = ApiClient::new(api_url);
    let body = client.get(&format!("projects/{}/graph", project)).await?;

    let mut weights: Vec<(&str, u64)> = body["weights"]
        .as_object()
        .map(|w| {
            w.iter()
                .map(|(k, v)| (k.as_str(), v.as_u64().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();
    weights.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    println!("{:<40} {:>8}", "JOB", "PRIORITY");
    for (job, weight) in weights {
        println!("{:<40} {:>8}", job, weight);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const JOBS: &str = r#"
job "extract" owner="data@example.com" {
    schedule start="2024-01-01" interval="@daily"
    task "shell"
}
"#;

    #[test]
    fn test_load_jobs_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(JOBS.as_bytes()).unwrap();

        let jobs = load_jobs(file.path().to_str().unwrap()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "extract");
    }

    #[test]
    fn test_load_jobs_missing_file() {
        let err = load_jobs("/nonexistent/jobs.kdl").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("2024-03-01T02:00:00+01:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T01:00:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }
}
