//! Job commands.

use anyhow::Result;
use serde_json::Value;

use super::load_jobs;
use crate::client::ApiClient;

/// Register every job in the file. Stops at the first rejected job.
pub async fn register(api_url: &str, project: &str, path: &str) -> Result<()> {
    let client = ApiClient::new(api_url);
    let jobs = load_jobs(path)?;
    let route = format!("projects/{}/jobs", project);

    for job in &jobs {
        client.post(&route, Some(job)).await?;
        println!("Registered {}/{}", project, job.name);
    }
    Ok(())
}

pub async fn list(api_url: &str, project: &str) -> Result<()> {
    let client = ApiClient::new(api_url);
    let body = client.get(&format!("projects/{}/jobs", project)).await?;

    println!("{:<32} {:<32} {}", "NAME", "OWNER", "INTERVAL");
    for job in body.as_array().map(Vec::as_slice).unwrap_or_default() {
        println!(
            "{:<32} {:<32} {}",
            job["name"].as_str().unwrap_or("?"),
            job["owner"].as_str().unwrap_or("?"),
            interval(job),
        );
    }
    Ok(())
}

fn interval(job: &Value) -> String {
    match &job["schedule"]["interval"] {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
