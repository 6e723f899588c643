//! Deploy commands.

use anyhow::{Result, bail};
use serde_json::Value;

use crate::client::ApiClient;

pub async fn project(api_url: &str, project: &str) -> Result<()> {
    let client = ApiClient::new(api_url);
    let report = client
        .post(&format!("projects/{}/deploy", project), None::<&()>)
        .await?;
    print_report(project, &report);
    Ok(())
}

/// Deploy every project, printing each outcome. Fails if any project failed.
pub async fn all(api_url: &str) -> Result<()> {
    let client = ApiClient::new(api_url);
    let body = client.post("deploy", None::<&()>).await?;

    let mut failed = 0;
    for entry in body.as_array().map(Vec::as_slice).unwrap_or_default() {
        let name = entry["project"].as_str().unwrap_or("?");
        if entry["status"] == "ok" {
            print_report(name, &entry["report"]);
            continue;
        }
        failed += 1;
        println!("✗ {}: {}", name, entry["error"].as_str().unwrap_or("unknown error"));
        for failure in entry["failures"].as_array().map(Vec::as_slice).unwrap_or_default() {
            println!(
                "    {} [{}]: {}",
                failure["job"].as_str().unwrap_or("?"),
                failure["stage"].as_str().unwrap_or("?"),
                failure["message"].as_str().unwrap_or(""),
            );
        }
    }

    if failed > 0 {
        bail!("{} project(s) failed to deploy", failed);
    }
    Ok(())
}

fn print_report(project: &str, report: &Value) {
    let count = |key: &str| report[key].as_array().map(Vec::len).unwrap_or_default();
    println!(
        "✓ {}: {} written, {} unchanged, {} deleted",
        project,
        count("written"),
        count("unchanged"),
        count("deleted"),
    );
}
