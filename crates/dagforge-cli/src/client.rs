//! Thin HTTP client for the dagforge API.

use anyhow::{Context, Result, bail};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("{}/api/v1", api_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<Value> {
        self.send(Method::POST, path, body).await
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "api request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach {}", url))?;

        let status = response.status();
        let text = response.text().await?;
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            return Ok(value);
        }
        bail!("{}", describe_failure(status, &value))
    }
}

/// Render an API error body for the terminal, including per-job failures.
pub fn describe_failure(status: StatusCode, body: &Value) -> String {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let mut out = format!("{} ({})", message, status);
    if let Some(failures) = body.get("failures").and_then(Value::as_array) {
        for failure in failures {
            out.push_str(&format!(
                "\n  {} [{}]: {}",
                failure["job"].as_str().unwrap_or("?"),
                failure["stage"].as_str().unwrap_or("?"),
                failure["message"].as_str().unwrap_or(""),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joins_base() {
        let client = ApiClient::new("http://localhost:9100/");
        assert_eq!(
            client.url("/projects/acme/deploy"),
            "http://localhost:9100/api/v1/projects/acme/deploy"
        );
    }

    #[test]
    fn test_describe_failure_lists_jobs() {
        let body = json!({
            "error": "deployment of project acme failed",
            "failures": [{ "job": "b", "stage": "write", "message": "denied" }],
        });
        let text = describe_failure(StatusCode::UNPROCESSABLE_ENTITY, &body);
        assert!(text.starts_with("deployment of project acme failed (422"));
        assert!(text.contains("b [write]: denied"));
    }
}
