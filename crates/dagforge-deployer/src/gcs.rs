//! Google Cloud Storage object store (`gs://bucket/prefix`), via the JSON API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use dagforge_core::artifact::{ContentHash, ObjectMeta, ObjectStore};
use dagforge_core::secret::SecretValue;
use dagforge_core::{Error, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use url::Url;

use crate::store::{StoreBackend, check_object_path};

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Backend for the `gs` scheme.
#[derive(Debug, Clone)]
pub struct GcsBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl GcsBackend {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Use another API endpoint, e.g. a local emulator.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GcsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for GcsBackend {
    fn scheme(&self) -> &'static str {
        "gs"
    }

    fn open(
        &self,
        project: &str,
        location: &Url,
        credential: &SecretValue,
    ) -> Result<Arc<dyn ObjectStore>> {
        let bucket = location
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                Error::storage_config(project, format!("'{}' names no bucket", location))
            })?;
        let tokens = TokenSource::from_secret(credential)
            .map_err(|message| Error::storage_config(project, message))?;
        let prefix = location.path().trim_matches('/');

        Ok(Arc::new(GcsStore {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            tokens: Arc::new(tokens),
        }))
    }
}

#[derive(Deserialize)]
struct TokenSecret {
    access_token: String,
}

/// Fields of a service-account key file that the token exchange needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

/// Service account that trades a signed assertion for short-lived tokens.
struct ServiceAccount {
    email: String,
    token_uri: String,
    key: EncodingKey,
    cached: AsyncMutex<Option<CachedToken>>,
}

impl ServiceAccount {
    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.email,
            scope: STORAGE_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| Error::Storage(format!("signing token assertion failed: {}", e)))
    }

    async fn token(&self, client: &reqwest::Client) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.refresh_at > now) {
            return Ok(token.token.clone());
        }

        let assertion = self.assertion(now)?;
        let response = client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(request_error)?;
        let granted: TokenResponse = GcsStore::check(response, "token exchange")
            .await?
            .json()
            .await
            .map_err(|e| Error::Storage(format!("invalid token response: {}", e)))?;

        let lifetime = granted.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        let refresh_at = TimeDelta::try_seconds(lifetime - TOKEN_REFRESH_MARGIN_SECS)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        debug!(account = %self.email, "exchanged service account assertion for access token");
        *cached = Some(CachedToken {
            token: granted.access_token.clone(),
            refresh_at,
        });
        Ok(granted.access_token)
    }
}

/// Where bearer tokens for one store come from.
enum TokenSource {
    Static(String),
    ServiceAccount(ServiceAccount),
}

impl TokenSource {
    /// Read a storage secret: a raw token, a JSON object carrying
    /// `access_token`, or a service-account key file.
    fn from_secret(credential: &SecretValue) -> std::result::Result<Self, String> {
        const EMPTY: &str = "storage secret holds no access token or service account key";
        let text = credential.as_str().ok_or(EMPTY)?.trim();
        if text.is_empty() {
            return Err(EMPTY.to_string());
        }
        if !text.starts_with('{') {
            return Ok(Self::Static(text.to_string()));
        }

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| format!("storage secret is not valid JSON: {}", e))?;
        if value.get("type").and_then(|t| t.as_str()) == Some("service_account") {
            let key: ServiceAccountKey = serde_json::from_value(value)
                .map_err(|e| format!("invalid service account key: {}", e))?;
            let signing = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                .map_err(|e| format!("invalid service account private key: {}", e))?;
            return Ok(Self::ServiceAccount(ServiceAccount {
                email: key.client_email,
                token_uri: key.token_uri,
                key: signing,
                cached: AsyncMutex::new(None),
            }));
        }

        let parsed: TokenSecret =
            serde_json::from_value(value).map_err(|_| EMPTY.to_string())?;
        if parsed.access_token.is_empty() {
            return Err(EMPTY.to_string());
        }
        Ok(Self::Static(parsed.access_token))
    }

    async fn bearer(&self, client: &reqwest::Client) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(account) => account.token(client).await,
        }
    }
}

pub struct GcsStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    tokens: Arc<TokenSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListItem {
    name: String,
    /// Base64 MD5 of the object; absent for composite objects.
    md5_hash: Option<String>,
}

impl ListItem {
    fn content_hash(&self) -> Option<ContentHash> {
        let raw = STANDARD.decode(self.md5_hash.as_deref()?).ok()?;
        Some(ContentHash::Md5(hex::encode(raw)))
    }
}

impl GcsStore {
    fn object_name(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn relative<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            Some(name)
        } else {
            name.strip_prefix(self.prefix.as_str())?.strip_prefix('/')
        }
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(Error::Storage(format!("{} failed ({}): {}", what, status, text)))
    }
}

fn request_error(e: reqwest::Error) -> Error {
    Error::Storage(format!("request failed: {}", e))
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn scheme(&self) -> &'static str {
        "gs"
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        check_object_path(path)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(&self.object_name(path))
        );

        let token = self.tokens.bearer(&self.client).await?;
        // Single-request media uploads replace the object atomically.
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(request_error)?;
        Self::check(response, &format!("upload of {}", path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        check_object_path(path)?;
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(&self.object_name(path))
        );

        let token = self.tokens.bearer(&self.client).await?;
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(request_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response, &format!("delete of {}", path)).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let full_prefix = self.object_name(prefix);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/storage/v1/b/{}/o?prefix={}&fields=items(name,md5Hash),nextPageToken",
                self.endpoint,
                urlencoding::encode(&self.bucket),
                urlencoding::encode(&full_prefix)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let token = self.tokens.bearer(&self.client).await?;
            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(request_error)?;
            let page: ListResponse = Self::check(response, "list")
                .await?
                .json()
                .await
                .map_err(|e| Error::Storage(format!("invalid list response: {}", e)))?;

            for item in page.items {
                if let Some(path) = self.relative(&item.name) {
                    objects.push(ObjectMeta {
                        path: path.to_string(),
                        content_hash: item.content_hash(),
                    });
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}
