//! Project secrets and sealing with the application key.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Minimum length of the application key.
pub const MIN_APP_KEY_LEN: usize = 32;

/// An opaque secret value. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(Vec<u8>);

impl SecretValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The value as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(<{} bytes>)", self.0.len())
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

/// Symmetric key used to seal secrets before they reach the store.
///
/// A sealed secret is `hex(value) + "." + hex(tag)`, where the tag is an
/// HMAC-SHA256 over the project name, secret name and value. Opening checks
/// the tag, so values moved between projects or names are rejected.
#[derive(Clone)]
pub struct ApplicationKey(Vec<u8>);

impl ApplicationKey {
    pub fn new(key: &str) -> Result<Self> {
        if key.chars().count() < MIN_APP_KEY_LEN {
            return Err(Error::InvalidInput(format!(
                "application key must be at least {} characters",
                MIN_APP_KEY_LEN
            )));
        }
        Ok(Self(key.as_bytes().to_vec()))
    }

    pub fn seal(&self, project: &str, name: &str, value: &SecretValue) -> Result<String> {
        let tag = self.tag(project, name, value.as_bytes())?;
        Ok(format!("{}.{}", hex::encode(value.as_bytes()), hex::encode(tag)))
    }

    pub fn open(&self, project: &str, name: &str, sealed: &str) -> Result<SecretValue> {
        let (value_hex, tag_hex) = sealed
            .split_once('.')
            .ok_or_else(|| Error::InvalidInput(format!("secret {} is not sealed", name)))?;
        let value = hex::decode(value_hex)
            .map_err(|e| Error::InvalidInput(format!("secret {}: {}", name, e)))?;
        let tag = hex::decode(tag_hex)
            .map_err(|e| Error::InvalidInput(format!("secret {}: {}", name, e)))?;

        let mac = self.mac(project, name, &value)?;
        mac.verify_slice(&tag).map_err(|_| {
            Error::InvalidInput(format!(
                "secret {} of project {} failed verification",
                name, project
            ))
        })?;
        Ok(SecretValue(value))
    }

    fn tag(&self, project: &str, name: &str, value: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mac(project, name, value)?.finalize().into_bytes().to_vec())
    }

    fn mac(&self, project: &str, name: &str, value: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.0)
            .map_err(|e| Error::Internal(format!("invalid application key: {}", e)))?;
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for part in [project.as_bytes(), name.as_bytes(), value] {
            mac.update(&(part.len() as u64).to_be_bytes());
            mac.update(part);
        }
        Ok(mac)
    }
}

impl fmt::Debug for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplicationKey(<redacted>)")
    }
}
