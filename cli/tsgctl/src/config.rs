//! Configuration binding.
//!
//! Turns raw flag and environment values into the connection settings and
//! the desired state for one reconciliation pass. Every value is validated
//! here, before any request is made.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tsg_reconcile::{CreationSettings, DesiredState};

/// Malformed or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid base64 in {field}: {reason}")]
    InvalidBase64 { field: &'static str, reason: String },

    #[error("{field} is not valid UTF-8 after base64 decoding")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid {field} entry '{entry}': expected key=value")]
    InvalidPair { field: &'static str, entry: String },

    #[error("invalid instance count '{0}': must be a non-negative integer")]
    InvalidCount(String),
}

/// Connection settings for CloudAPI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub url: String,
    pub account: String,
    pub key_id: String,
    /// Decoded key material (inline key text or a key path), if any.
    pub key_material: Option<String>,
}

/// Raw connection values as given on the command line or in `TRITON_*`.
#[derive(Debug, Clone, Default)]
pub struct RawConnection {
    pub url: Option<String>,
    pub account: Option<String>,
    pub key_id: Option<String>,
    pub key_material: Option<String>,
}

impl RawConnection {
    /// Resolve against the process environment.
    pub fn resolve(self) -> Result<Connection, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve, falling back to the legacy `SDC_*` variables through `env`.
    pub fn resolve_with<F>(self, env: F) -> Result<Connection, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, legacy: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| env(legacy).filter(|v| !v.is_empty()))
        };

        let url = pick(self.url, "SDC_URL").ok_or(ConfigError::Missing(
            "CloudAPI URL (--url, TRITON_URL or SDC_URL)",
        ))?;
        let account = pick(self.account, "SDC_ACCOUNT").ok_or(ConfigError::Missing(
            "account (--account, TRITON_ACCOUNT or SDC_ACCOUNT)",
        ))?;
        let key_id = pick(self.key_id, "SDC_KEY_ID").ok_or(ConfigError::Missing(
            "key id (--key-id, TRITON_KEY_ID or SDC_KEY_ID)",
        ))?;

        let key_material = match pick(self.key_material, "SDC_KEY_MATERIAL") {
            Some(encoded) => Some(decode_base64("key material", &encoded)?),
            None => None,
        }
        .filter(|m| !m.is_empty());

        Ok(Connection {
            url,
            account,
            key_id,
            key_material,
        })
    }
}

/// Raw `scale` flag values.
#[derive(Debug, Clone, Default)]
pub struct ScaleConfig {
    pub tsg_name: String,
    pub template_id: String,
    pub count: String,
    pub tags: Vec<String>,
    pub state: Option<String>,
    pub package: Option<String>,
    pub image: Option<String>,
    pub firewall: bool,
    pub networks: Vec<String>,
    /// Base64 `key=value` entries.
    pub metadata: Vec<String>,
    pub affinity: Vec<String>,
    /// Base64 user script.
    pub userdata: Option<String>,
}

impl ScaleConfig {
    /// Resolve into the desired state for `account`.
    pub fn resolve(self, account: &str) -> Result<DesiredState, ConfigError> {
        let template_id = self.template_id.trim().to_string();
        if template_id.is_empty() {
            return Err(ConfigError::Missing("template id (--template-id)"));
        }

        let target_count = parse_count(&self.count)?;
        let tags = parse_pairs("tag", &self.tags)?;
        let metadata = parse_metadata(&self.metadata)?;
        let userdata = match self.userdata.as_deref().filter(|u| !u.is_empty()) {
            Some(encoded) => decode_base64("userdata", encoded)?,
            None => String::new(),
        };

        Ok(DesiredState {
            target_count,
            group_name: self.tsg_name,
            template_id,
            account: account.to_string(),
            creation: CreationSettings {
                firewall: self.firewall,
                networks: non_empty(self.networks),
                affinity: non_empty(self.affinity),
                tags,
                metadata,
                userdata,
                package: self.package.unwrap_or_default(),
                image: self.image.unwrap_or_default(),
                state_filter: self.state.filter(|s| !s.is_empty()),
            },
        })
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Parse the expected instance count.
pub fn parse_count(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidCount(raw.to_string()))
}

/// Decode a standard-alphabet base64 value into a UTF-8 string.
pub fn decode_base64(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| ConfigError::InvalidBase64 {
            field,
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| ConfigError::InvalidUtf8 { field })
}

/// Split `key=value` entries on the first `=`. Later duplicates win.
pub fn parse_pairs<S: AsRef<str>>(
    field: &'static str,
    entries: &[S],
) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut pairs = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        let Some((key, value)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidPair {
                field,
                entry: entry.to_string(),
            });
        };
        if key.is_empty() {
            return Err(ConfigError::InvalidPair {
                field,
                entry: entry.to_string(),
            });
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    Ok(pairs)
}

/// Decode base64 metadata entries, then split each on the first `=`.
pub fn parse_metadata<S: AsRef<str>>(
    entries: &[S],
) -> Result<BTreeMap<String, String>, ConfigError> {
    let decoded = entries
        .iter()
        .map(|entry| decode_base64("metadata", entry.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    parse_pairs("metadata", &decoded)
}
