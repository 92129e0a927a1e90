//! HTTP client for the Triton CloudAPI.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, DATE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use tsg_reconcile::{CreationSpec, Directory, DirectoryError, Instance, ListFilter};

use crate::auth::Signer;
use crate::machine::{create_machine_body, list_query, ApiErrorBody, Machine};

/// CloudAPI version range requested.
const API_VERSION: &str = "~8";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for CloudAPI.
#[derive(Debug, Clone)]
pub struct TritonConfig {
    /// CloudAPI endpoint, e.g. `https://us-east-1.api.joyent.com`.
    pub url: String,

    /// Account (login name) owning the instances.
    pub account: String,

    pub timeout: Duration,
}

impl TritonConfig {
    pub fn new(url: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            account: account.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Instance directory backed by CloudAPI machines.
#[derive(Debug)]
pub struct TritonClient {
    client: reqwest::Client,
    base_url: String,
    account: String,
    signer: Signer,
}

impl TritonClient {
    pub fn new(config: &TritonConfig, signer: Signer) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tsg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DirectoryError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            account: config.account.clone(),
            signer,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Build a URL for an account-scoped path.
    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.account, path)
    }

    /// Start a signed request.
    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, DirectoryError> {
        let date = http_date(Utc::now());
        let authorization = self
            .signer
            .authorization(&self.account, &date)
            .await
            .map_err(|e| DirectoryError::Auth(e.to_string()))?;
        let authorization = HeaderValue::from_str(&authorization)
            .map_err(|e| DirectoryError::Auth(format!("invalid authorization header: {e}")))?;

        Ok(self
            .client
            .request(method, self.url(path))
            .header(ACCEPT, "application/json")
            .header("Accept-Version", API_VERSION)
            .header(DATE, date)
            .header(AUTHORIZATION, authorization))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DirectoryError> {
        let response = request.send().await.map_err(transport)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DirectoryError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Directory for TritonClient {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError> {
        let query = list_query(filter);
        debug!(?query, "Listing machines");

        let request = self.request(Method::GET, "/machines").await?.query(&query);
        let machines: Vec<Machine> = self.send_json(request).await?;

        Ok(machines.into_iter().map(Instance::from).collect())
    }

    async fn create(&self, spec: &CreationSpec) -> Result<Instance, DirectoryError> {
        let body = create_machine_body(spec);
        debug!(package = ?spec.package, image = ?spec.image, "Creating machine");

        let request = self.request(Method::POST, "/machines").await?.json(&body);
        let machine: Machine = self.send_json(request).await?;

        Ok(machine.into())
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        debug!(machine_id = %id, "Deleting machine");

        let path = format!("/machines/{}", id);
        let request = self.request(Method::DELETE, &path).await?;
        self.send(request).await?;

        Ok(())
    }

    async fn add_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), DirectoryError> {
        debug!(machine_id = %id, ?tags, "Adding machine tags");

        let path = format!("/machines/{}/tags", id);
        let request = self.request(Method::POST, &path).await?.json(tags);
        self.send(request).await?;

        Ok(())
    }
}

/// Format a timestamp as an RFC 1123 HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn transport(err: reqwest::Error) -> DirectoryError {
    DirectoryError::Transport(err.to_string())
}

async fn api_error(response: Response) -> DirectoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
    let (code, message) = match parsed {
        Some(parsed) if !parsed.message.is_empty() => (parsed.code, parsed.message),
        _ => (
            status.canonical_reason().unwrap_or("Unknown").to_string(),
            body,
        ),
    };

    error!(status = %status, code = %code, message = %message, "CloudAPI request failed");
    DirectoryError::api(status.as_u16(), code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ed25519_dalek::SigningKey;

    use crate::auth::KeyMaterialSigner;

    #[test]
    fn test_http_date() {
        let at = Utc.with_ymd_and_hms(2017, 1, 5, 21, 31, 40).unwrap();
        assert_eq!(http_date(at), "Thu, 05 Jan 2017 21:31:40 GMT");
    }

    #[test]
    fn test_url_building() {
        let signer = Signer::KeyMaterial(KeyMaterialSigner::new(
            "fp",
            SigningKey::from_bytes(&[1u8; 32]),
        ));
        let config = TritonConfig::new("https://cloudapi.example.com/", "acct");
        let client = TritonClient::new(&config, signer).unwrap();

        assert_eq!(
            client.url("/machines"),
            "https://cloudapi.example.com/acct/machines"
        );
    }
}
