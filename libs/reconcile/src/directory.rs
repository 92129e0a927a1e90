//! Instance directory interface.
//!
//! The directory is the remote compute API that owns every instance. The
//! reconciler only ever talks to it through this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::desired::{CreationSpec, ListFilter};
use crate::instance::Instance;

/// Errors reported by a directory implementation.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request signing or credential failure.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The API answered with a non-success status.
    #[error("API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl DirectoryError {
    /// Create an API error from response details.
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for 401/403 responses and signing failures.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Remote instance directory.
///
/// Every call is a single request; the reconciler awaits each one before
/// issuing the next.
#[async_trait]
pub trait Directory: Send + Sync {
    /// List instances matching `filter`.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError>;

    /// Create an instance. The directory assigns its id and creation time.
    async fn create(&self, spec: &CreationSpec) -> Result<Instance, DirectoryError>;

    /// Delete an instance.
    async fn delete(&self, id: &str) -> Result<(), DirectoryError>;

    /// Add tags to an instance, keeping its existing tags.
    async fn add_tags(&self, id: &str, tags: &BTreeMap<String, String>)
        -> Result<(), DirectoryError>;
}
