//! Request signing for the Triton CloudAPI.
//!
//! CloudAPI authenticates every request with an HTTP Signature over the
//! `Date` header. The signature comes from one of two sources, chosen once at
//! startup:
//!
//! - an ssh-agent holding the account key ([`AgentSigner`])
//! - private key material supplied directly ([`KeyMaterialSigner`])

mod agent;
mod key_material;
pub(crate) mod wire;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

pub use agent::{AgentIdentity, AgentSigner};
pub use key_material::{KeyMaterialSigner, PrivateKey, ED25519_ALGORITHM, RSA_ALGORITHM};

/// Signing errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no ssh-agent available: SSH_AUTH_SOCK is not set")]
    NoAgent,

    #[error("ssh-agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ssh-agent protocol error: {0}")]
    Protocol(String),

    #[error("ssh-agent refused the request")]
    AgentFailure,

    #[error("no key matching '{0}' found in ssh-agent")]
    NoIdentity(String),

    #[error("failed to read key material '{source_name}': {reason}")]
    KeyMaterial { source_name: String, reason: String },

    #[error(
        "failed to read key '{0}': password protected keys are not currently supported. \
         Please decrypt the key prior to use."
    )]
    EncryptedKey(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKey(String),
}

/// A raw signature and the HTTP Signature algorithm label it was made with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: String,
    pub bytes: Vec<u8>,
}

/// Request signer.
#[derive(Debug)]
pub enum Signer {
    Agent(AgentSigner),
    KeyMaterial(KeyMaterialSigner),
}

impl Signer {
    /// Select a signer: key material when given, the ssh-agent otherwise.
    ///
    /// `key_material` is either inline key text or a path to a key file.
    pub fn select(key_id: &str, key_material: Option<&str>) -> Result<Self, AuthError> {
        match key_material.filter(|m| !m.trim().is_empty()) {
            Some(material) => Ok(Self::KeyMaterial(KeyMaterialSigner::from_material(
                key_id, material,
            )?)),
            None => Ok(Self::Agent(AgentSigner::from_env(key_id)?)),
        }
    }

    /// Key id used in the `keyId` signature parameter.
    pub fn key_id(&self) -> &str {
        match self {
            Self::Agent(signer) => signer.key_id(),
            Self::KeyMaterial(signer) => signer.key_id(),
        }
    }

    /// Confirm the signer can sign before any request is made.
    ///
    /// For the agent this resolves the identity named by the key id, so a
    /// missing agent key surfaces as [`AuthError::NoIdentity`] up front.
    pub async fn check(&self) -> Result<(), AuthError> {
        match self {
            Self::Agent(signer) => signer.identity().await.map(|_| ()),
            Self::KeyMaterial(_) => Ok(()),
        }
    }

    pub async fn sign(&self, data: &[u8]) -> Result<Signature, AuthError> {
        match self {
            Self::Agent(signer) => signer.sign(data).await,
            Self::KeyMaterial(signer) => Ok(signer.sign(data)),
        }
    }

    /// Build the `Authorization` header value for a request sent at `date`.
    pub async fn authorization(&self, account: &str, date: &str) -> Result<String, AuthError> {
        let signature = self.sign(signing_string(date).as_bytes()).await?;
        Ok(format!(
            "Signature keyId=\"/{}/keys/{}\",algorithm=\"{}\",headers=\"date\",signature=\"{}\"",
            account,
            self.key_id(),
            signature.algorithm,
            STANDARD.encode(&signature.bytes)
        ))
    }
}

/// The string signed for a request carrying only the `Date` header.
pub fn signing_string(date: &str) -> String {
    format!("date: {}", date)
}
