//! ssh-agent signer.
//!
//! Speaks the agent protocol (draft-miller-ssh-agent) over the Unix socket in
//! `SSH_AUTH_SOCK`. A fresh connection is opened per request.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use md5::Md5;
use sha2::{Digest, Sha256};
use ssh_encoding::Decode;
use tracing::debug;

use super::wire::{ecdsa_to_der, key_type, put_string, put_u32};
use super::{AuthError, Signature};

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
const SSH_AGENT_SIGN_RESPONSE: u8 = 14;

const SSH_AGENT_RSA_SHA2_256: u32 = 2;

/// Largest agent reply accepted.
const MAX_MESSAGE_LEN: usize = 256 * 1024;

/// A key held by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub blob: Vec<u8>,
    pub comment: String,
}

impl AgentIdentity {
    /// OpenSSH-style SHA256 fingerprint (`SHA256:<base64>`).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.blob);
        format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
    }

    /// Legacy MD5 fingerprint (`aa:bb:...`), the usual form of a Triton key id.
    pub fn md5_fingerprint(&self) -> String {
        Md5::digest(&self.blob)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Whether `key_id` names this key.
    ///
    /// Accepts the SHA256 fingerprint, the MD5 fingerprint with or without
    /// its `MD5:` prefix, or the key comment.
    pub fn matches(&self, key_id: &str) -> bool {
        let key_id = key_id.trim();
        if key_id == self.comment || key_id == self.fingerprint() {
            return true;
        }
        let legacy = key_id.strip_prefix("MD5:").unwrap_or(key_id);
        legacy.eq_ignore_ascii_case(&self.md5_fingerprint())
    }
}

/// Signs through an ssh-agent.
#[derive(Debug, Clone)]
pub struct AgentSigner {
    key_id: String,
    socket: PathBuf,
}

impl AgentSigner {
    pub fn new(key_id: impl Into<String>, socket: impl Into<PathBuf>) -> Self {
        Self {
            key_id: key_id.into(),
            socket: socket.into(),
        }
    }

    /// Use the agent in `SSH_AUTH_SOCK`.
    pub fn from_env(key_id: &str) -> Result<Self, AuthError> {
        let socket = std::env::var_os("SSH_AUTH_SOCK")
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::NoAgent)?;
        Ok(Self::new(key_id, socket))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// List the keys the agent holds.
    pub async fn identities(&self) -> Result<Vec<AgentIdentity>, AuthError> {
        let reply = self.request(&[SSH_AGENTC_REQUEST_IDENTITIES]).await?;
        let mut reader = reply.as_slice();

        match u8::decode(&mut reader)? {
            SSH_AGENT_IDENTITIES_ANSWER => {}
            SSH_AGENT_FAILURE => return Err(AuthError::AgentFailure),
            other => {
                return Err(AuthError::Protocol(format!(
                    "unexpected reply {other} to identities request"
                )))
            }
        }

        let count = u32::decode(&mut reader)?;
        let mut identities = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            let blob = Vec::<u8>::decode(&mut reader)?;
            let comment = Vec::<u8>::decode(&mut reader)?;
            identities.push(AgentIdentity {
                blob,
                comment: String::from_utf8_lossy(&comment).into_owned(),
            });
        }
        Ok(identities)
    }

    /// Pick the identity for the configured key id.
    ///
    /// See [`AgentIdentity::matches`]; an agent holding a single key uses
    /// that key.
    pub async fn identity(&self) -> Result<AgentIdentity, AuthError> {
        let mut identities = self.identities().await?;

        if let Some(pos) = identities.iter().position(|i| i.matches(&self.key_id)) {
            return Ok(identities.swap_remove(pos));
        }

        if identities.len() == 1 {
            return identities
                .pop()
                .ok_or_else(|| AuthError::NoIdentity(self.key_id.clone()));
        }

        Err(AuthError::NoIdentity(self.key_id.clone()))
    }

    pub async fn sign(&self, data: &[u8]) -> Result<Signature, AuthError> {
        let identity = self.identity().await?;
        let kind = key_type(&identity.blob)?;
        let flags = if kind == "ssh-rsa" {
            SSH_AGENT_RSA_SHA2_256
        } else {
            0
        };
        debug!(key_type = %kind, comment = %identity.comment, "Signing with ssh-agent");

        let mut message = vec![SSH_AGENTC_SIGN_REQUEST];
        put_string(&mut message, &identity.blob)?;
        put_string(&mut message, data)?;
        put_u32(&mut message, flags)?;

        let reply = self.request(&message).await?;
        let mut reader = reply.as_slice();
        match u8::decode(&mut reader)? {
            SSH_AGENT_SIGN_RESPONSE => {}
            SSH_AGENT_FAILURE => return Err(AuthError::AgentFailure),
            other => {
                return Err(AuthError::Protocol(format!(
                    "unexpected reply {other} to sign request"
                )))
            }
        }

        let signature = Vec::<u8>::decode(&mut reader)?;
        let mut signature = signature.as_slice();
        let format = String::decode(&mut signature)?;
        let raw = Vec::<u8>::decode(&mut signature)?;

        let (algorithm, bytes) = match format.as_str() {
            "rsa-sha2-256" => ("rsa-sha256", raw),
            "rsa-sha2-512" => ("rsa-sha512", raw),
            "ssh-rsa" => ("rsa-sha1", raw),
            "ssh-ed25519" => ("ed25519-sha512", raw),
            "ecdsa-sha2-nistp256" => ("ecdsa-sha256", ecdsa_to_der(&format, &raw)?),
            "ecdsa-sha2-nistp384" => ("ecdsa-sha384", ecdsa_to_der(&format, &raw)?),
            "ecdsa-sha2-nistp521" => ("ecdsa-sha512", ecdsa_to_der(&format, &raw)?),
            other => return Err(AuthError::UnsupportedKey(other.to_string())),
        };

        Ok(Signature {
            algorithm: algorithm.to_string(),
            bytes,
        })
    }

    #[cfg(unix)]
    async fn request(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let mut stream = UnixStream::connect(&self.socket).await?;

        let mut framed = Vec::with_capacity(message.len() + 4);
        put_string(&mut framed, message)?;
        stream.write_all(&framed).await?;

        let len = stream.read_u32().await? as usize;
        if len == 0 || len > MAX_MESSAGE_LEN {
            return Err(AuthError::Protocol(format!("invalid reply length {len}")));
        }
        let mut reply = vec![0u8; len];
        stream.read_exact(&mut reply).await?;
        Ok(reply)
    }

    #[cfg(not(unix))]
    async fn request(&self, _message: &[u8]) -> Result<Vec<u8>, AuthError> {
        Err(AuthError::NoAgent)
    }
}
