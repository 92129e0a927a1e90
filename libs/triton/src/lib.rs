//! Triton CloudAPI instance directory.
//!
//! Implements [`tsg_reconcile::Directory`] on top of the CloudAPI machines
//! endpoints:
//!
//! - `GET /{account}/machines` (filtered by `tag.*` and `state`)
//! - `POST /{account}/machines`
//! - `DELETE /{account}/machines/{id}`
//! - `POST /{account}/machines/{id}/tags`
//!
//! Requests are authenticated with HTTP Signatures, see [`auth`].

pub mod auth;
pub mod client;
pub mod machine;

pub use auth::{AgentSigner, AuthError, KeyMaterialSigner, PrivateKey, Signer};
pub use client::{TritonClient, TritonConfig, DEFAULT_TIMEOUT};
