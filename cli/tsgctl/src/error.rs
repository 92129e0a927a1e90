//! Error display for the CLI.

use colored::Colorize;
use tsg_reconcile::{DirectoryError, ReconcileError};
use tsg_triton::AuthError;

use crate::config::ConfigError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(reconcile_err) = err.downcast_ref::<ReconcileError>() {
        print_partial_progress(reconcile_err);
    }
    if let Some(message) = hint_for(err) {
        hint(message);
    }
}

/// The follow-up advice for an error, if there is any.
fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        return Some(match config_err {
            ConfigError::Missing(_) => {
                "Set it with a flag or the matching TRITON_* environment variable."
            }
            ConfigError::InvalidBase64 { .. } | ConfigError::InvalidUtf8 { .. } => {
                "Metadata, userdata and key material must be standard base64."
            }
            ConfigError::InvalidPair { .. } => "Tags and metadata take the form key=value.",
            ConfigError::InvalidCount(_) => "--count takes a non-negative integer.",
        });
    }

    if let Some(auth_err) = err.downcast_ref::<AuthError>() {
        return match auth_err {
            AuthError::NoAgent => {
                Some("Start an ssh-agent holding your Triton key, or pass --key-material.")
            }
            AuthError::NoIdentity(_) => Some(
                "--key-id must match the key's MD5 fingerprint (aa:bb:...), \
                 SHA256 fingerprint or comment in the agent.",
            ),
            AuthError::UnsupportedKey(_) => {
                Some("Supported keys are RSA, ECDSA (P-256, P-384) and Ed25519.")
            }
            _ => None,
        };
    }

    let directory_err = match err.downcast_ref::<ReconcileError>() {
        Some(reconcile_err) => reconcile_err.directory_error(),
        None => err.downcast_ref::<DirectoryError>()?,
    };
    match directory_err {
        DirectoryError::Auth(_) => {
            Some("The request could not be signed. Check the ssh-agent or --key-material.")
        }
        other if other.is_auth() => {
            Some("CloudAPI rejected the request signature. Check --account and --key-id.")
        }
        DirectoryError::Transport(_) => Some("Check your network connection and --url."),
        _ => None,
    }
}

fn print_partial_progress(err: &ReconcileError) {
    let created = err.created_ids();
    if !created.is_empty() {
        eprintln!("\nInstances created before the failure: {}", created.join(", "));
    }
    if let ReconcileError::Tag { untagged, .. } = err {
        eprintln!("Instance {} was created but has no name tag.", untagged.id);
    }
    let deleted = err.deleted_ids();
    if !deleted.is_empty() {
        eprintln!("\nInstances deleted before the failure: {}", deleted.join(", "));
    }
}

fn hint(message: &str) {
    eprintln!("\n{}", format!("Hint: {message}").yellow());
}
