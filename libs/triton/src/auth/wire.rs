//! SSH wire values used by the agent client, on top of `ssh-encoding`.

use ssh_encoding::{Decode, Encode};
use ssh_key::Mpint;

use super::AuthError;

impl From<ssh_encoding::Error> for AuthError {
    fn from(err: ssh_encoding::Error) -> Self {
        AuthError::Protocol(err.to_string())
    }
}

impl From<ssh_key::Error> for AuthError {
    fn from(err: ssh_key::Error) -> Self {
        AuthError::Protocol(err.to_string())
    }
}

/// Append a length-prefixed byte string.
pub(crate) fn put_string(out: &mut Vec<u8>, value: &[u8]) -> Result<(), AuthError> {
    value.encode(out)?;
    Ok(())
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) -> Result<(), AuthError> {
    value.encode(out)?;
    Ok(())
}

/// Key type name at the start of a public key blob.
pub(crate) fn key_type(blob: &[u8]) -> Result<String, AuthError> {
    let mut reader = blob;
    Ok(String::decode(&mut reader)?)
}

/// Re-encode an SSH ECDSA signature blob (`mpint r, mpint s`) as ASN.1 DER.
pub(crate) fn ecdsa_to_der(format: &str, blob: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut reader = blob;
    let r = Mpint::decode(&mut reader)?;
    let s = Mpint::decode(&mut reader)?;

    let invalid = |e: p256::ecdsa::Error| AuthError::Protocol(format!("invalid ECDSA signature: {e}"));
    let der = match format {
        "ecdsa-sha2-nistp256" => p256::ecdsa::Signature::from_scalars(
            p256::FieldBytes::clone_from_slice(&scalar(&r, 32)?),
            p256::FieldBytes::clone_from_slice(&scalar(&s, 32)?),
        )
        .map_err(invalid)?
        .to_der()
        .as_bytes()
        .to_vec(),
        "ecdsa-sha2-nistp384" => p384::ecdsa::Signature::from_scalars(
            p384::FieldBytes::clone_from_slice(&scalar(&r, 48)?),
            p384::FieldBytes::clone_from_slice(&scalar(&s, 48)?),
        )
        .map_err(invalid)?
        .to_der()
        .as_bytes()
        .to_vec(),
        "ecdsa-sha2-nistp521" => p521::ecdsa::Signature::from_scalars(
            p521::FieldBytes::clone_from_slice(&scalar(&r, 66)?),
            p521::FieldBytes::clone_from_slice(&scalar(&s, 66)?),
        )
        .map_err(invalid)?
        .to_der()
        .as_bytes()
        .to_vec(),
        other => return Err(AuthError::UnsupportedKey(other.to_string())),
    };
    Ok(der)
}

/// Left-pad a positive mpint to the curve's field size.
fn scalar(value: &Mpint, size: usize) -> Result<Vec<u8>, AuthError> {
    let bytes = value
        .as_positive_bytes()
        .ok_or_else(|| AuthError::Protocol("negative ECDSA scalar".to_string()))?;
    if bytes.len() > size {
        return Err(AuthError::Protocol(format!(
            "ECDSA scalar longer than {size} bytes"
        )));
    }
    let mut padded = vec![0u8; size - bytes.len()];
    padded.extend_from_slice(bytes);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;

    fn mpint(bytes: &[u8]) -> Vec<u8> {
        let trimmed: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
        let mut value = Vec::new();
        if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
            value.push(0);
        }
        value.extend_from_slice(&trimmed);
        value
    }

    #[test]
    fn test_string_encoding() {
        let mut buf = Vec::new();
        put_string(&mut buf, b"ssh-ed25519").unwrap();
        put_u32(&mut buf, 7).unwrap();

        assert_eq!(&buf[..4], &[0, 0, 0, 11]);
        assert_eq!(key_type(&buf).unwrap(), "ssh-ed25519");
        assert_eq!(&buf[15..], &[0, 0, 0, 7]);
    }

    #[test]
    fn test_truncated_key_type() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 10).unwrap();
        buf.extend_from_slice(b"short");

        assert!(matches!(key_type(&buf), Err(AuthError::Protocol(_))));
    }

    #[test]
    fn test_ecdsa_to_der_matches_curve_encoding() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let signature: p256::ecdsa::Signature = key.sign(b"date: now");
        let (r, s) = signature.split_bytes();

        let mut blob = Vec::new();
        put_string(&mut blob, &mpint(&r)).unwrap();
        put_string(&mut blob, &mpint(&s)).unwrap();

        let der = ecdsa_to_der("ecdsa-sha2-nistp256", &blob).unwrap();
        assert_eq!(der, signature.to_der().as_bytes());
    }

    #[test]
    fn test_ecdsa_to_der_rejects_oversized_scalar() {
        let mut blob = Vec::new();
        put_string(&mut blob, &[0x01; 40]).unwrap();
        put_string(&mut blob, &[0x01]).unwrap();

        assert!(ecdsa_to_der("ecdsa-sha2-nistp256", &blob).is_err());
    }
}
