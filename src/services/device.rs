//! Device identity resolver
//!
//! Derives a stable, non-reversible device identifier from the opaque
//! client-supplied device token (the `X-Device-ID` header value). The
//! raw token never reaches the database; sessions are scoped by its
//! SHA-256 hash.

use sha2::{Digest, Sha256};

use super::auth::AuthServiceError;

/// Resolve a raw client device identifier to its one-way hash.
///
/// Deterministic lowercase-hex SHA-256. Fails with `MissingDeviceId`
/// when the identifier is absent or empty, since every session-touching
/// flow requires one.
pub fn resolve_device_id(raw: Option<&str>) -> Result<String, AuthServiceError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let raw = raw.ok_or(AuthServiceError::MissingDeviceId)?;

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve_device_id(Some("device-1")).expect("Should resolve");
        let b = resolve_device_id(Some("device-1")).expect("Should resolve");
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_distinguishes_devices() {
        let a = resolve_device_id(Some("device-1")).expect("Should resolve");
        let b = resolve_device_id(Some("device-2")).expect("Should resolve");
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_output_is_hex_sha256() {
        let hash = resolve_device_id(Some("device-1")).expect("Should resolve");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_does_not_leak_raw_id() {
        let hash = resolve_device_id(Some("my-laptop")).expect("Should resolve");
        assert!(!hash.contains("my-laptop"));
    }

    #[test]
    fn test_missing_device_id_fails() {
        assert!(matches!(
            resolve_device_id(None),
            Err(AuthServiceError::MissingDeviceId)
        ));
        assert!(matches!(
            resolve_device_id(Some("")),
            Err(AuthServiceError::MissingDeviceId)
        ));
        assert!(matches!(
            resolve_device_id(Some("   ")),
            Err(AuthServiceError::MissingDeviceId)
        ));
    }
}
