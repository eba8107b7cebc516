//! Key material: generation, canonical encoding and validation
//!
//! A key is 32 bytes drawn from the operating system CSPRNG. Its canonical
//! encoding is the raw bytes with no check value; the armored text form
//! (`keyseal-key1:` + base64url) is accepted by [`Key::load`] as well.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{ErrorCategory, ErrorKind, KeysealError, Result};
use crate::varmor::{self, ArmorKind};

/// Length of a key in bytes (XChaCha20-Poly1305 key size)
pub const KEY_LEN: usize = 32;

/// Symmetric key for sealing and opening messages.
///
/// Key bytes are wiped when the key is dropped and never appear in `Debug`
/// output. Equality is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    bytes: [u8; KEY_LEN],
}

impl Key {
    /// Generate a fresh random key.
    ///
    /// A failing random source is reported as [`ErrorKind::RandomSource`].
    /// That error is fatal: callers must abort rather than retry.
    pub fn generate() -> Result<Key> {
        let mut bytes = [0u8; KEY_LEN];
        fill_random(&mut bytes)?;
        let key = Key { bytes };
        bytes.zeroize();
        Ok(key)
    }

    /// Validate and load a key from its serialized form.
    ///
    /// Accepts exactly [`KEY_LEN`] raw bytes, or the armored text form.
    pub fn load(bytes: &[u8]) -> Result<Key> {
        if varmor::looks_armored(ArmorKind::Key, bytes) {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                KeysealError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::InvalidKeyFormat,
                    "armored key is not valid UTF-8",
                    e,
                )
            })?;
            let raw = Zeroizing::new(varmor::unwrap(ArmorKind::Key, text)?);
            return Self::from_raw(&raw);
        }
        Self::from_raw(bytes)
    }

    fn from_raw(bytes: &[u8]) -> Result<Key> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            KeysealError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidKeyFormat,
                format!(
                    "invalid key length: expected {} bytes, got {}",
                    KEY_LEN,
                    bytes.len()
                ),
            )
        })?;
        Ok(Key { bytes })
    }

    /// Canonical encoding consumed by [`Key::load`].
    pub fn serialize(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.bytes.to_vec())
    }

    /// Armored text encoding, also accepted by [`Key::load`].
    pub fn to_armored(&self) -> Zeroizing<String> {
        Zeroizing::new(varmor::wrap(ArmorKind::Key, &self.bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key([REDACTED])")
    }
}

/// Fill `buf` from the operating system random source.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        KeysealError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::RandomSource,
            "operating system random source failed",
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let k1 = Key::generate().unwrap();
        let k2 = Key::generate().unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_serialize_load_roundtrip() {
        let key = Key::generate().unwrap();
        let serialized = key.serialize();
        assert_eq!(serialized.len(), KEY_LEN);

        let loaded = Key::load(&serialized).unwrap();
        assert_eq!(loaded, key);
        assert_eq!(loaded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let key = Key::generate().unwrap();
        assert_eq!(*key.serialize(), *key.serialize());
    }

    #[test]
    fn test_armored_roundtrip() {
        let key = Key::generate().unwrap();
        let armored = key.to_armored();
        assert!(armored.starts_with("keyseal-key1:"));

        let loaded = Key::load(armored.as_bytes()).unwrap();
        assert_eq!(loaded, key);
    }

    #[test]
    fn test_all_zero_key_is_valid() {
        let key = Key::load(&[0u8; KEY_LEN]).unwrap();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        for len in [0, 1, KEY_LEN - 1, KEY_LEN + 1, 64] {
            let err = Key::load(&vec![7u8; len]).expect_err("wrong length must be rejected");
            assert_eq!(err.kind, Some(ErrorKind::InvalidKeyFormat));
            assert_eq!(err.category, ErrorCategory::User);
        }
    }

    #[test]
    fn test_armored_key_with_wrong_length_rejected() {
        let armored = varmor::wrap(ArmorKind::Key, &[1u8; 16]);
        let err = Key::load(armored.as_bytes()).expect_err("short armored key");
        assert_eq!(err.kind, Some(ErrorKind::InvalidKeyFormat));
    }

    #[test]
    fn test_armored_key_bad_base64_rejected() {
        let err = Key::load(b"keyseal-key1:not base64!").expect_err("bad base64");
        assert_eq!(err.kind, Some(ErrorKind::InvalidKeyFormat));
    }

    #[test]
    fn test_equality() {
        let a = Key::load(&[3u8; KEY_LEN]).unwrap();
        let b = Key::load(&[3u8; KEY_LEN]).unwrap();
        let mut last_differs = [3u8; KEY_LEN];
        last_differs[KEY_LEN - 1] = 4;
        let c = Key::load(&last_differs).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_debug_redacts_key_bytes() {
        let key = Key::load(&[0xAB; KEY_LEN]).unwrap();
        let debug = format!("{:?}", key);
        assert_eq!(debug, "Key([REDACTED])");
        assert!(!debug.contains("171"));
    }
}
