//! Versioned text armor for sealed messages and keys
//!
//! Provides base64url encoding with a version prefix so artifacts can be
//! stored or pasted as text. The armored format is:
//! - Free of whitespace (including newlines)
//! - Safe to embed in URLs
//! - Safe to pass unescaped in a POSIX shell
//!
//! Sealed messages use the `keyseal1:` prefix, keys use `keyseal-key1:`.

use crate::error::{ErrorCategory, ErrorKind, KeysealError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// What an armored string carries. Each kind has its own prefix so a key
/// can never be mistaken for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    Message,
    Key,
}

impl ArmorKind {
    /// Version 1 magic marker.
    fn v1_magic(self) -> &'static str {
        match self {
            ArmorKind::Message => "keyseal1:",
            ArmorKind::Key => "keyseal-key1:",
        }
    }

    /// Prefix shared by all versions.
    fn magic_prefix(self) -> &'static str {
        match self {
            ArmorKind::Message => "keyseal",
            ArmorKind::Key => "keyseal-key",
        }
    }

    fn error_kind(self) -> ErrorKind {
        match self {
            ArmorKind::Message => ErrorKind::MalformedMessage,
            ArmorKind::Key => ErrorKind::InvalidKeyFormat,
        }
    }
}

/// Wrap bytes in armor, returning the armored string
///
/// Format: {magic}{base64url-no-padding}
pub fn wrap(kind: ArmorKind, body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}", kind.v1_magic(), encoded)
}

/// Cheap check whether `data` starts like armor of the given kind, of any
/// version. Used to auto-detect armored files.
pub fn looks_armored(kind: ArmorKind, data: &[u8]) -> bool {
    let prefix = kind.magic_prefix().as_bytes();
    if !data.starts_with(prefix) {
        return false;
    }
    // "keyseal-key1:" also starts with "keyseal"; a message must not have
    // the key prefix.
    match kind {
        ArmorKind::Message => !data.starts_with(ArmorKind::Key.magic_prefix().as_bytes()),
        ArmorKind::Key => true,
    }
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(kind: ArmorKind, armored: &str) -> Result<Vec<u8>> {
    // Trailing newlines are common when armor was pasted into a file.
    let armored = armored.trim_end_matches(['\n', '\r']);
    let magic = kind.v1_magic();

    if armored.len() < magic.len() {
        return Err(KeysealError::with_kind(
            ErrorCategory::User,
            kind.error_kind(),
            "input size smaller than magic marker; likely truncated",
        ));
    }

    if let Some(encoded) = armored.strip_prefix(magic) {
        let body = URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            KeysealError::with_kind_and_source(
                ErrorCategory::User,
                kind.error_kind(),
                format!("base64 decoding failed: {}", e),
                e,
            )
        })?;
        Ok(body)
    } else if looks_armored(kind, armored.as_bytes()) {
        Err(KeysealError::with_kind(
            ErrorCategory::User,
            kind.error_kind(),
            "input claims to be keyseal armor, but not a version we support",
        ))
    } else {
        Err(KeysealError::with_kind(
            ErrorCategory::User,
            kind.error_kind(),
            "input unrecognized as keyseal armor",
        ))
    }
}
