//! Sealing and opening messages with XChaCha20-Poly1305
//!
//! The binary format is:
//! - marker: 1 byte (0x81)
//! - timestamp: 8 bytes (big-endian u64, seconds since the UNIX epoch)
//! - nonce: 24 bytes
//! - ciphertext: same length as the plaintext
//! - tag: 16 bytes (Poly1305)
//!
//! Marker and timestamp are passed as associated data, so every byte of a
//! sealed message is covered by the tag.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key as AeadKey, XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::error::{ErrorCategory, ErrorKind, KeysealError, Result};
use crate::keys::{self, Key};

/// Format marker of the current (and only) version
pub const MARKER: u8 = 0x81;

/// Length of the timestamp field in bytes
const TIMESTAMP_LEN: usize = 8;

/// Length of the authenticated header (marker + timestamp)
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 tag in bytes
pub const TAG_LEN: usize = 16;

/// Bytes a sealed message adds on top of its plaintext
pub const OVERHEAD: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Timestamps this far in the future are still accepted by
/// [`open_with_max_age`].
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Seal plaintext under `key` with a random nonce and the current time
///
/// Returns the binary format: marker(1) + timestamp(8) + nonce(24) + ciphertext + tag(16)
pub fn seal(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    keys::fill_random(&mut nonce)?;

    seal_at(key, plaintext, unix_seconds(SystemTime::now())?, &nonce)
}

/// Seal plaintext with a provided timestamp and nonce
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `seal()` which draws a fresh nonce.
#[doc(hidden)]
pub fn seal_at(
    key: &Key,
    plaintext: &[u8],
    timestamp: u64,
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    header[0] = MARKER;
    header[1..].copy_from_slice(&timestamp.to_be_bytes());

    let cipher = XChaCha20Poly1305::new(AeadKey::from_slice(key.as_bytes()));
    let sealed_box = cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| {
            KeysealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "encryption failed",
                AeadFailure(e),
            )
        })?;

    let mut output = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed_box.len());
    output.extend_from_slice(&header);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box);

    Ok(output)
}

/// Verify and open a sealed message
///
/// No plaintext is returned unless the tag verifies.
pub fn open(key: &Key, sealed: &[u8]) -> Result<Vec<u8>> {
    let parts = SealedParts::parse(sealed)?;

    let cipher = XChaCha20Poly1305::new(AeadKey::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            XNonce::from_slice(parts.nonce),
            Payload {
                msg: parts.sealed_box,
                aad: parts.header,
            },
        )
        .map_err(|_| {
            KeysealError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or wrong key",
            )
        })
}

/// Open a sealed message and reject it if it was sealed more than
/// `max_age` before `now`
///
/// The age check runs only after the tag verifies, so the timestamp it
/// reads is authentic.
pub fn open_with_max_age(
    key: &Key,
    sealed: &[u8],
    max_age: Duration,
    now: SystemTime,
) -> Result<Vec<u8>> {
    let mut plaintext = open(key, sealed)?;

    let sealed_at = timestamp(sealed)?;
    let now = unix_seconds(now)?;
    let too_old = now.saturating_sub(sealed_at) > max_age.as_secs();
    let from_future = sealed_at.saturating_sub(now) > MAX_CLOCK_SKEW.as_secs();

    if too_old || from_future {
        plaintext.zeroize();
        return Err(KeysealError::with_kind(
            ErrorCategory::User,
            ErrorKind::Expired,
            format!(
                "message sealed at {} is outside the accepted age of {}s",
                sealed_at,
                max_age.as_secs()
            ),
        ));
    }

    Ok(plaintext)
}

/// Read the timestamp from a sealed message header
///
/// The value is NOT authenticated by this call; use it for display only.
pub fn timestamp(sealed: &[u8]) -> Result<u64> {
    let parts = SealedParts::parse(sealed)?;
    let bytes: [u8; TIMESTAMP_LEN] = parts.header[1..].try_into().map_err(|_| {
        KeysealError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "header has unexpected length",
        )
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Borrowed views of the fields of a sealed message.
struct SealedParts<'a> {
    header: &'a [u8],
    nonce: &'a [u8],
    /// Ciphertext followed by the tag.
    sealed_box: &'a [u8],
}

impl<'a> SealedParts<'a> {
    fn parse(sealed: &'a [u8]) -> Result<Self> {
        if sealed.len() < OVERHEAD {
            return Err(KeysealError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedMessage,
                format!(
                    "input likely truncated: {} bytes is shorter than the minimum of {}",
                    sealed.len(),
                    OVERHEAD
                ),
            ));
        }

        if sealed[0] != MARKER {
            return Err(KeysealError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedMessage,
                format!("unrecognized format marker 0x{:02x}", sealed[0]),
            ));
        }

        let (header, rest) = sealed.split_at(HEADER_LEN);
        let (nonce, sealed_box) = rest.split_at(NONCE_LEN);
        Ok(SealedParts {
            header,
            nonce,
            sealed_box,
        })
    }
}

fn unix_seconds(time: SystemTime) -> Result<u64> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| {
            KeysealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "system clock is before the UNIX epoch",
                e,
            )
        })
}

/// `aead::Error` does not implement `std::error::Error` without the
/// `std` feature of `aead`; wrap it so it can be kept as a source.
#[derive(Debug, thiserror::Error)]
#[error("AEAD primitive failure")]
struct AeadFailure(chacha20poly1305::aead::Error);
