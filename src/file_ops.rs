//! File encryption/decryption operations
//!
//! This module reads whole files, runs them through the key manager and the
//! sealed message codec, and writes the resulting artifacts. Derived artifact
//! names follow the `<stem>_encrypted.<ext>` / `<stem>_key.<ext>` /
//! `<stem>_decrypted.<ext>` convention described by [`Naming`].

use crate::error::{ErrorCategory, ErrorKind, KeysealError, Result};
use crate::keys::Key;
use crate::sealcrypt;
use crate::varmor::{self, ArmorKind};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use zeroize::Zeroizing;

const ENCRYPTED_SUFFIX: &str = "_encrypted";
const KEY_SUFFIX: &str = "_key";
const DECRYPTED_SUFFIX: &str = "_decrypted";

/// Extensions used when deriving artifact paths from an input path.
///
/// Contents are opaque bytes and the original extension of an encrypted
/// file is not recorded anywhere, so `decrypted_ext` cannot be recovered
/// from the sealed file. It defaults to `txt`; set it (or `--decrypted-ext`)
/// to restore anything else, e.g. `png` for images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    pub encrypted_ext: String,
    pub key_ext: String,
    pub decrypted_ext: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            encrypted_ext: "enc".to_string(),
            key_ext: "key".to_string(),
            decrypted_ext: "txt".to_string(),
        }
    }
}

impl Naming {
    /// `<dir>/<stem>_encrypted.<encrypted_ext>`
    pub fn encrypted_path(&self, input: &Path) -> Result<PathBuf> {
        Ok(derived_path(input, file_stem(input)?, ENCRYPTED_SUFFIX, &self.encrypted_ext))
    }

    /// `<dir>/<stem>_key.<key_ext>`
    pub fn key_path(&self, input: &Path) -> Result<PathBuf> {
        Ok(derived_path(input, file_stem(input)?, KEY_SUFFIX, &self.key_ext))
    }

    /// `<dir>/<stem>_decrypted.<decrypted_ext>`, where a trailing
    /// `_encrypted` is first stripped from the stem.
    pub fn decrypted_path(&self, sealed: &Path) -> Result<PathBuf> {
        let stem = file_stem(sealed)?;
        let stem = stem
            .to_str()
            .and_then(|s| s.strip_suffix(ENCRYPTED_SUFFIX))
            .filter(|s| !s.is_empty())
            .map(OsStr::new)
            .unwrap_or(stem);
        Ok(derived_path(sealed, stem, DECRYPTED_SUFFIX, &self.decrypted_ext))
    }
}

/// Options for [`encrypt_file`].
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    pub naming: Naming,
    /// Write both artifacts as base64url text armor instead of raw bytes.
    pub armor: bool,
}

/// Options for [`decrypt_file`].
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    pub naming: Naming,
    /// Reject authentic messages sealed longer ago than this.
    pub max_age: Option<Duration>,
}

/// Paths written by a successful [`encrypt_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedArtifacts {
    pub sealed: PathBuf,
    pub key: PathBuf,
}

/// Encrypt a file under a freshly generated key
///
/// Reads plaintext from `input` and writes the sealed message and the key to
/// the paths derived by `options.naming`, next to the input.
pub fn encrypt_file(input: &Path, options: &EncryptOptions) -> Result<EncryptedArtifacts> {
    let artifacts = EncryptedArtifacts {
        sealed: options.naming.encrypted_path(input)?,
        key: options.naming.key_path(input)?,
    };
    encrypt_file_to(input, &artifacts.sealed, &artifacts.key, options.armor)?;
    Ok(artifacts)
}

/// Encrypt a file, writing the sealed message to `sealed_out` and the key to
/// `key_out`
///
/// Output files are created with mode 0o600 (read/write for owner only) on
/// Unix systems. The key file is only written once the sealed file is in
/// place.
pub fn encrypt_file_to(
    input: &Path,
    sealed_out: &Path,
    key_out: &Path,
    armor: bool,
) -> Result<()> {
    encrypt_with_progress(input, sealed_out, key_out, armor, &mut |_| {})
}

/// Decrypt a file with the key stored at `key_path`
///
/// The plaintext is written to the path derived by `options.naming`, which is
/// returned.
pub fn decrypt_file(input: &Path, key_path: &Path, options: &DecryptOptions) -> Result<PathBuf> {
    let output = options.naming.decrypted_path(input)?;
    decrypt_file_to(input, key_path, &output, options.max_age)?;
    Ok(output)
}

/// Decrypt a file with the key stored at `key_path`, writing the plaintext to
/// `output`
///
/// Armored input and armored keys are detected automatically. Nothing is
/// written unless the message authenticates.
pub fn decrypt_file_to(
    input: &Path,
    key_path: &Path,
    output: &Path,
    max_age: Option<Duration>,
) -> Result<()> {
    decrypt_with_progress(input, key_path, output, max_age, &mut |_| {})
}

pub(crate) fn encrypt_with_progress(
    input: &Path,
    sealed_out: &Path,
    key_out: &Path,
    armor: bool,
    progress: &mut dyn FnMut(u8),
) -> Result<()> {
    ensure_distinct(&[
        ("input", input),
        ("sealed output", sealed_out),
        ("key output", key_out),
    ])?;
    progress(10);
    debug!(input = %input.display(), "reading plaintext");
    let plaintext =
        Zeroizing::new(fs::read(input).map_err(|e| KeysealError::read_failure(input, e))?);
    progress(30);

    let key = Key::generate().map_err(|e| e.with_context("key generation failed"))?;
    let sealed =
        sealcrypt::seal(&key, &plaintext).map_err(|e| e.with_context("encryption failed"))?;
    debug!(
        plaintext_len = plaintext.len(),
        sealed_len = sealed.len(),
        "sealed plaintext"
    );
    progress(60);

    let sealed_written = if armor {
        write_file_secure(sealed_out, varmor::wrap(ArmorKind::Message, &sealed).as_bytes())
    } else {
        write_file_secure(sealed_out, &sealed)
    };
    sealed_written
        .map_err(|e| e.with_context(format!("failed to write to {}", sealed_out.display())))?;

    let key_written = if armor {
        write_file_secure(key_out, key.to_armored().as_bytes())
    } else {
        write_file_secure(key_out, &key.serialize())
    };
    if let Err(e) = key_written {
        // Without its key the sealed file is useless.
        if let Err(remove_err) = fs::remove_file(sealed_out) {
            debug!(error = %remove_err, "failed to remove orphaned sealed file");
        }
        return Err(e.with_context(format!("failed to write key to {}", key_out.display())));
    }

    info!(
        sealed = %sealed_out.display(),
        key = %key_out.display(),
        "encrypted file"
    );
    progress(100);
    Ok(())
}

pub(crate) fn decrypt_with_progress(
    input: &Path,
    key_path: &Path,
    output: &Path,
    max_age: Option<Duration>,
    progress: &mut dyn FnMut(u8),
) -> Result<()> {
    ensure_distinct(&[("input", input), ("key", key_path), ("output", output)])?;
    progress(10);
    debug!(input = %input.display(), "reading sealed message");
    let raw = fs::read(input).map_err(|e| KeysealError::read_failure(input, e))?;
    let sealed = if varmor::looks_armored(ArmorKind::Message, &raw) {
        let text = String::from_utf8(raw).map_err(|e| {
            KeysealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedMessage,
                "armored input file is not valid UTF-8",
                e,
            )
        })?;
        varmor::unwrap(ArmorKind::Message, &text)
            .map_err(|e| e.with_context("failed to unarmor"))?
    } else {
        raw
    };

    debug!(key = %key_path.display(), "reading key");
    let key_bytes =
        Zeroizing::new(fs::read(key_path).map_err(|e| KeysealError::read_failure(key_path, e))?);
    let key = Key::load(&key_bytes)
        .map_err(|e| e.with_context(format!("invalid key file {}", key_path.display())))?;
    progress(30);

    let plaintext = match max_age {
        Some(max_age) => sealcrypt::open_with_max_age(&key, &sealed, max_age, SystemTime::now()),
        None => sealcrypt::open(&key, &sealed),
    }
    .map(Zeroizing::new)
    .map_err(|e| e.with_context("failed to decrypt"))?;
    progress(60);

    write_file_secure(output, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;

    info!(output = %output.display(), "decrypted file");
    progress(100);
    Ok(())
}

/// Fail with [`ErrorKind::PathConflict`] if any two of `paths` name the same
/// file. Runs before anything is read or written.
fn ensure_distinct(paths: &[(&str, &Path)]) -> Result<()> {
    let resolved: Vec<PathBuf> = paths.iter().map(|(_, p)| resolve(p)).collect();
    for i in 0..paths.len() {
        for j in i + 1..paths.len() {
            if resolved[i] == resolved[j] {
                return Err(KeysealError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PathConflict,
                    format!(
                        "{} and {} are the same file: {}",
                        paths[i].0,
                        paths[j].0,
                        paths[j].1.display()
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Best-effort absolute form of `path`. Files that do not exist yet are
/// resolved through their parent directory.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn file_stem(path: &Path) -> Result<&OsStr> {
    path.file_stem().ok_or_else(|| {
        KeysealError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("{} has no file name", path.display()),
        )
    })
}

fn derived_path(input: &Path, stem: &OsStr, suffix: &str, ext: &str) -> PathBuf {
    let mut name = OsString::from(stem);
    name.push(suffix);
    if !ext.is_empty() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Atomically write a file with secure permissions (0o600 on Unix)
///
/// Contents go to a tempfile in the target directory, which is flushed,
/// synced and renamed into place, so a reader sees either the old file or
/// the complete new one.
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_failure(e, format!("failed to create tempfile in {}", dir.display())))?;

    temp_file
        .write_all(contents)
        .map_err(|e| io_failure(e, "failed to write to tempfile"))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_failure(e, "failed to flush tempfile"))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_failure(e, "failed to sync file prior to rename"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| io_failure(e, "failed to get tempfile metadata"))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| io_failure(e, "failed to set tempfile permissions"))?;
    }

    temp_file.persist(path).map_err(|e| {
        KeysealError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn io_failure(err: io::Error, msg: impl Into<String>) -> KeysealError {
    let (category, kind) = match err.kind() {
        io::ErrorKind::NotFound => (ErrorCategory::User, ErrorKind::FileNotFound),
        io::ErrorKind::PermissionDenied => (ErrorCategory::User, ErrorKind::Io),
        _ => (ErrorCategory::Internal, ErrorKind::Io),
    };
    KeysealError::with_kind_and_source(category, kind, msg, err)
}
