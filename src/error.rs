use std::error::Error as StdError;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Internal is never a guarantee that the error was not caused by the
    /// user, merely that the code cannot tell.
    Internal,

    /// The user provided invalid input or asked for something that cannot
    /// be done (missing file, wrong key, corrupt message).
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Key bytes have the wrong length or an undecodable armored encoding.
    InvalidKeyFormat,
    /// Sealed message is too short, carries an unknown marker, or its
    /// armored encoding cannot be decoded.
    MalformedMessage,
    /// Tag verification failed: wrong key, tampering, or corruption. The
    /// three causes are deliberately indistinguishable.
    AuthenticationFailed,
    /// The message is authentic but older than the caller's maximum age.
    Expired,
    /// A file the operation needs does not exist.
    FileNotFound,
    /// Two paths of one operation refer to the same file, so one artifact
    /// would overwrite another.
    PathConflict,
    /// The operating system random source failed. Callers must abort and
    /// must not retry.
    RandomSource,
    /// Unexpected state reached within keyseal logic.
    InternalInvariant,
    /// Interaction with the filesystem or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct KeysealError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl KeysealError {
    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Error for a failed read of `path`, distinguishing a missing file from
    /// other I/O failures.
    pub fn read_failure(path: &Path, err: io::Error) -> Self {
        let (category, kind) = if err.kind() == io::ErrorKind::NotFound {
            (ErrorCategory::User, ErrorKind::FileNotFound)
        } else {
            (ErrorCategory::Internal, ErrorKind::Io)
        };
        Self::with_kind_and_source(
            category,
            kind,
            format!("failed to read from {}", path.display()),
            err,
        )
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Whether this error carries the given kind tag.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KeysealError>;
