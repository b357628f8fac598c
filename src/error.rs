//! Error types for manifest processing and JAR verification.

use std::io;

/// Errors raised while reading manifests or verifying archive content.
///
/// `SignatureMetadata` never escapes the entry-streaming API: the verifier
/// logs it and treats the affected signer as absent. `DigestMismatch` and
/// `MissingDigest` on streamed entry content are security failures and are
/// always surfaced.
#[derive(Debug, thiserror::Error)]
pub enum JarError {
    /// Attribute name is empty, longer than 70 bytes, or uses characters
    /// outside `[0-9a-zA-Z_-]`.
    #[error("invalid attribute name: {name:?}")]
    InvalidName { name: String },

    /// Manifest text could not be parsed.
    #[error("malformed manifest at line {line}: {reason}")]
    MalformedManifest { line: usize, reason: String },

    /// A `.SF` file or signature block could not be parsed or verified.
    #[error("signature metadata error in {file}: {reason}")]
    SignatureMetadata { file: String, reason: String },

    /// Computed digest does not match the asserted one.
    #[error("{algorithm} digest mismatch for {entry}")]
    DigestMismatch { entry: String, algorithm: String },

    /// A signed entry has no usable digest in the manifest.
    #[error("digest missing for {entry}")]
    MissingDigest { entry: String },

    /// A name listed by the archive cannot be resolved to an entry.
    #[error("corrupted archive: entry {name} is listed but cannot be read")]
    CorruptedArchive { name: String },

    /// An entry is larger than the configured read limit.
    #[error("{name} exceeds the limit of {limit} bytes")]
    TooLarge { name: String, limit: u64 },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JarError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata(file: &str, reason: impl Into<String>) -> Self {
        Self::SignatureMetadata {
            file: file.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the content itself cannot be trusted.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            Self::DigestMismatch { .. } | Self::MissingDigest { .. } | Self::CorruptedArchive { .. }
        )
    }

    /// Recover a `JarError` that was carried through an `io::Error`, as
    /// returned by `VerifierStream::read`.
    pub fn from_io(err: &io::Error) -> Option<&JarError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<JarError>())
    }

    /// Owned counterpart of [`JarError::from_io`]; any other I/O error
    /// becomes [`JarError::Io`].
    pub fn from_io_error(err: io::Error) -> JarError {
        if Self::from_io(&err).is_none() {
            return JarError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<JarError>()) {
            Some(Ok(jar)) => *jar,
            _ => JarError::Io(kind.into()),
        }
    }
}

impl From<JarError> for io::Error {
    fn from(err: JarError) -> Self {
        match err {
            JarError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for jar operations.
pub type JarResult<T> = Result<T, JarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_failures_are_classified() {
        let mismatch = JarError::DigestMismatch {
            entry: "a.class".into(),
            algorithm: "SHA-256".into(),
        };
        assert!(mismatch.is_security_failure());
        assert!(!JarError::metadata("META-INF/A.SF", "bad").is_security_failure());
        assert!(!JarError::malformed(3, "no colon").is_security_failure());
        assert!(!JarError::TooLarge {
            name: "big.bin".into(),
            limit: 1,
        }
        .is_security_failure());
    }

    #[test]
    fn survives_io_round_trip() {
        let err: io::Error = JarError::MissingDigest {
            entry: "x".into(),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            JarError::from_io(&err),
            Some(JarError::MissingDigest { entry }) if entry == "x"
        ));

        let plain = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(JarError::from_io(&plain).is_none());

        assert!(matches!(JarError::from_io_error(err), JarError::MissingDigest { .. }));
        assert!(matches!(JarError::from_io_error(plain), JarError::Io(e) if e.kind() == io::ErrorKind::NotFound));
    }
}
