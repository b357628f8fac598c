// stream.rs - Entry reader that feeds the verifier as bytes are consumed
//
// The stream owns the entry's EntryVerifier. It is finalized exactly once,
// on end-of-stream or when the declared size has been read, whichever comes
// first. Reads never go past the declared size, so every byte handed to the
// caller went through the digest. Dropping or unwrapping the stream early
// never finalizes.

use std::io::{self, Read};
use std::sync::Arc;

use crate::jar::identity::SignerList;
use crate::jar::verifier::{EntryVerifier, JarVerifier};

pub struct VerifierStream<R> {
    inner: R,
    verifier: Option<Arc<JarVerifier>>,
    entry: Option<EntryVerifier>,
    declared_size: Option<u64>,
    bytes_read: u64,
    signers: Option<SignerList>,
}

impl<R: Read> VerifierStream<R> {
    /// Begin `name` on `verifier` and wrap `inner`.
    pub fn new(
        inner: R,
        verifier: Arc<JarVerifier>,
        name: &str,
        is_directory: bool,
        declared_size: Option<u64>,
    ) -> Self {
        let entry = verifier.begin_entry(name, is_directory);
        Self {
            inner,
            verifier: Some(verifier),
            entry: Some(entry),
            declared_size,
            bytes_read: 0,
            signers: None,
        }
    }

    /// A stream with no verification attached, still capped at
    /// `declared_size`.
    pub fn unverified(inner: R, declared_size: Option<u64>) -> Self {
        Self {
            inner,
            verifier: None,
            entry: None,
            declared_size,
            bytes_read: 0,
            signers: None,
        }
    }

    /// Signers of the entry, available once the stream was read to the end
    /// and the content matched.
    pub fn signers(&self) -> Option<&SignerList> {
        self.signers.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.entry.is_none()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn finish(&mut self) -> io::Result<()> {
        let (Some(entry), Some(verifier)) = (self.entry.take(), self.verifier.as_ref()) else {
            return Ok(());
        };
        self.signers = verifier.end_entry(entry)?;
        Ok(())
    }
}

impl<R: Read> Read for VerifierStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let want = match self.declared_size {
            Some(size) => {
                let remaining = size.saturating_sub(self.bytes_read);
                if remaining == 0 {
                    self.finish()?;
                    return Ok(0);
                }
                buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
            }
            None => buf.len(),
        };
        let n = self.inner.read(&mut buf[..want])?;
        self.bytes_read += n as u64;
        if let Some(entry) = self.entry.as_mut() {
            entry.update(&buf[..n]);
        }
        let size_reached = self
            .declared_size
            .is_some_and(|size| self.bytes_read >= size);
        if n == 0 || size_reached {
            self.finish()?;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifyConfig;
    use crate::error::JarError;
    use crate::jar::provider::Ed25519Provider;
    use crate::manifest::Manifest;

    fn unsigned_verifier() -> Arc<JarVerifier> {
        let manifest = Manifest::new();
        let raw: Arc<[u8]> = manifest.to_bytes().into();
        Arc::new(JarVerifier::new(
            Arc::new(manifest),
            raw,
            Arc::new(Ed25519Provider),
            VerifyConfig::default(),
        ))
    }

    #[test]
    fn passes_bytes_through() {
        let v = unsigned_verifier();
        let mut stream = VerifierStream::new(&b"hello world"[..], v.clone(), "a.txt", false, None);
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert!(stream.is_finished());
        assert!(stream.signers().is_none());
        assert!(!v.is_parsing_meta());
    }

    #[test]
    fn finalizes_at_declared_size() {
        let v = unsigned_verifier();
        let mut stream = VerifierStream::new(&b"abcdef"[..], v, "a.txt", false, Some(3));
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        assert!(stream.is_finished());
        // nothing past the declared size is handed out
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(stream.bytes_read(), 3);
        assert_eq!(stream.into_inner(), b"def");
    }

    #[test]
    fn large_buffer_stops_at_declared_size() {
        let v = unsigned_verifier();
        let mut stream = VerifierStream::new(&b"abcdef"[..], v, "a.txt", false, Some(4));
        let mut buf = [0u8; 64];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert!(stream.is_finished());
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_declared_size_finishes_on_first_read() {
        let v = unsigned_verifier();
        let mut stream = VerifierStream::new(&b"xyz"[..], v, "a.txt", false, Some(0));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(stream.is_finished());
    }

    #[test]
    fn unverified_stream_is_capped() {
        let mut stream = VerifierStream::unverified(&b"abcdef"[..], Some(2));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ab");

        let mut open = VerifierStream::unverified(&b"abcdef"[..], None);
        let mut out = Vec::new();
        open.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn dropped_early_is_not_finalized() {
        let v = unsigned_verifier();
        let mut stream = VerifierStream::new(&b"abcdef"[..], v, "a.txt", false, None);
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert!(!stream.is_finished());
        assert_eq!(stream.into_inner(), b"cdef");
    }

    /// Verifier over a signed manifest asserting `x.bin` = "good", with its
    /// signature files already consumed.
    fn signed_verifier() -> Arc<JarVerifier> {
        use crate::hash::{self, DigestAlgorithm};
        use crate::jar::digester::ManifestDigester;
        use crate::jar::identity::Certificate;
        use crate::jar::provider::SignatureBlock;
        use ed25519_dalek::SigningKey;

        let mut manifest = Manifest::new();
        manifest
            .main_attributes_mut()
            .put("Manifest-Version", "1.0")
            .unwrap();
        manifest
            .entry_mut("x.bin")
            .put("SHA-256-Digest", hash::encode_digest(&DigestAlgorithm::Sha256.digest(b"good")))
            .unwrap();
        let raw: Arc<[u8]> = manifest.to_bytes().into();
        let digester = ManifestDigester::new(raw.clone(), Arc::new(Ed25519Provider));

        let mut sf = Manifest::new();
        sf.main_attributes_mut()
            .put("Signature-Version", "1.0")
            .unwrap();
        sf.main_attributes_mut()
            .put(
                "SHA-256-Digest-Manifest",
                hash::encode_digest(&digester.manifest_digest(DigestAlgorithm::Sha256)),
            )
            .unwrap();
        sf.entry_mut("x.bin");
        let sf = sf.to_bytes();
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let chain = vec![Certificate::self_signed("s", &key.verifying_key())];
        let block = SignatureBlock::sign(&key, chain, &sf).to_bytes().unwrap();

        let v = Arc::new(JarVerifier::new(
            Arc::new(manifest),
            raw,
            Arc::new(Ed25519Provider),
            VerifyConfig::default(),
        ));
        for (name, bytes) in [("META-INF/S.SF", &sf), ("META-INF/S.EC", &block)] {
            let mut s = VerifierStream::new(&bytes[..], v.clone(), name, false, None);
            io::copy(&mut s, &mut io::sink()).unwrap();
        }
        v
    }

    #[test]
    fn mismatch_surfaces_as_invalid_data() {
        let v = signed_verifier();

        let mut good = VerifierStream::new(&b"good"[..], v.clone(), "x.bin", false, Some(4));
        io::copy(&mut good, &mut io::sink()).unwrap();
        assert!(good.signers().is_some());

        let mut bad = VerifierStream::new(&b"evil"[..], v, "x.bin", false, Some(4));
        let err = io::copy(&mut bad, &mut io::sink()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            JarError::from_io(&err),
            Some(JarError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_withheld_for_any_buffer_size() {
        let v = signed_verifier();

        for chunk in [1usize, 4, 64] {
            let mut stream =
                VerifierStream::new(&b"goodEVIL"[..], v.clone(), "x.bin", false, Some(4));
            let mut out = Vec::new();
            let mut buf = vec![0u8; chunk];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            assert_eq!(out, b"good", "chunk size {chunk}");
            assert!(stream.signers().is_some(), "chunk size {chunk}");
        }
    }
}
