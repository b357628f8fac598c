//! Crypto provider seam.
//!
//! The verifier never parses signature blocks itself. It hands the raw block
//! bytes and the signed `.SF` bytes to a [`CryptoProvider`] and gets back the
//! signer identities, or an error that degrades that signer to "absent".

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{JarError, JarResult};
use crate::hash::DigestAlgorithm;
use crate::jar::identity::{Certificate, CodeSigner};

/// Digest and signature-block primitives used by the verifier.
pub trait CryptoProvider: Send + Sync {
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        algorithm.digest(data)
    }

    /// Verify `block` as a signature over `signed_content` and return the
    /// signer identities it carries.
    fn verify_signature_block(
        &self,
        block_name: &str,
        block: &[u8],
        signed_content: &[u8],
    ) -> JarResult<Vec<CodeSigner>>;
}

/// Signature block file contents (`META-INF/<NAME>.EC`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub version: u32,
    pub algorithm: String,
    /// Signer certificate first, root last.
    pub certificates: Vec<Certificate>,
    /// Base64 Ed25519 signature over the `.SF` bytes.
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<String>,
}

impl SignatureBlock {
    pub const VERSION: u32 = 1;
    pub const ALGORITHM: &'static str = "Ed25519";

    /// Sign `content` with `key`. The first certificate of `chain` must carry
    /// the matching public key for the block to verify.
    pub fn sign(key: &SigningKey, chain: Vec<Certificate>, content: &[u8]) -> Self {
        let signature = key.sign(content);
        Self {
            version: Self::VERSION,
            algorithm: Self::ALGORITHM.to_string(),
            certificates: chain,
            signature: B64.encode(signature.to_bytes()),
            signed_at: Some(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
        }
    }

    pub fn to_bytes(&self) -> JarResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| JarError::metadata("signature block", format!("serialize: {e}")))
    }

    pub fn from_bytes(block_name: &str, bytes: &[u8]) -> JarResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| JarError::metadata(block_name, format!("invalid signature block: {e}")))
    }
}

/// Provider for JSON signature blocks signed with Ed25519.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Provider;

impl CryptoProvider for Ed25519Provider {
    fn verify_signature_block(
        &self,
        block_name: &str,
        block: &[u8],
        signed_content: &[u8],
    ) -> JarResult<Vec<CodeSigner>> {
        let parsed = SignatureBlock::from_bytes(block_name, block)?;

        if parsed.version != SignatureBlock::VERSION {
            return Err(JarError::metadata(
                block_name,
                format!("unsupported block version {}", parsed.version),
            ));
        }
        if !parsed.algorithm.eq_ignore_ascii_case(SignatureBlock::ALGORITHM) {
            return Err(JarError::metadata(
                block_name,
                format!("unsupported algorithm {}", parsed.algorithm),
            ));
        }

        let leaf = parsed
            .certificates
            .first()
            .ok_or_else(|| JarError::metadata(block_name, "empty certificate chain"))?;
        let key = decode_key(block_name, &leaf.public_key)?;
        let signature = decode_signature(block_name, &parsed.signature)?;

        key.verify(signed_content, &signature)
            .map_err(|_| JarError::metadata(block_name, "ed25519 verification failed"))?;

        Ok(vec![CodeSigner::new(parsed.certificates)])
    }
}

fn decode_key(block_name: &str, b64: &str) -> JarResult<VerifyingKey> {
    let bytes = B64
        .decode(b64)
        .map_err(|e| JarError::metadata(block_name, format!("invalid public key base64: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| JarError::metadata(block_name, "public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&array)
        .map_err(|_| JarError::metadata(block_name, "invalid Ed25519 public key"))
}

fn decode_signature(block_name: &str, b64: &str) -> JarResult<Signature> {
    let bytes = B64
        .decode(b64)
        .map_err(|e| JarError::metadata(block_name, format!("invalid signature base64: {e}")))?;
    let array: [u8; 64] = bytes
        .try_into()
        .map_err(|_| JarError::metadata(block_name, "signature must be 64 bytes"))?;
    Ok(Signature::from_bytes(&array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[42u8; 32])
    }

    fn chain(key: &SigningKey) -> Vec<Certificate> {
        vec![Certificate::self_signed("Test Signer", &key.verifying_key())]
    }

    #[test]
    fn signed_block_verifies() {
        let key = key();
        let block = SignatureBlock::sign(&key, chain(&key), b"sf bytes")
            .to_bytes()
            .unwrap();
        let signers = Ed25519Provider
            .verify_signature_block("META-INF/A.EC", &block, b"sf bytes")
            .unwrap();
        assert_eq!(signers.len(), 1);
        assert_eq!(
            signers[0].signer_certificate().unwrap().subject,
            "Test Signer"
        );
    }

    #[test]
    fn altered_content_fails() {
        let key = key();
        let block = SignatureBlock::sign(&key, chain(&key), b"sf bytes")
            .to_bytes()
            .unwrap();
        let err = Ed25519Provider
            .verify_signature_block("META-INF/A.EC", &block, b"sf bytez")
            .unwrap_err();
        assert!(matches!(err, JarError::SignatureMetadata { .. }));
    }

    #[test]
    fn wrong_key_in_chain_fails() {
        let key = key();
        let other = SigningKey::from_bytes(&[7u8; 32]);
        let block = SignatureBlock::sign(&key, chain(&other), b"content")
            .to_bytes()
            .unwrap();
        assert!(Ed25519Provider
            .verify_signature_block("META-INF/A.EC", &block, b"content")
            .is_err());
    }

    #[test]
    fn garbage_block_fails() {
        assert!(Ed25519Provider
            .verify_signature_block("META-INF/A.EC", b"\x30\x82 not json", b"x")
            .is_err());

        let key = key();
        let mut block = SignatureBlock::sign(&key, Vec::new(), b"x");
        assert!(Ed25519Provider
            .verify_signature_block("A", &block.to_bytes().unwrap(), b"x")
            .is_err());
        block.certificates = chain(&key);
        block.algorithm = "RSA".into();
        assert!(Ed25519Provider
            .verify_signature_block("A", &block.to_bytes().unwrap(), b"x")
            .is_err());
    }
}
