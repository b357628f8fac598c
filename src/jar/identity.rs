use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::hash;

/// One certificate in a signer's chain.
///
/// Chain validation policy is left to the caller; this type only carries the
/// identity and the key the signature block was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    /// Base64 Ed25519 public key.
    pub public_key: String,
}

impl Certificate {
    pub fn self_signed(subject: impl Into<String>, key: &VerifyingKey) -> Self {
        let subject = subject.into();
        Self {
            issuer: subject.clone(),
            subject,
            public_key: B64.encode(key.to_bytes()),
        }
    }

    /// SHA-256 hex fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        match B64.decode(&self.public_key) {
            Ok(bytes) => hash::sha256_hex(&bytes),
            Err(_) => hash::sha256_hex(self.public_key.as_bytes()),
        }
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CN={} (issuer {})", self.subject, self.issuer)
    }
}

/// A signer identity: certificate chain with the signer first, root last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeSigner {
    chain: Vec<Certificate>,
}

impl CodeSigner {
    pub fn new(chain: Vec<Certificate>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn signer_certificate(&self) -> Option<&Certificate> {
        self.chain.first()
    }
}

/// Signers of one entry, shared between the verifier and its callers.
pub type SignerList = Arc<[CodeSigner]>;

/// Concatenate every signer's chain.
pub fn flatten_certificates(signers: &[CodeSigner]) -> Vec<Certificate> {
    signers
        .iter()
        .flat_map(|s| s.chain.iter().cloned())
        .collect()
}

/// Union of two signer lists, keeping first-seen order.
pub(crate) fn merge_signers(existing: Option<&SignerList>, new: &SignerList) -> SignerList {
    match existing {
        None => new.clone(),
        Some(old) if new.iter().all(|s| old.contains(s)) => old.clone(),
        Some(old) => {
            let mut merged: Vec<CodeSigner> = old.to_vec();
            for signer in new.iter() {
                if !merged.contains(signer) {
                    merged.push(signer.clone());
                }
            }
            merged.into()
        }
    }
}

/// Whether two signer lists hold the same signers, ignoring order.
pub fn same_signers(a: &[CodeSigner], b: &[CodeSigner]) -> bool {
    a.iter().all(|s| b.contains(s)) && b.iter().all(|s| a.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn signer(subject: &str, seed: u8) -> CodeSigner {
        let key = SigningKey::from_bytes(&[seed; 32]);
        CodeSigner::new(vec![Certificate::self_signed(subject, &key.verifying_key())])
    }

    #[test]
    fn merge_keeps_order_and_dedups() {
        let a: SignerList = vec![signer("a", 1)].into();
        let b: SignerList = vec![signer("b", 2), signer("a", 1)].into();
        let merged = merge_signers(Some(&a), &b);
        let subjects: Vec<_> = merged
            .iter()
            .map(|s| s.signer_certificate().unwrap().subject.as_str())
            .collect();
        assert_eq!(subjects, ["a", "b"]);

        let same = merge_signers(Some(&merged), &a);
        assert!(Arc::ptr_eq(&same, &merged));
    }

    #[test]
    fn flatten_concatenates_chains() {
        let mut first = signer("leaf", 3).chain().to_vec();
        first.push(signer("root", 4).chain()[0].clone());
        let signers = vec![CodeSigner::new(first), signer("other", 5)];
        let certs = flatten_certificates(&signers);
        assert_eq!(certs.len(), 3);
        assert_eq!(certs[2].subject, "other");
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let cert = signer("x", 9).chain()[0].clone();
        let fp = cert.fingerprint();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, cert.clone().fingerprint());
    }

    #[test]
    fn same_signers_ignores_order() {
        let a = vec![signer("a", 1), signer("b", 2)];
        let b = vec![signer("b", 2), signer("a", 1)];
        assert!(same_signers(&a, &b));
        assert!(!same_signers(&a, &b[..1]));
    }
}
