//! Verification of one signature file (`.SF`) and its signature block.
//!
//! The block's signature covers the `.SF` bytes, and the `.SF` in turn
//! asserts digests of the manifest (whole, main section, or per-entry
//! sections). A signer is credited for an entry only when both links hold.

use std::collections::HashMap;

use crate::error::{JarError, JarResult};
use crate::hash::{self, DigestAlgorithm};
use crate::jar::digester::ManifestDigester;
use crate::jar::identity::{merge_signers, SignerList};
use crate::jar::provider::CryptoProvider;
use crate::manifest::{codec, Attributes, AttributeName, MANIFEST_NAME};

const DIGEST_SUFFIX: &str = "-Digest";
const MANIFEST_DIGEST_SUFFIX: &str = "-Digest-Manifest";
const MAIN_ATTRS_DIGEST_SUFFIX: &str = "-Digest-Manifest-Main-Attributes";

/// Block file extensions, upper-cased.
pub const BLOCK_EXTENSIONS: [&str; 3] = [".DSA", ".RSA", ".EC"];

/// Whether an upper-cased entry name is a `.SF` file or a signature block.
pub fn is_block_or_sf(upper_name: &str) -> bool {
    upper_name.ends_with(".SF") || BLOCK_EXTENSIONS.iter().any(|ext| upper_name.ends_with(ext))
}

/// Name without its extension: `META-INF/SIGNER.EC` -> `META-INF/SIGNER`.
pub fn base_name(upper_name: &str) -> &str {
    upper_name
        .rfind('.')
        .map_or(upper_name, |dot| &upper_name[..dot])
}

/// Strip a leading `./` and then a leading `/`.
pub fn normalize_entry_name(name: &str) -> &str {
    let name = name.strip_prefix("./").unwrap_or(name);
    name.strip_prefix('/').unwrap_or(name)
}

/// One signature block waiting for (or holding) its `.SF` bytes.
#[derive(Debug)]
pub struct SignatureFileVerifier {
    block_name: String,
    base_name: String,
    block: Vec<u8>,
    sf_bytes: Option<Vec<u8>>,
}

impl SignatureFileVerifier {
    /// `block_name` is the upper-cased archive name of the block file.
    pub fn new(block_name: &str, block: Vec<u8>) -> Self {
        Self {
            block_name: block_name.to_string(),
            base_name: base_name(block_name).to_string(),
            block,
            sf_bytes: None,
        }
    }

    pub fn block_name(&self) -> &str {
        &self.block_name
    }

    pub fn needs_signature_file_bytes(&self) -> bool {
        self.sf_bytes.is_none()
    }

    /// Whether this block is still waiting for the `.SF` with `base`.
    pub fn needs_signature_file(&self, base: &str) -> bool {
        self.needs_signature_file_bytes() && self.base_name == base
    }

    pub fn set_signature_file(&mut self, bytes: Vec<u8>) {
        self.sf_bytes = Some(bytes);
    }

    /// Verify the block over the `.SF`, check the `.SF` digests against the
    /// manifest, and record the signers for every covered name.
    ///
    /// `signers` is updated only when every check passed. Each
    /// `<ALG>-Digest-Manifest` value seen is appended to `manifest_digests`.
    pub fn process(
        &self,
        provider: &dyn CryptoProvider,
        digester: &ManifestDigester,
        signers: &mut HashMap<String, SignerList>,
        manifest_digests: &mut Vec<String>,
    ) -> JarResult<()> {
        let sf_bytes = self
            .sf_bytes
            .as_deref()
            .ok_or_else(|| JarError::metadata(&self.block_name, "signature file not available"))?;

        let sf = codec::parse(sf_bytes).map_err(|e| {
            JarError::metadata(&self.block_name, format!("unreadable signature file: {e}"))
        })?;

        let version = sf.main_attributes().get(AttributeName::SIGNATURE_VERSION);
        if !version.is_some_and(|v| v.eq_ignore_ascii_case("1.0")) {
            tracing::debug!(
                block = %self.block_name,
                ?version,
                "ignoring signature file with unsupported version"
            );
            return Ok(());
        }

        let new_signers = provider.verify_signature_block(&self.block_name, &self.block, sf_bytes)?;
        if new_signers.is_empty() {
            return Ok(());
        }
        let new_signers: SignerList = new_signers.into();

        let manifest_signed = verify_manifest_hash(sf.main_attributes(), digester, manifest_digests);
        if !manifest_signed {
            verify_main_attributes(sf.main_attributes(), digester)?;
        }

        let mut signed_names = Vec::new();
        for (name, attrs) in sf.entries() {
            if manifest_signed || verify_section(name, attrs, digester)? {
                tracing::debug!(block = %self.block_name, name, "signed");
                signed_names.push(normalize_entry_name(name).to_string());
            } else {
                tracing::debug!(block = %self.block_name, name, "no supported digest, unsigned");
            }
        }
        signed_names.push(MANIFEST_NAME.to_string());

        for name in signed_names {
            let merged = merge_signers(signers.get(&name), &new_signers);
            signers.insert(name, merged);
        }
        Ok(())
    }
}

/// True if any supported `<ALG>-Digest-Manifest` matches the whole manifest.
fn verify_manifest_hash(
    main: &Attributes,
    digester: &ManifestDigester,
    manifest_digests: &mut Vec<String>,
) -> bool {
    let mut signed = false;
    for (key, value) in main.iter() {
        let Some(prefix) = hash::algorithm_prefix(key.as_str(), MANIFEST_DIGEST_SUFFIX) else {
            continue;
        };
        manifest_digests.push(value.to_string());
        let Some(algorithm) = DigestAlgorithm::from_jar_name(prefix) else {
            continue;
        };
        let Some(expected) = hash::decode_digest(value) else {
            continue;
        };
        if hash::digests_equal(&digester.manifest_digest(algorithm), &expected) {
            signed = true;
        }
    }
    signed
}

/// Every present, supported main-section assertion must match.
fn verify_main_attributes(main: &Attributes, digester: &ManifestDigester) -> JarResult<()> {
    for (key, value) in main.iter() {
        let Some(prefix) = hash::algorithm_prefix(key.as_str(), MAIN_ATTRS_DIGEST_SUFFIX) else {
            continue;
        };
        let Some(algorithm) = DigestAlgorithm::from_jar_name(prefix) else {
            continue;
        };
        let matches = match (
            digester.main_attributes_digest(algorithm),
            hash::decode_digest(value),
        ) {
            (Some(computed), Some(expected)) => hash::digests_equal(&computed, &expected),
            _ => false,
        };
        if !matches {
            return Err(JarError::DigestMismatch {
                entry: "manifest main attributes".to_string(),
                algorithm: algorithm.jar_name().to_string(),
            });
        }
    }
    Ok(())
}

/// Check the per-entry assertions of one `.SF` section.
///
/// Returns `Ok(false)` when the section carries no supported digest; a
/// present assertion that does not match, or names a section the manifest
/// does not have, is an error.
fn verify_section(name: &str, attrs: &Attributes, digester: &ManifestDigester) -> JarResult<bool> {
    let mut verified = false;
    for (key, value) in attrs.iter() {
        let Some(prefix) = hash::algorithm_prefix(key.as_str(), DIGEST_SUFFIX) else {
            continue;
        };
        let Some(algorithm) = DigestAlgorithm::from_jar_name(prefix) else {
            continue;
        };
        let mismatch = || JarError::DigestMismatch {
            entry: name.to_string(),
            algorithm: algorithm.jar_name().to_string(),
        };
        let computed = digester.entry_digest(name, algorithm).ok_or_else(mismatch)?;
        let expected = hash::decode_digest(value).ok_or_else(mismatch)?;
        if !hash::digests_equal(&computed, &expected) {
            return Err(mismatch());
        }
        verified = true;
    }
    Ok(verified)
}
