// signer.rs - Produce MANIFEST.MF, <NAME>.SF and <NAME>.EC for an archive
//
// The .SF sections digest the manifest sections exactly as serialized here,
// so the manifest bytes returned in SignedFiles must be written unchanged.

use std::io::Read;
use std::sync::Arc;

use ed25519_dalek::SigningKey;

use crate::error::{JarError, JarResult};
use crate::hash::{self, DigestAlgorithm};
use crate::jar::archive::ArchiveReader;
use crate::jar::digester::ManifestDigester;
use crate::jar::identity::Certificate;
use crate::jar::provider::{CryptoProvider, Ed25519Provider, SignatureBlock};
use crate::jar::verifier::is_signing_related;
use crate::manifest::{AttributeName, Manifest, MANIFEST_NAME};

pub const CREATED_BY: &str = concat!("jarsig ", env!("CARGO_PKG_VERSION"));

/// Longest signer name; longer names are truncated.
const MAX_SIGNER_NAME: usize = 8;

/// Output of [`JarSigner::sign`].
#[derive(Debug, Clone)]
pub struct SignedFiles {
    pub manifest: Vec<u8>,
    pub signature_file: Vec<u8>,
    pub block: Vec<u8>,
    /// Entries covered by the signature.
    pub names: Vec<String>,
    signer_name: String,
}

impl SignedFiles {
    pub fn signature_file_name(&self) -> String {
        format!("META-INF/{}.SF", self.signer_name)
    }

    pub fn block_name(&self) -> String {
        format!("META-INF/{}.EC", self.signer_name)
    }

    /// (archive name, content) for each file to write.
    pub fn files(&self) -> [(String, &[u8]); 3] {
        [
            (MANIFEST_NAME.to_string(), &self.manifest[..]),
            (self.signature_file_name(), &self.signature_file[..]),
            (self.block_name(), &self.block[..]),
        ]
    }
}

pub struct JarSigner {
    key: SigningKey,
    chain: Vec<Certificate>,
    signer_name: String,
    algorithm: DigestAlgorithm,
}

impl JarSigner {
    /// `signer_name` becomes the `.SF`/`.EC` base name. It is upper-cased,
    /// truncated to 8 characters, and may only contain `[A-Z0-9_-]`.
    pub fn new(key: SigningKey, chain: Vec<Certificate>, signer_name: &str) -> JarResult<Self> {
        let signer_name: String = signer_name
            .to_ascii_uppercase()
            .chars()
            .take(MAX_SIGNER_NAME)
            .collect();
        let valid = !signer_name.is_empty()
            && signer_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(JarError::InvalidName { name: signer_name });
        }
        Ok(Self {
            key,
            chain,
            signer_name,
            algorithm: DigestAlgorithm::Sha256,
        })
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn signer_name(&self) -> &str {
        &self.signer_name
    }

    pub fn sign(&self, archive: &impl ArchiveReader) -> JarResult<SignedFiles> {
        let mut manifest = existing_manifest(archive)?.unwrap_or_default();
        let main = manifest.main_attributes_mut();
        if !main.contains(AttributeName::MANIFEST_VERSION) {
            main.put(AttributeName::MANIFEST_VERSION, "1.0")?;
        }
        if !main.contains(AttributeName::CREATED_BY) {
            main.put(AttributeName::CREATED_BY, CREATED_BY)?;
        }

        let digest_key = format!("{}-Digest", self.algorithm.jar_name());
        let mut names = Vec::new();
        for name in archive.list_entry_names() {
            if name.ends_with('/') || is_signing_related(&name) {
                continue;
            }
            let Some(meta) = archive.lookup_entry(&name) else {
                return Err(JarError::CorruptedArchive { name });
            };
            let digest = hash::digest_reader(self.algorithm, archive.open_stream(&meta)?)?;
            manifest
                .entry_mut(&name)
                .put(&digest_key, hash::encode_digest(&digest))?;
            names.push(name);
        }

        let manifest_bytes = manifest.to_bytes();
        let signature_file = self.signature_file(&manifest, &manifest_bytes)?;
        let block = SignatureBlock::sign(&self.key, self.chain.clone(), &signature_file).to_bytes()?;

        tracing::debug!(
            signer = %self.signer_name,
            entries = names.len(),
            algorithm = self.algorithm.jar_name(),
            "archive signed"
        );
        Ok(SignedFiles {
            manifest: manifest_bytes,
            signature_file,
            block,
            names,
            signer_name: self.signer_name.clone(),
        })
    }

    fn signature_file(&self, manifest: &Manifest, manifest_bytes: &[u8]) -> JarResult<Vec<u8>> {
        let provider: Arc<dyn CryptoProvider> = Arc::new(Ed25519Provider);
        let digester = ManifestDigester::new(manifest_bytes.into(), provider);
        let alg = self.algorithm;

        let mut sf = Manifest::new();
        let main = sf.main_attributes_mut();
        main.put(AttributeName::SIGNATURE_VERSION, "1.0")?;
        main.put(AttributeName::CREATED_BY, CREATED_BY)?;
        main.put(
            &format!("{}-Digest-Manifest", alg.jar_name()),
            hash::encode_digest(&digester.manifest_digest(alg)),
        )?;
        if let Some(digest) = digester.main_attributes_digest(alg) {
            main.put(
                &format!("{}-Digest-Manifest-Main-Attributes", alg.jar_name()),
                hash::encode_digest(&digest),
            )?;
        }

        let digest_key = format!("{}-Digest", alg.jar_name());
        for (name, _) in manifest.entries() {
            let digest = digester
                .entry_digest(name, alg)
                .ok_or_else(|| JarError::CorruptedArchive { name: name.to_string() })?;
            sf.entry_mut(name)
                .put(&digest_key, hash::encode_digest(&digest))?;
        }
        Ok(sf.to_bytes())
    }
}

fn existing_manifest(archive: &impl ArchiveReader) -> JarResult<Option<Manifest>> {
    let Some(meta) = archive.lookup_entry(MANIFEST_NAME) else {
        return Ok(None);
    };
    let mut raw = Vec::new();
    archive.open_stream(&meta)?.read_to_end(&mut raw)?;
    Ok(Some(Manifest::parse(&raw)?))
}
