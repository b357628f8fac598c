// file.rs - An open JAR: archive, cached manifest, lazily built verifier
//
// The verifier is built on first use. Building it reads every META-INF
// signature file and block through the verifier, then ends the META-INF
// phase. When that leaves nothing to verify, the verifier is dropped and the
// archive behaves as unsigned from then on.

use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::VerifyConfig;
use crate::error::{JarError, JarResult};
use crate::jar::archive::{ArchiveReader, EntryMeta, LimitReader};
use crate::jar::identity::{flatten_certificates, Certificate, CodeSigner, SignerList};
use crate::jar::provider::{CryptoProvider, Ed25519Provider};
use crate::jar::signature_file::{is_block_or_sf, normalize_entry_name};
use crate::jar::stream::VerifierStream;
use crate::jar::verifier::{is_signing_related, JarVerifier};
use crate::manifest::{Manifest, MANIFEST_NAME};

/// A parsed manifest together with the bytes it was parsed from.
#[derive(Clone)]
pub struct LoadedManifest {
    pub manifest: Arc<Manifest>,
    pub raw: Arc<[u8]>,
}

/// Load-once manifest slot.
///
/// `None` inside the slot records that the archive has no manifest, so the
/// lookup is not repeated.
#[derive(Default)]
pub struct ManifestCache {
    slot: Mutex<Option<Option<LoadedManifest>>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached manifest, running `load` on first use. A failed
    /// load is not cached.
    pub fn get_or_load(
        &self,
        load: impl FnOnce() -> JarResult<Option<LoadedManifest>>,
    ) -> JarResult<Option<LoadedManifest>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }
        let loaded = load()?;
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

enum VerifierSlot {
    Uninit,
    /// `None` when there is nothing to verify.
    Ready(Option<Arc<JarVerifier>>),
}

pub struct JarFile<A> {
    archive: A,
    config: VerifyConfig,
    provider: Arc<dyn CryptoProvider>,
    manifest: ManifestCache,
    verifier: Mutex<VerifierSlot>,
}

impl<A: ArchiveReader> JarFile<A> {
    pub fn open(archive: A) -> Self {
        Self {
            archive,
            config: VerifyConfig::default(),
            provider: Arc::new(Ed25519Provider),
            manifest: ManifestCache::new(),
            verifier: Mutex::new(VerifierSlot::Uninit),
        }
    }

    pub fn with_config(mut self, config: VerifyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The archive's manifest, or `None` if it has none.
    pub fn manifest(&self) -> JarResult<Option<Arc<Manifest>>> {
        Ok(self.loaded_manifest()?.map(|loaded| loaded.manifest))
    }

    /// Forget the cached manifest and verifier, e.g. after the archive was
    /// re-signed in place.
    pub fn refresh(&self) {
        self.manifest.invalidate();
        *self.lock_verifier() = VerifierSlot::Uninit;
    }

    fn loaded_manifest(&self) -> JarResult<Option<LoadedManifest>> {
        self.manifest.get_or_load(|| {
            let Some(meta) = self.manifest_entry() else {
                return Ok(None);
            };
            let limit = self.config.max_manifest_size;
            if meta.size > limit {
                return Err(JarError::TooLarge {
                    name: meta.name,
                    limit,
                });
            }
            let mut raw = Vec::new();
            LimitReader::new(self.archive.open_stream(&meta)?, limit, &meta.name)
                .read_to_end(&mut raw)
                .map_err(JarError::from_io_error)?;
            let manifest = Manifest::parse(&raw)?;
            Ok(Some(LoadedManifest {
                manifest: Arc::new(manifest),
                raw: raw.into(),
            }))
        })
    }

    fn manifest_entry(&self) -> Option<EntryMeta> {
        if let Some(meta) = self.archive.lookup_entry(MANIFEST_NAME) {
            return Some(meta);
        }
        let name = self
            .archive
            .list_entry_names()
            .into_iter()
            .find(|name| name.eq_ignore_ascii_case(MANIFEST_NAME))?;
        self.archive.lookup_entry(&name)
    }

    fn lock_verifier(&self) -> MutexGuard<'_, VerifierSlot> {
        self.verifier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active verifier, building it on first use.
    fn verifier(&self) -> JarResult<Option<Arc<JarVerifier>>> {
        let mut slot = self.lock_verifier();
        if let VerifierSlot::Ready(verifier) = &*slot {
            return Ok(verifier.clone());
        }
        let verifier = self.build_verifier()?;
        *slot = VerifierSlot::Ready(verifier.clone());
        Ok(verifier)
    }

    fn build_verifier(&self) -> JarResult<Option<Arc<JarVerifier>>> {
        if !self.config.verify {
            return Ok(None);
        }
        let Some(loaded) = self.loaded_manifest()? else {
            return Ok(None);
        };

        let meta_names: Vec<String> = self
            .archive
            .list_entry_names()
            .into_iter()
            .filter(|name| {
                let upper = name.to_uppercase();
                upper.starts_with("META-INF/") && is_block_or_sf(&upper)
            })
            .collect();
        if meta_names.is_empty() {
            tracing::debug!("no signature files, archive is unsigned");
            return Ok(None);
        }

        let verifier = Arc::new(JarVerifier::new(
            loaded.manifest,
            loaded.raw,
            self.provider.clone(),
            self.config.clone(),
        ));
        for name in meta_names {
            let meta = self
                .archive
                .lookup_entry(&name)
                .ok_or_else(|| JarError::CorruptedArchive { name: name.clone() })?;
            let inner = self.archive.open_stream(&meta)?;
            let mut stream = VerifierStream::new(
                inner,
                verifier.clone(),
                &meta.name,
                meta.is_directory,
                Some(meta.size),
            );
            drain(&mut stream)?;
        }
        verifier.done_with_meta();

        if verifier.nothing_to_verify() {
            tracing::debug!("signature files present but nothing verifiable");
            return Ok(None);
        }
        Ok(Some(verifier))
    }

    /// Open an entry for reading. Content is checked against the manifest
    /// as it is read; a mismatch surfaces from `read` as `InvalidData`.
    pub fn open_entry(
        &self,
        name: &str,
    ) -> JarResult<Option<VerifierStream<Box<dyn Read + Send + '_>>>> {
        let Some(meta) = self.archive.lookup_entry(name) else {
            return Ok(None);
        };
        let verifier = self.verifier()?;
        let inner = self.archive.open_stream(&meta)?;
        let stream = match verifier {
            Some(verifier) => VerifierStream::new(
                inner,
                verifier,
                &meta.name,
                meta.is_directory,
                Some(meta.size),
            ),
            None => VerifierStream::unverified(inner, Some(meta.size)),
        };
        Ok(Some(stream))
    }

    /// Verified signers of `name`. An entry whose content has not been read
    /// yet is read in full first.
    pub fn code_signers(&self, name: &str) -> JarResult<Option<SignerList>> {
        let Some(verifier) = self.verifier()? else {
            return Ok(None);
        };
        if verifier.is_pending(name) {
            if let Some(mut stream) = self.open_entry(name)? {
                drain(&mut stream)?;
            }
        }
        Ok(verifier.code_signers(normalize_entry_name(name)))
    }

    pub fn certificates(&self, name: &str) -> JarResult<Option<Vec<Certificate>>> {
        Ok(self
            .code_signers(name)?
            .map(|signers| flatten_certificates(&signers)))
    }

    pub fn has_anything_signed(&self) -> JarResult<bool> {
        Ok(self.verifier()?.is_some())
    }

    /// `<ALG>-Digest-Manifest` values asserted by the signature files.
    pub fn manifest_digests(&self) -> JarResult<Vec<String>> {
        Ok(self
            .verifier()?
            .map(|verifier| verifier.manifest_digests())
            .unwrap_or_default())
    }

    /// File entries whose signer set equals one of `requested`; an empty
    /// requested set selects unsigned entries.
    pub fn entry_names_matching_signers(
        &self,
        requested: &[&[CodeSigner]],
    ) -> JarResult<Vec<String>> {
        let files = self.file_names();
        match self.verifier()? {
            Some(verifier) => Ok(verifier.entry_names_matching(requested, files)),
            None if requested.iter().any(|r| r.is_empty()) => Ok(files
                .into_iter()
                .filter(|name| !is_signing_related(name))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// All entry names in archive order.
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.list_entry_names()
    }

    fn file_names(&self) -> Vec<String> {
        self.archive
            .list_entry_names()
            .into_iter()
            .filter(|name| !name.ends_with('/'))
            .collect()
    }
}

/// Read a stream to its end, discarding the bytes.
fn drain(stream: &mut impl Read) -> JarResult<()> {
    io::copy(stream, &mut io::sink())
        .map(|_| ())
        .map_err(JarError::from_io_error)
}
