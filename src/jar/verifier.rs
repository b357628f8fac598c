// verifier.rs - JAR verification state machine
//
// Phases:
//   ParsingMeta       META-INF signature files are buffered and processed.
//                     Blocks that arrive before their .SF wait in a queue.
//   StreamingEntries  entries with a pending signer are digested as they are
//                     read; a match promotes the signer to verified.
//
// The transition is one-way and happens on the first entry that is not
// signature metadata, or on an explicit done_with_meta().
//
// FAILURE MODEL:
//   - signature metadata that cannot be parsed or verified is logged and
//     dropped; that signer simply contributes nothing
//   - streamed entry content that does not match its manifest digest is an
//     error returned to the reader, because it means the content was altered

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::VerifyConfig;
use crate::error::{JarError, JarResult};
use crate::hash::{self, DigestAlgorithm, EntryHasher};
use crate::jar::digester::ManifestDigester;
use crate::jar::identity::{flatten_certificates, same_signers, Certificate, CodeSigner, SignerList};
use crate::jar::provider::CryptoProvider;
use crate::jar::signature_file::{
    base_name, is_block_or_sf, normalize_entry_name, SignatureFileVerifier,
};
use crate::manifest::{Attributes, Manifest, MANIFEST_NAME};

/// Deprecated JAR index, never digested.
pub const INDEX_NAME: &str = "META-INF/INDEX.LIST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ParsingMeta,
    StreamingEntries,
}

/// Per-entry context returned by [`JarVerifier::begin_entry`].
///
/// Feed the entry's bytes through [`EntryVerifier::update`] and hand it back
/// to [`JarVerifier::end_entry`] once the content is exhausted.
#[derive(Clone)]
pub struct EntryVerifier {
    name: String,
    mode: EntryMode,
}

#[derive(Clone)]
enum EntryMode {
    /// Nothing to check for this entry.
    Skip,
    /// Raw bytes of a `.SF` or signature block.
    Buffering {
        upper_name: String,
        buf: Vec<u8>,
        limit: usize,
        overflowed: bool,
    },
    /// Running digests paired with the manifest's asserted values.
    Digesting { digests: Vec<(EntryHasher, Vec<u8>)> },
}

impl EntryVerifier {
    fn skip(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: EntryMode::Skip,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the entry's content is being digested.
    pub fn is_armed(&self) -> bool {
        matches!(self.mode, EntryMode::Digesting { .. })
    }

    /// Whether the entry is signature metadata being captured.
    pub fn is_buffering(&self) -> bool {
        matches!(self.mode, EntryMode::Buffering { .. })
    }

    pub fn update_byte(&mut self, b: u8) {
        self.update(&[b]);
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.mode {
            EntryMode::Skip => {}
            EntryMode::Buffering {
                buf,
                limit,
                overflowed,
                ..
            } => {
                if *overflowed {
                    return;
                }
                if buf.len() + data.len() > *limit {
                    *overflowed = true;
                    *buf = Vec::new();
                } else {
                    buf.extend_from_slice(data);
                }
            }
            EntryMode::Digesting { digests } => {
                for (hasher, _) in digests.iter_mut() {
                    hasher.update(data);
                }
            }
        }
    }
}

struct VerifierState {
    phase: Phase,
    any_to_verify: bool,
    verified_signers: HashMap<String, SignerList>,
    sig_file_signers: HashMap<String, SignerList>,
    sig_file_data: HashMap<String, Vec<u8>>,
    pending_blocks: Vec<SignatureFileVerifier>,
    manifest_raw: Option<Arc<[u8]>>,
    digester: Option<Arc<ManifestDigester>>,
    manifest_digests: Vec<String>,
}

/// Signature verifier for one open archive.
///
/// All shared state sits behind one mutex, so a verifier can be used from
/// several threads reading different entries of the same archive.
pub struct JarVerifier {
    manifest: Arc<Manifest>,
    provider: Arc<dyn CryptoProvider>,
    config: VerifyConfig,
    state: Mutex<VerifierState>,
}

impl JarVerifier {
    /// `raw_manifest` must be the exact bytes `manifest` was parsed from.
    pub fn new(
        manifest: Arc<Manifest>,
        raw_manifest: Arc<[u8]>,
        provider: Arc<dyn CryptoProvider>,
        config: VerifyConfig,
    ) -> Self {
        Self {
            manifest,
            provider,
            config,
            state: Mutex::new(VerifierState {
                phase: Phase::ParsingMeta,
                any_to_verify: true,
                verified_signers: HashMap::new(),
                sig_file_signers: HashMap::new(),
                sig_file_data: HashMap::new(),
                pending_blocks: Vec::new(),
                manifest_raw: Some(raw_manifest),
                digester: None,
                manifest_digests: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VerifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_parsing_meta(&self) -> bool {
        self.phase() == Phase::ParsingMeta
    }

    /// Start an entry. Must be called before any of its bytes are read.
    pub fn begin_entry(&self, name: &str, is_directory: bool) -> EntryVerifier {
        let mut state = self.lock();

        if state.phase == Phase::ParsingMeta {
            let upper = name.to_uppercase();
            if upper.starts_with("META-INF/") || upper.starts_with("/META-INF/") {
                if is_directory || upper == MANIFEST_NAME || upper == INDEX_NAME {
                    return EntryVerifier::skip(name);
                }
                if is_block_or_sf(&upper) {
                    return EntryVerifier {
                        name: name.to_string(),
                        mode: EntryMode::Buffering {
                            upper_name: upper,
                            buf: Vec::new(),
                            limit: self.config.max_meta_entry_size,
                            overflowed: false,
                        },
                    };
                }
            }
            self.finish_meta(&mut state);
        }

        if is_directory {
            return EntryVerifier::skip(name);
        }

        let name = normalize_entry_name(name);
        let signed = name != MANIFEST_NAME
            && (state.sig_file_signers.contains_key(name)
                || state.verified_signers.contains_key(name));
        if !signed {
            return EntryVerifier::skip(name);
        }
        drop(state);

        let digests = self
            .manifest_section(name)
            .map(expected_digests)
            .unwrap_or_default();
        EntryVerifier {
            name: name.to_string(),
            mode: EntryMode::Digesting { digests },
        }
    }

    /// Finish an entry whose content has been fully fed.
    ///
    /// For a digested entry, returns its signers once the content matched the
    /// manifest. A mismatch is `DigestMismatch`; a signed entry with no
    /// usable manifest digest is `MissingDigest`.
    pub fn end_entry(&self, entry: EntryVerifier) -> JarResult<Option<SignerList>> {
        match entry.mode {
            EntryMode::Skip => Ok(None),
            EntryMode::Buffering {
                upper_name,
                buf,
                overflowed,
                ..
            } => {
                if overflowed {
                    tracing::warn!(
                        entry = %entry.name,
                        limit = self.config.max_meta_entry_size,
                        "signature file exceeds size limit, ignoring"
                    );
                } else {
                    self.process_meta_entry(&upper_name, buf);
                }
                Ok(None)
            }
            EntryMode::Digesting { digests } => {
                if digests.is_empty() {
                    return Err(JarError::MissingDigest { entry: entry.name });
                }
                for (hasher, expected) in digests {
                    let algorithm = hasher.algorithm();
                    if !hash::digests_equal(&hasher.finalize(), &expected) {
                        return Err(JarError::DigestMismatch {
                            entry: entry.name,
                            algorithm: algorithm.jar_name().to_string(),
                        });
                    }
                }

                let mut state = self.lock();
                let signers = match state.sig_file_signers.remove(&entry.name) {
                    Some(signers) => {
                        state
                            .verified_signers
                            .insert(entry.name.clone(), signers.clone());
                        Some(signers)
                    }
                    None => state.verified_signers.get(&entry.name).cloned(),
                };
                tracing::debug!(entry = %entry.name, signed = signers.is_some(), "entry verified");
                Ok(signers)
            }
        }
    }

    /// Leave the META-INF phase. Later calls are no-ops.
    pub fn done_with_meta(&self) {
        let mut state = self.lock();
        self.finish_meta(&mut state);
    }

    fn finish_meta(&self, state: &mut VerifierState) {
        if state.phase == Phase::StreamingEntries {
            return;
        }
        state.phase = Phase::StreamingEntries;
        state.any_to_verify = !state.sig_file_signers.is_empty();

        if !state.pending_blocks.is_empty() {
            tracing::debug!(
                count = state.pending_blocks.len(),
                "dropping signature blocks without a matching .SF"
            );
        }
        state.pending_blocks = Vec::new();
        state.sig_file_data = HashMap::new();
        state.manifest_raw = None;
        state.digester = None;

        // The manifest's integrity is established by the digests it produced.
        if let Some(signers) = state.sig_file_signers.remove(MANIFEST_NAME) {
            state
                .verified_signers
                .insert(MANIFEST_NAME.to_string(), signers);
        }
        tracing::debug!(any_to_verify = state.any_to_verify, "done with META-INF");
    }

    /// True once the META-INF phase is over and no signer was established.
    pub fn nothing_to_verify(&self) -> bool {
        let state = self.lock();
        state.phase == Phase::StreamingEntries && !state.any_to_verify
    }

    /// Verified signers of `name`, or `None` if unsigned or not yet read.
    pub fn code_signers(&self, name: &str) -> Option<SignerList> {
        self.lock()
            .verified_signers
            .get(normalize_entry_name(name))
            .cloned()
    }

    /// Certificates of every verified signer of `name`, flattened.
    pub fn certificates(&self, name: &str) -> Option<Vec<Certificate>> {
        self.code_signers(name)
            .map(|signers| flatten_certificates(&signers))
    }

    /// Whether `name` has a signer that still awaits content verification.
    pub fn is_pending(&self, name: &str) -> bool {
        self.lock()
            .sig_file_signers
            .contains_key(normalize_entry_name(name))
    }

    /// `<ALG>-Digest-Manifest` values seen in processed signature files.
    pub fn manifest_digests(&self) -> Vec<String> {
        self.lock().manifest_digests.clone()
    }

    /// Names from `all_names` whose signers equal one of `requested`. An
    /// empty requested set selects entries with no signer at all, except the
    /// signature metadata files themselves.
    pub fn entry_names_matching(
        &self,
        requested: &[&[CodeSigner]],
        all_names: impl IntoIterator<Item = String>,
    ) -> Vec<String> {
        let include_unsigned = requested.iter().any(|r| r.is_empty());
        let state = self.lock();
        all_names
            .into_iter()
            .filter(|name| {
                let key = normalize_entry_name(name);
                let signers = state
                    .verified_signers
                    .get(key)
                    .or_else(|| state.sig_file_signers.get(key));
                match signers {
                    Some(signers) => requested
                        .iter()
                        .any(|r| !r.is_empty() && same_signers(signers, r)),
                    None => include_unsigned && !is_signing_related(name),
                }
            })
            .collect()
    }

    fn manifest_section(&self, name: &str) -> Option<&Attributes> {
        self.manifest
            .attributes(name)
            .or_else(|| self.manifest.attributes(&format!("./{name}")))
            .or_else(|| self.manifest.attributes(&format!("/{name}")))
    }

    /// Handle a fully buffered `.SF` or signature block.
    fn process_meta_entry(&self, upper_name: &str, bytes: Vec<u8>) {
        let mut state = self.lock();
        if state.phase != Phase::ParsingMeta {
            tracing::debug!(entry = upper_name, "signature file finished after META-INF phase, ignoring");
            return;
        }
        let key = base_name(upper_name).to_string();

        if upper_name.ends_with(".SF") {
            let state = &mut *state;
            let (waiting, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_blocks)
                .into_iter()
                .partition(|sfv| sfv.needs_signature_file(&key));
            state.pending_blocks = rest;

            if let Some(digester) = state.digester.clone() {
                for mut sfv in waiting {
                    sfv.set_signature_file(bytes.clone());
                    self.run(&sfv, &digester, state);
                }
            }
            state.sig_file_data.insert(key, bytes);
            return;
        }

        let Some(digester) = self.digester(&mut state) else {
            return;
        };
        let mut sfv = SignatureFileVerifier::new(upper_name, bytes);
        if sfv.needs_signature_file_bytes() {
            match state.sig_file_data.get(&key).cloned() {
                Some(sf) => sfv.set_signature_file(sf),
                None => {
                    tracing::debug!(block = upper_name, "queueing block until its .SF arrives");
                    state.pending_blocks.push(sfv);
                    return;
                }
            }
        }
        self.run(&sfv, &digester, &mut state);
    }

    /// Build the digester on first use and release the raw manifest bytes.
    fn digester(&self, state: &mut VerifierState) -> Option<Arc<ManifestDigester>> {
        if state.digester.is_none() {
            let raw = state.manifest_raw.take()?;
            state.digester = Some(Arc::new(ManifestDigester::new(raw, self.provider.clone())));
        }
        state.digester.clone()
    }

    fn run(&self, sfv: &SignatureFileVerifier, digester: &ManifestDigester, state: &mut VerifierState) {
        let result = sfv.process(
            self.provider.as_ref(),
            digester,
            &mut state.sig_file_signers,
            &mut state.manifest_digests,
        );
        if let Err(e) = result {
            tracing::debug!(
                block = sfv.block_name(),
                error = %e,
                "signature metadata rejected, treating signer as absent"
            );
        }
    }
}

/// Supported `<ALG>-Digest` attributes as (running hasher, expected value).
/// An undecodable value yields an empty expectation that can never match.
fn expected_digests(attrs: &Attributes) -> Vec<(EntryHasher, Vec<u8>)> {
    attrs
        .iter()
        .filter_map(|(key, value)| {
            let prefix = hash::algorithm_prefix(key.as_str(), "-Digest")?;
            let algorithm = DigestAlgorithm::from_jar_name(prefix)?;
            let expected = hash::decode_digest(value).unwrap_or_default();
            Some((algorithm.hasher(), expected))
        })
        .collect()
}

/// Manifest, signature files and `SIG-*` files directly under META-INF.
pub fn is_signing_related(name: &str) -> bool {
    let upper = name.to_uppercase();
    let Some(rest) = upper.strip_prefix("META-INF/") else {
        return false;
    };
    if rest.contains('/') {
        return false;
    }
    upper == MANIFEST_NAME || is_block_or_sf(&upper) || rest.starts_with("SIG-")
}
