//! JAR signature verification.
//!
//! Signature metadata under `META-INF/` is processed first; afterwards each
//! entry is checked against its manifest digest while it is being read.

pub mod archive;
pub mod digester;
pub mod file;
pub mod identity;
pub mod provider;
pub mod report;
pub mod signature_file;
pub mod signer;
pub mod stream;
pub mod verifier;

pub use archive::{ArchiveReader, DirArchive, EntryMeta, MemoryArchive};
pub use file::{JarFile, ManifestCache};
pub use identity::{Certificate, CodeSigner, SignerList};
pub use provider::{CryptoProvider, Ed25519Provider, SignatureBlock};
pub use report::{inspect_archive, verify_archive, Verdict};
pub use signer::{JarSigner, SignedFiles};
pub use stream::VerifierStream;
pub use verifier::{EntryVerifier, JarVerifier};
