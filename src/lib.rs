//! JAR manifest processing and signature verification.
//!
//! ```text
//! archive ──> manifest codec ──> Manifest ──> ManifestDigester
//!    │
//!    ├─ META-INF/*.SF, *.EC ──> JarVerifier ──> SignatureFileVerifier
//!    │                                               │
//!    │                                      pending signers per entry
//!    │                                               │
//!    └─ entry bytes ──> VerifierStream ──> digest check ──> verified signers
//! ```
//!
//! Entries only count as signed after their bytes were read in full and
//! matched the manifest. Problems with signature metadata make that signer
//! absent; altered entry content is an error.

pub mod config;
pub mod error;
pub mod hash;
pub mod jar;
pub mod manifest;

pub use config::VerifyConfig;
pub use error::{JarError, JarResult};
pub use jar::{JarFile, JarSigner, Verdict};
pub use manifest::{AttributeName, Attributes, Manifest};
