// report.rs - Whole-archive verification
//
// Streams every file entry through the verifier and classifies the archive.
//
// VERDICTS:
//   Verified         every file outside the signature metadata is signed
//   PartiallySigned  signed, but some files are covered by no signer
//   Unsigned         no usable signature at all
//   Tampered         at least one file failed its digest check, or a listed
//                    entry could not be read back

use std::io;

use crate::error::{JarError, JarResult};
use crate::jar::archive::ArchiveReader;
use crate::jar::file::JarFile;
use crate::jar::identity::{Certificate, SignerList};
use crate::jar::verifier::is_signing_related;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    PartiallySigned(Vec<String>),
    Unsigned,
    Tampered(Vec<String>),
}

impl Verdict {
    /// False only for a tampered archive.
    pub fn is_intact(&self) -> bool {
        !matches!(self, Verdict::Tampered(_))
    }
}

#[derive(Debug, Clone)]
pub struct EntryReport {
    pub name: String,
    pub signers: Option<SignerList>,
}

#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub entries: Vec<EntryReport>,
    pub verdict: Verdict,
}

impl ArchiveReport {
    /// Distinct signer certificates across all entries, in first-seen order.
    pub fn signer_certificates(&self) -> Vec<Certificate> {
        let mut out: Vec<Certificate> = Vec::new();
        let signers = self.entries.iter().filter_map(|e| e.signers.as_deref());
        for signer in signers.flatten() {
            if let Some(cert) = signer.signer_certificate() {
                if !out.contains(cert) {
                    out.push(cert.clone());
                }
            }
        }
        out
    }
}

/// Classify the archive. I/O failures and malformed manifests are errors;
/// content that fails verification is reported in the verdict.
pub fn verify_archive<A: ArchiveReader>(jar: &JarFile<A>) -> JarResult<Verdict> {
    Ok(inspect_archive(jar)?.verdict)
}

/// Like [`verify_archive`], keeping the per-entry results.
pub fn inspect_archive<A: ArchiveReader>(jar: &JarFile<A>) -> JarResult<ArchiveReport> {
    let signed = jar.has_anything_signed()?;
    let mut entries = Vec::new();
    let mut tampered = Vec::new();
    let mut unsigned = Vec::new();

    for name in jar.entry_names() {
        if name.ends_with('/') || is_signing_related(&name) {
            continue;
        }
        let Some(mut stream) = jar.open_entry(&name)? else {
            tampered.push(format!("{name}: listed but not readable"));
            continue;
        };
        match io::copy(&mut stream, &mut io::sink()) {
            Ok(_) => {
                let signers = stream.signers().cloned();
                if signers.is_none() {
                    unsigned.push(name.clone());
                }
                entries.push(EntryReport { name, signers });
            }
            Err(e) => {
                let err = JarError::from_io_error(e);
                if !err.is_security_failure() {
                    return Err(err);
                }
                tracing::warn!(entry = %name, error = %err, "entry failed verification");
                tampered.push(format!("{name}: {err}"));
            }
        }
    }

    let verdict = if !tampered.is_empty() {
        Verdict::Tampered(tampered)
    } else if !signed {
        Verdict::Unsigned
    } else if !unsigned.is_empty() {
        Verdict::PartiallySigned(unsigned)
    } else {
        Verdict::Verified
    };
    Ok(ArchiveReport { entries, verdict })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jar::archive::MemoryArchive;

    #[test]
    fn plain_archive_is_unsigned() {
        let mut archive = MemoryArchive::new();
        archive.add_file("a.txt", b"a".to_vec());
        let jar = JarFile::open(archive);
        let report = inspect_archive(&jar).unwrap();
        assert_eq!(report.verdict, Verdict::Unsigned);
        assert_eq!(report.entries.len(), 1);
        assert!(report.signer_certificates().is_empty());
        assert!(report.verdict.is_intact());
    }

    #[test]
    fn tampered_is_not_intact() {
        assert!(!Verdict::Tampered(vec!["x".into()]).is_intact());
        assert!(Verdict::PartiallySigned(vec!["x".into()]).is_intact());
    }
}
