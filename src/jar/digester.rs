// digester.rs - Per-section digests over the raw manifest bytes
//
// RULE: digests are always computed over the manifest bytes exactly as they
// appear in the archive, never over a re-serialization of the parsed model.
// Re-serializing may wrap lines at different points, and any byte difference
// turns into a false verification failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::hash::DigestAlgorithm;
use crate::jar::provider::CryptoProvider;

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SectionKey {
    Whole,
    Main,
    Entry(String),
}

/// Lazily computed, cached digests of manifest sections.
///
/// A section spans from its first header line through the blank line that
/// terminates it. Sections that do not start with a well-formed `Name:` line
/// are not indexed, so a malformed manifest still yields a digester; lookups
/// for the broken sections just return `None`.
pub struct ManifestDigester {
    raw: Arc<[u8]>,
    main: Option<Span>,
    sections: HashMap<String, Span>,
    provider: Arc<dyn CryptoProvider>,
    cache: Mutex<HashMap<(SectionKey, DigestAlgorithm), Vec<u8>>>,
}

impl ManifestDigester {
    pub fn new(raw: Arc<[u8]>, provider: Arc<dyn CryptoProvider>) -> Self {
        let (main, sections) = index_sections(&raw);
        Self {
            raw,
            main,
            sections,
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Digest of the entire manifest.
    pub fn manifest_digest(&self, algorithm: DigestAlgorithm) -> Vec<u8> {
        self.cached(SectionKey::Whole, algorithm, || Some(&self.raw[..]))
            .unwrap_or_default()
    }

    /// Digest of the main section, including its terminating blank line.
    pub fn main_attributes_digest(&self, algorithm: DigestAlgorithm) -> Option<Vec<u8>> {
        let span = self.main?;
        self.cached(SectionKey::Main, algorithm, || {
            Some(&self.raw[span.start..span.end])
        })
    }

    /// Digest of the section named `name`.
    pub fn entry_digest(&self, name: &str, algorithm: DigestAlgorithm) -> Option<Vec<u8>> {
        let span = *self.sections.get(name)?;
        self.cached(SectionKey::Entry(name.to_string()), algorithm, || {
            Some(&self.raw[span.start..span.end])
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Raw bytes of the section named `name`.
    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        self.sections
            .get(name)
            .map(|span| &self.raw[span.start..span.end])
    }

    fn cached<'a>(
        &'a self,
        key: SectionKey,
        algorithm: DigestAlgorithm,
        bytes: impl FnOnce() -> Option<&'a [u8]>,
    ) -> Option<Vec<u8>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&(key.clone(), algorithm)) {
            return Some(hit.clone());
        }
        let digest = self.provider.digest(algorithm, bytes()?);
        cache.insert((key, algorithm), digest.clone());
        Some(digest)
    }
}

/// Returns (content_start, content_end, next_line_start).
fn line_at(raw: &[u8], pos: usize) -> (usize, usize, usize) {
    let end = raw[pos..]
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .map_or(raw.len(), |off| pos + off);
    let next = match raw.get(end) {
        Some(b'\r') if raw.get(end + 1) == Some(&b'\n') => end + 2,
        Some(_) => end + 1,
        None => end,
    };
    (pos, end, next)
}

fn index_sections(raw: &[u8]) -> (Option<Span>, HashMap<String, Span>) {
    let mut main = None;
    let mut sections = HashMap::new();
    let mut pos = 0;

    while pos < raw.len() {
        let start = pos;
        let mut lines: Vec<&[u8]> = Vec::new();
        while pos < raw.len() {
            let (text_start, text_end, next) = line_at(raw, pos);
            pos = next;
            if text_start == text_end {
                break;
            }
            lines.push(&raw[text_start..text_end]);
        }
        let span = Span { start, end: pos };

        if main.is_none() {
            main = Some(span);
            continue;
        }
        // A repeated name keeps the last span, matching the codec where the
        // later section's attributes overwrite the earlier ones.
        if let Some(name) = section_name(&lines) {
            sections.insert(name, span);
        }
    }

    (main, sections)
}

fn section_name(lines: &[&[u8]]) -> Option<String> {
    let first = lines.first()?;
    if first.len() < 6 || !first[..6].eq_ignore_ascii_case(b"Name: ") {
        return None;
    }
    let mut name = first[6..].to_vec();
    for line in &lines[1..] {
        match line.split_first() {
            Some((b' ', rest)) => name.extend_from_slice(rest),
            _ => break,
        }
    }
    String::from_utf8(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jar::provider::Ed25519Provider;

    const RAW: &[u8] = b"Manifest-Version: 1.0\r\nCreated-By: t\r\n\r\n\
Name: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n\
Name: long/\r\n path.txt\r\nSHA-256-Digest: BBBB\r\n\r\n";

    fn digester(raw: &[u8]) -> ManifestDigester {
        ManifestDigester::new(raw.into(), Arc::new(Ed25519Provider))
    }

    #[test]
    fn spans_include_trailing_blank_line() {
        let d = digester(RAW);
        assert_eq!(
            d.section_bytes("a.txt").unwrap(),
            b"Name: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n"
        );
        assert_eq!(
            d.main_attributes_digest(DigestAlgorithm::Sha256).unwrap(),
            DigestAlgorithm::Sha256.digest(b"Manifest-Version: 1.0\r\nCreated-By: t\r\n\r\n")
        );
    }

    #[test]
    fn wrapped_names_are_joined() {
        let d = digester(RAW);
        assert!(d.contains("long/path.txt"));
        assert_eq!(
            d.entry_digest("long/path.txt", DigestAlgorithm::Sha256).unwrap(),
            DigestAlgorithm::Sha256
                .digest(b"Name: long/\r\n path.txt\r\nSHA-256-Digest: BBBB\r\n\r\n")
        );
    }

    #[test]
    fn whole_manifest_digest_covers_raw_bytes() {
        let d = digester(RAW);
        assert_eq!(
            d.manifest_digest(DigestAlgorithm::Sha512),
            DigestAlgorithm::Sha512.digest(RAW)
        );
        // cached value is returned on the second call
        assert_eq!(
            d.manifest_digest(DigestAlgorithm::Sha512),
            DigestAlgorithm::Sha512.digest(RAW)
        );
    }

    #[test]
    fn uses_original_bytes_not_reserialization() {
        // LF endings and an unusual wrap point; re-serializing would differ.
        let raw = b"Manifest-Version: 1.0\n\nName: x\nSHA-256-Dig\n est: AAAA\n\n";
        let d = digester(raw);
        assert_eq!(
            d.section_bytes("x").unwrap(),
            b"Name: x\nSHA-256-Dig\n est: AAAA\n\n"
        );
    }

    #[test]
    fn malformed_sections_are_not_indexed() {
        let raw = b"Manifest-Version: 1.0\r\n\r\nGarbage line\r\n\r\nName: ok\r\nK: v\r\n\r\n";
        let d = digester(raw);
        assert!(d.contains("ok"));
        assert_eq!(d.entry_digest("missing", DigestAlgorithm::Sha256), None);
    }

    #[test]
    fn missing_final_blank_line() {
        let raw = b"M: 1\r\n\r\nName: last\r\nK: v";
        let d = digester(raw);
        assert_eq!(d.section_bytes("last").unwrap(), b"Name: last\r\nK: v");
    }

    #[test]
    fn repeated_section_agrees_with_parsed_manifest() {
        let raw = b"M: 1\r\n\r\n\
Name: a\r\nSHA-256-Digest: AAAA\r\n\r\n\
Name: a\r\nSHA-256-Digest: BBBB\r\n\r\n";
        let d = digester(raw);
        assert_eq!(
            d.section_bytes("a").unwrap(),
            b"Name: a\r\nSHA-256-Digest: BBBB\r\n\r\n"
        );

        let parsed = crate::manifest::Manifest::parse(raw).unwrap();
        assert_eq!(
            parsed.attributes("a").unwrap().get("SHA-256-Digest"),
            Some("BBBB")
        );
    }
}
