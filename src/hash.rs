use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::io::{self, Read};

/// Digest algorithms understood in `<ALG>-Digest` attributes.
///
/// Manifests may carry other algorithms (`SHA1`, `MD5`); those are not
/// supported here and are ignored wherever they appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Spelling used as the attribute prefix, e.g. `SHA-256-Digest`.
    pub fn jar_name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Resolve an algorithm from an attribute prefix. Both `SHA-256` and
    /// `SHA256` are accepted, case-insensitively.
    pub fn from_jar_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "SHA256" => Some(Self::Sha256),
            "SHA384" => Some(Self::Sha384),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn hasher(self) -> EntryHasher {
        match self {
            Self::Sha256 => EntryHasher::Sha256(Sha256::new()),
            Self::Sha384 => EntryHasher::Sha384(Sha384::new()),
            Self::Sha512 => EntryHasher::Sha512(Sha512::new()),
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental digest over one of the supported algorithms.
#[derive(Clone)]
pub enum EntryHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl EntryHasher {
    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            Self::Sha256(_) => DigestAlgorithm::Sha256,
            Self::Sha384(_) => DigestAlgorithm::Sha384,
            Self::Sha512(_) => DigestAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

impl io::Write for EntryHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest everything `reader` yields.
pub fn digest_reader(algorithm: DigestAlgorithm, mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = algorithm.hasher();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

/// If `key` ends with `suffix` (ASCII case-insensitive), return the prefix.
///
/// `algorithm_prefix("SHA-256-Digest", "-Digest")` is `Some("SHA-256")`.
pub fn algorithm_prefix<'a>(key: &'a str, suffix: &str) -> Option<&'a str> {
    if key.len() <= suffix.len() {
        return None;
    }
    let split = key.len() - suffix.len();
    if !key.is_char_boundary(split) || !key[split..].eq_ignore_ascii_case(suffix) {
        return None;
    }
    Some(&key[..split])
}

/// Encode a digest for use as an attribute value.
pub fn encode_digest(digest: &[u8]) -> String {
    B64.encode(digest)
}

/// Decode a base64 attribute value, tolerating embedded whitespace.
pub fn decode_digest(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    B64.decode(compact).ok()
}

/// Compute SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&DigestAlgorithm::Sha256.digest(data))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Constant-time comparison for digest values.
pub(crate) fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_jar_algorithm_spellings() {
        assert_eq!(
            DigestAlgorithm::from_jar_name("SHA-256"),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(
            DigestAlgorithm::from_jar_name("sha512"),
            Some(DigestAlgorithm::Sha512)
        );
        assert_eq!(DigestAlgorithm::from_jar_name("SHA1"), None);
        assert_eq!(DigestAlgorithm::from_jar_name("MD5"), None);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = DigestAlgorithm::Sha384.hasher();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), DigestAlgorithm::Sha384.digest(b"hello world"));

        let streamed = digest_reader(DigestAlgorithm::Sha384, &b"hello world"[..]).unwrap();
        assert_eq!(streamed, DigestAlgorithm::Sha384.digest(b"hello world"));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn algorithm_prefix_is_case_insensitive() {
        assert_eq!(algorithm_prefix("SHA-256-Digest", "-Digest"), Some("SHA-256"));
        assert_eq!(
            algorithm_prefix("sha-256-DIGEST-manifest", "-Digest-Manifest"),
            Some("sha-256")
        );
        assert_eq!(algorithm_prefix("-Digest", "-Digest"), None);
        assert_eq!(algorithm_prefix("Created-By", "-Digest"), None);
    }

    #[test]
    fn decode_tolerates_wrapped_values() {
        let encoded = encode_digest(&[7u8; 48]);
        let wrapped = format!("{} {}", &encoded[..20], &encoded[20..]);
        assert_eq!(decode_digest(&wrapped), Some(vec![7u8; 48]));
        assert_eq!(decode_digest("***"), None);
    }

    #[test]
    fn digests_equal_checks_length() {
        assert!(digests_equal(b"abc", b"abc"));
        assert!(!digests_equal(b"abc", b"abd"));
        assert!(!digests_equal(b"abc", b"ab"));
    }
}
