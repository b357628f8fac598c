use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{JarError, JarResult};

/// Longest permitted attribute name, in bytes.
pub const MAX_NAME_LEN: usize = 70;

/// A validated manifest attribute name.
///
/// Names are 1..=70 characters from `[0-9a-zA-Z_-]`. Comparison and hashing
/// ignore ASCII case; the original spelling is kept for output.
#[derive(Clone)]
pub struct AttributeName(String);

impl AttributeName {
    pub const MANIFEST_VERSION: &'static str = "Manifest-Version";
    pub const SIGNATURE_VERSION: &'static str = "Signature-Version";
    pub const CREATED_BY: &'static str = "Created-By";
    pub const NAME: &'static str = "Name";

    pub fn new(name: &str) -> JarResult<Self> {
        if !is_valid(name) {
            return Err(JarError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

fn is_valid(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl PartialEq for AttributeName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for AttributeName {}

impl Hash for AttributeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeName({:?})", self.0)
    }
}

impl TryFrom<&str> for AttributeName {
    type Error = JarError;

    fn try_from(value: &str) -> JarResult<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(name: &AttributeName) -> u64 {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        h.finish()
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(AttributeName::new("").is_err());
        assert!(AttributeName::new(&"x".repeat(71)).is_err());
        assert!(AttributeName::new(&"x".repeat(70)).is_ok());
        assert!(AttributeName::new("Main-Class").is_ok());
    }

    #[test]
    fn rejects_punctuation_and_non_ascii() {
        for bad in ["Main Class", "Main:Class", "Näme", "a.b", "tab\t"] {
            assert!(
                matches!(AttributeName::new(bad), Err(JarError::InvalidName { .. })),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn equality_ignores_case() {
        let a = AttributeName::new("Content-Type").unwrap();
        let b = AttributeName::new("CONTENT-TYPE").unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(b.as_str(), "CONTENT-TYPE");
    }

    proptest! {
        #[test]
        fn valid_iff_length_and_charset(s in "[0-9a-zA-Z_\\- .:é]{0,80}") {
            let expected = !s.is_empty()
                && s.len() <= 70
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            prop_assert_eq!(AttributeName::new(&s).is_ok(), expected);
        }
    }
}
