use crate::error::JarResult;
use crate::manifest::name::AttributeName;

/// Attribute set of a manifest section.
///
/// Keeps insertion order so output is deterministic; equality ignores order
/// and key case.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<(AttributeName, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.matches(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, validating the name. Returns the previous value.
    pub fn put(&mut self, name: &str, value: impl Into<String>) -> JarResult<Option<String>> {
        let name = AttributeName::new(name)?;
        Ok(self.insert(name, value))
    }

    /// Set a value under an already-validated name. Returns the previous value.
    pub fn insert(&mut self, name: AttributeName, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k.matches(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k.as_str()) == Some(v.as_str()))
    }
}

impl Eq for Attributes {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JarError;

    #[test]
    fn get_and_put_ignore_case() {
        let mut attrs = Attributes::new();
        assert_eq!(attrs.put("Main-Class", "a.Main").unwrap(), None);
        assert_eq!(attrs.get("MAIN-CLASS"), Some("a.Main"));
        assert_eq!(
            attrs.put("main-class", "b.Main").unwrap(),
            Some("a.Main".to_string())
        );
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("Main-Class"), Some("b.Main"));
    }

    #[test]
    fn put_rejects_invalid_name() {
        let mut attrs = Attributes::new();
        assert!(matches!(
            attrs.put("bad name", "x"),
            Err(JarError::InvalidName { .. })
        ));
        assert!(attrs.is_empty());
    }

    #[test]
    fn equality_is_structural() {
        let mut a = Attributes::new();
        a.put("A", "1").unwrap();
        a.put("B", "2").unwrap();
        let mut b = Attributes::new();
        b.put("b", "2").unwrap();
        b.put("a", "1").unwrap();
        assert_eq!(a, b);

        b.put("a", "3").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = Attributes::new();
        a.put("Key", "v").unwrap();
        let mut b = a.clone();
        b.put("Key", "changed").unwrap();
        b.remove("Key");
        assert_eq!(a.get("Key"), Some("v"));
        assert!(b.is_empty());
    }
}
