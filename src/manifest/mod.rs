//! Manifest model and its line-oriented text codec.
//!
//! A manifest is a main attribute section followed by named per-entry
//! sections. Signature files (`.SF`) share the same format, so the codec is
//! used for both.

pub mod attributes;
pub mod codec;
pub mod name;

use std::collections::HashMap;

pub use attributes::Attributes;
pub use name::AttributeName;

/// Archive path of the manifest.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Parsed manifest: main attributes plus named sections in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    main: Attributes,
    entries: Vec<(String, Attributes)>,
    index: HashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest bytes. See [`codec::parse`].
    pub fn parse(bytes: &[u8]) -> crate::JarResult<Self> {
        codec::parse(bytes)
    }

    /// Serialize with CRLF line endings and 72-byte line wrapping.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::to_bytes(self)
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.main
    }

    /// Attributes of the section named `name`, if any.
    pub fn attributes(&self, name: &str) -> Option<&Attributes> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Attributes of the section named `name`, creating an empty section if
    /// there is none.
    pub fn entry_mut(&mut self, name: &str) -> &mut Attributes {
        let idx = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.entries.push((name.to_string(), Attributes::new()));
                let i = self.entries.len() - 1;
                self.index.insert(name.to_string(), i);
                i
            }
        };
        &mut self.entries[idx].1
    }

    /// Replace the section named `name`. Returns the previous attributes.
    pub fn insert_entry(&mut self, name: impl Into<String>, attrs: Attributes) -> Option<Attributes> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, attrs)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, attrs));
                None
            }
        }
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<Attributes> {
        let idx = self.index.remove(name)?;
        let (_, attrs) = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(attrs)
    }

    /// Named sections in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Attributes)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.main == other.main
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(name, attrs)| other.attributes(name) == Some(attrs))
    }
}

impl Eq for Manifest {}
