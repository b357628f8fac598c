//! Verification settings.
//!
//! Settings are passed explicitly into a [`crate::JarFile`]; nothing is kept
//! in process-wide state.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `JARSIG_VERIFY` | `0`/`false` disables signature processing (default: on) |
//! | `JARSIG_MAX_META_SIZE` | Largest `.SF`/block file buffered, in bytes (default: 8 MiB) |
//! | `JARSIG_MAX_MANIFEST_SIZE` | Largest `MANIFEST.MF` read, in bytes (default: 10 MiB) |
//! | `JARSIG_MAX_ENTRY_SIZE` | Largest entry loaded into memory from a tar, in bytes (default: 1 GiB) |

/// Default cap on a buffered signature-related file.
pub const DEFAULT_MAX_META_ENTRY_SIZE: usize = 8 * 1024 * 1024;

/// Default cap on the manifest.
pub const DEFAULT_MAX_MANIFEST_SIZE: u64 = 10 * 1024 * 1024;

/// Default cap on one entry loaded into a [`crate::jar::MemoryArchive`].
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Process signature metadata at all. When off, every entry reads as
    /// unsigned.
    pub verify: bool,

    /// `.SF` and block files larger than this are discarded, so the signer
    /// they belong to contributes nothing.
    pub max_meta_entry_size: usize,

    /// A manifest larger than this fails with `TooLarge`.
    pub max_manifest_size: u64,

    /// Entries larger than this are refused when loading an archive into
    /// memory.
    pub max_entry_size: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            verify: true,
            max_meta_entry_size: DEFAULT_MAX_META_ENTRY_SIZE,
            max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

impl VerifyConfig {
    /// Defaults overridden by `JARSIG_*` environment variables. Unparseable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("JARSIG_VERIFY") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => config.verify = false,
                "1" | "true" | "yes" | "on" => config.verify = true,
                other => tracing::warn!(value = other, "ignoring invalid JARSIG_VERIFY"),
            }
        }

        if let Some(size) = parse_size::<usize>(&lookup, "JARSIG_MAX_META_SIZE") {
            config.max_meta_entry_size = size;
        }
        if let Some(size) = parse_size::<u64>(&lookup, "JARSIG_MAX_MANIFEST_SIZE") {
            config.max_manifest_size = size;
        }
        if let Some(size) = parse_size::<u64>(&lookup, "JARSIG_MAX_ENTRY_SIZE") {
            config.max_entry_size = size;
        }

        config
    }

    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn max_meta_entry_size(mut self, size: usize) -> Self {
        self.max_meta_entry_size = size;
        self
    }

    pub fn max_manifest_size(mut self, size: u64) -> Self {
        self.max_manifest_size = size;
        self
    }

    pub fn max_entry_size(mut self, size: u64) -> Self {
        self.max_entry_size = size;
        self
    }
}

fn parse_size<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(size) => Some(size),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid size");
            None
        }
    }
}
