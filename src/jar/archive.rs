//! Archive readers.
//!
//! The verifier only needs named lookup, a content stream, and the list of
//! names in archive order. Container formats live behind [`ArchiveReader`].

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::JarError;
use crate::manifest::MANIFEST_NAME;

/// Metadata of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

pub trait ArchiveReader: Send + Sync {
    fn lookup_entry(&self, name: &str) -> Option<EntryMeta>;

    fn open_stream(&self, entry: &EntryMeta) -> io::Result<Box<dyn Read + Send + '_>>;

    /// All entry names in archive order.
    fn list_entry_names(&self) -> Vec<String>;
}

/// Ordered in-memory archive.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<(EntryMeta, Arc<[u8]>)>,
    index: HashMap<String, usize>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, replacing any entry of the same name in place.
    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        let meta = EntryMeta {
            name: name.into(),
            size: data.len() as u64,
            is_directory: false,
        };
        self.push(meta, data.into());
    }

    pub fn add_directory(&mut self, name: impl Into<String>) {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        let meta = EntryMeta {
            name,
            size: 0,
            is_directory: true,
        };
        self.push(meta, Arc::from(&[][..]));
    }

    fn push(&mut self, meta: EntryMeta, data: Arc<[u8]>) {
        match self.index.get(&meta.name) {
            Some(&i) => self.entries[i] = (meta, data),
            None => {
                self.index.insert(meta.name.clone(), self.entries.len());
                self.entries.push((meta, data));
            }
        }
    }

    /// Load regular files and directories from a tar stream. Other entry
    /// types (links, devices) are skipped. A file larger than
    /// `max_entry_size` fails with [`JarError::TooLarge`] before any of it
    /// is buffered.
    pub fn from_tar<R: Read>(reader: R, max_entry_size: u64) -> io::Result<Self> {
        let mut archive = tar::Archive::new(reader);
        let mut out = Self::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().to_string();
            let name = path.strip_prefix("./").unwrap_or(&path).to_string();
            if name.is_empty() {
                continue;
            }

            let kind = entry.header().entry_type();
            if kind.is_dir() {
                out.add_directory(name);
            } else if kind.is_file() {
                if entry.size() > max_entry_size {
                    return Err(JarError::TooLarge {
                        name,
                        limit: max_entry_size,
                    }
                    .into());
                }
                let mut data = Vec::new();
                LimitReader::new(&mut entry, max_entry_size, &name).read_to_end(&mut data)?;
                out.add_file(name, data);
            } else {
                tracing::debug!(name = %name, "skipping non-file tar entry");
            }
        }

        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArchiveReader for MemoryArchive {
    fn lookup_entry(&self, name: &str) -> Option<EntryMeta> {
        self.index.get(name).map(|&i| self.entries[i].0.clone())
    }

    fn open_stream(&self, entry: &EntryMeta) -> io::Result<Box<dyn Read + Send + '_>> {
        let &i = self.index.get(&entry.name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry {}", entry.name))
        })?;
        Ok(Box::new(&self.entries[i].1[..]))
    }

    fn list_entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|(meta, _)| meta.name.clone()).collect()
    }
}

/// Reader that fails with [`JarError::TooLarge`] instead of yielding more
/// than `limit` bytes.
pub(crate) struct LimitReader<'a, R> {
    inner: R,
    limit: u64,
    read: u64,
    name: &'a str,
}

impl<'a, R: Read> LimitReader<'a, R> {
    pub(crate) fn new(inner: R, limit: u64, name: &'a str) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            name,
        }
    }
}

impl<R: Read> Read for LimitReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read >= self.limit {
            // exactly at the limit is fine if the stream ends here
            let mut probe = [0u8; 1];
            if self.inner.read(&mut probe)? == 0 {
                return Ok(0);
            }
            return Err(JarError::TooLarge {
                name: self.name.to_string(),
                limit: self.limit,
            }
            .into());
        }
        let max = usize::try_from(self.limit - self.read)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        self.read += n as u64;
        Ok(n)
    }
}

/// An exploded JAR directory.
///
/// Entries are listed with the manifest first, then the rest of `META-INF/`,
/// then everything else, each group sorted by name.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !fs::metadata(&root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` at archive name `name`, creating parent directories.
    pub fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid entry name {name}"))
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    /// Map an archive name to a path under the root. Names that would
    /// escape the root resolve to nothing.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let rel = Path::new(name.trim_end_matches('/'));
        if rel.as_os_str().is_empty() {
            return None;
        }
        let mut path = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let kind = entry.file_type()?;
            if kind.is_dir() {
                let name = format!("{prefix}{file_name}/");
                out.push(name.clone());
                self.walk(&entry.path(), &name, out)?;
            } else if kind.is_file() {
                out.push(format!("{prefix}{file_name}"));
            }
        }
        Ok(())
    }
}

fn listing_rank(name: &str) -> u8 {
    if name.eq_ignore_ascii_case(MANIFEST_NAME) {
        0
    } else if name.to_ascii_uppercase().starts_with("META-INF/") {
        1
    } else {
        2
    }
}

impl ArchiveReader for DirArchive {
    fn lookup_entry(&self, name: &str) -> Option<EntryMeta> {
        let meta = fs::metadata(self.resolve(name)?).ok()?;
        if meta.is_dir() {
            let name = if name.ends_with('/') {
                name.to_string()
            } else {
                format!("{name}/")
            };
            return Some(EntryMeta {
                name,
                size: 0,
                is_directory: true,
            });
        }
        if name.ends_with('/') {
            return None;
        }
        Some(EntryMeta {
            name: name.to_string(),
            size: meta.len(),
            is_directory: false,
        })
    }

    fn open_stream(&self, entry: &EntryMeta) -> io::Result<Box<dyn Read + Send + '_>> {
        if entry.is_directory {
            return Ok(Box::new(io::empty()));
        }
        let path = self.resolve(&entry.name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry {}", entry.name))
        })?;
        Ok(Box::new(fs::File::open(path)?))
    }

    fn list_entry_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Err(e) = self.walk(&self.root, "", &mut names) {
            tracing::warn!(root = %self.root.display(), error = %e, "directory walk failed");
        }
        names.sort_by(|a, b| listing_rank(a).cmp(&listing_rank(b)).then_with(|| a.cmp(b)));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_archive_keeps_order() {
        let mut a = MemoryArchive::new();
        a.add_file("b.txt", b"b".to_vec());
        a.add_directory("dir");
        a.add_file("a.txt", b"a".to_vec());
        a.add_file("b.txt", b"bb".to_vec());
        assert_eq!(a.list_entry_names(), ["b.txt", "dir/", "a.txt"]);

        let meta = a.lookup_entry("b.txt").unwrap();
        assert_eq!(meta.size, 2);
        let mut content = Vec::new();
        a.open_stream(&meta).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"bb");
        assert!(a.lookup_entry("dir/").unwrap().is_directory);
        assert!(a.lookup_entry("missing").is_none());
    }

    #[test]
    fn loads_from_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_path("./META-INF/").unwrap();
        header.set_cksum();
        builder.append(&header, io::empty()).unwrap();

        let data = b"Manifest-Version: 1.0\r\n\r\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_path("./META-INF/MANIFEST.MF").unwrap();
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let a = MemoryArchive::from_tar(&bytes[..], 1024).unwrap();
        assert_eq!(a.list_entry_names(), ["META-INF/", MANIFEST_NAME]);
        assert_eq!(a.lookup_entry(MANIFEST_NAME).unwrap().size, data.len() as u64);
    }

    #[test]
    fn tar_entry_over_limit_is_refused() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = [7u8; 32];
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_path("big.bin").unwrap();
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let err = MemoryArchive::from_tar(&bytes[..], 16).unwrap_err();
        assert!(matches!(
            JarError::from_io(&err),
            Some(JarError::TooLarge { name, limit: 16 }) if name == "big.bin"
        ));
        assert!(MemoryArchive::from_tar(&bytes[..], 32).is_ok());
    }

    #[test]
    fn huge_declared_tar_size_fails_without_allocating() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(1 << 46);
        header.set_mode(0o644);
        header.set_path("huge.bin").unwrap();
        header.set_cksum();
        builder.append(&header, io::empty()).unwrap();
        let bytes = builder.into_inner().unwrap();

        let err = MemoryArchive::from_tar(&bytes[..], crate::config::DEFAULT_MAX_ENTRY_SIZE)
            .unwrap_err();
        assert!(matches!(
            JarError::from_io(&err),
            Some(JarError::TooLarge { .. })
        ));
    }

    #[test]
    fn limit_reader_allows_exact_size() {
        let mut out = Vec::new();
        LimitReader::new(&b"abcd"[..], 4, "x")
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"abcd");

        let err = LimitReader::new(&b"abcde"[..], 4, "x")
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert!(matches!(JarError::from_io(&err), Some(JarError::TooLarge { .. })));
    }

    #[test]
    fn dir_archive_lists_meta_inf_first() {
        let tmp = tempfile::tempdir().unwrap();
        let a = DirArchive::open(tmp.path()).unwrap();
        a.write_file("com/example/A.class", b"class").unwrap();
        a.write_file("META-INF/SIGNER.SF", b"sf").unwrap();
        a.write_file(MANIFEST_NAME, b"mf").unwrap();
        a.write_file("README", b"readme").unwrap();

        assert_eq!(
            a.list_entry_names(),
            [
                MANIFEST_NAME,
                "META-INF/",
                "META-INF/SIGNER.SF",
                "README",
                "com/",
                "com/example/",
                "com/example/A.class",
            ]
        );
        let meta = a.lookup_entry("com/example/A.class").unwrap();
        assert_eq!(meta.size, 5);
        assert!(a.lookup_entry("com").unwrap().is_directory);
    }

    #[test]
    fn dir_archive_rejects_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let a = DirArchive::open(tmp.path()).unwrap();
        assert!(a.lookup_entry("../etc/passwd").is_none());
        assert!(a.write_file("/abs", b"x").is_err());
    }
}
