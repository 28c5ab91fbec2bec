//! Container collaborators: named-section byte readers for map units.
//!
//! A container is opened by name through a [`ContainerOpener`] and exposes
//! its sections (header, index, feature data) as immutable byte buffers.
//! Two implementations are provided:
//!
//! - [`MemoryOpener`] serves [`MemoryContainer`]s that can be inserted,
//!   replaced and removed at runtime.
//! - [`DirectoryOpener`] reads `<dir>/<name>.mwm` files written by
//!   [`ContainerWriter`]. Sections are read on demand, one seek and one read
//!   each, and verified against a CRC32 stored in the table of contents.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{ErrorKind, MapError, MapResult};

/// Magic number of container files ("MUNT").
pub const MAGIC: u32 = 0x4D55_4E54;
/// Container file layout version.
pub const VERSION: u32 = 1;
/// File extension used by [`DirectoryOpener`].
pub const CONTAINER_EXTENSION: &str = "mwm";

/// Low-level container failures.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid container format: {0}")]
    Format(String),

    #[error("Section {0} not found")]
    MissingSection(String),

    #[error("Section {tag} checksum mismatch (expected: {expected:x}, got: {actual:x})")]
    Checksum {
        tag: String,
        expected: u32,
        actual: u32,
    },
}

impl From<ContainerError> for MapError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Io(io_err) => MapError::from(io_err),
            other => MapError::new(&other.to_string(), ErrorKind::OpenFailed),
        }
    }
}

/// An opened unit container.
pub trait MapContainer: Send + Sync + Debug {
    /// Unit name the container was opened for.
    fn name(&self) -> &str;

    /// Bytes of the section named `tag`.
    fn section(&self, tag: &str) -> MapResult<Arc<[u8]>>;

    fn has_section(&self, tag: &str) -> bool;
}

/// Opens containers by unit name.
pub trait ContainerOpener: Send + Sync {
    fn open(&self, name: &str) -> MapResult<Box<dyn MapContainer>>;
}

/// A container whose sections live in memory.
#[derive(Clone, Debug)]
pub struct MemoryContainer {
    name: String,
    sections: HashMap<String, Arc<[u8]>>,
}

impl MemoryContainer {
    pub fn new(name: &str) -> Self {
        MemoryContainer {
            name: name.to_string(),
            sections: HashMap::new(),
        }
    }

    pub fn with_section(mut self, tag: &str, bytes: Vec<u8>) -> Self {
        self.insert_section(tag, bytes);
        self
    }

    pub fn insert_section(&mut self, tag: &str, bytes: Vec<u8>) {
        self.sections.insert(tag.to_string(), Arc::from(bytes));
    }

    pub fn remove_section(&mut self, tag: &str) -> bool {
        self.sections.remove(tag).is_some()
    }
}

impl MapContainer for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn section(&self, tag: &str) -> MapResult<Arc<[u8]>> {
        self.sections
            .get(tag)
            .cloned()
            .ok_or_else(|| ContainerError::MissingSection(tag.to_string()).into())
    }

    fn has_section(&self, tag: &str) -> bool {
        self.sections.contains_key(tag)
    }
}

/// Serves [`MemoryContainer`]s by name.
///
/// Replacing a container simulates a newer file version arriving after a
/// download; units already opened keep the sections they were opened with.
#[derive(Default)]
pub struct MemoryOpener {
    containers: RwLock<HashMap<String, MemoryContainer>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the container published under its name.
    pub fn insert(&self, container: MemoryContainer) {
        self.containers
            .write()
            .insert(container.name.clone(), container);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.containers.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.read().contains_key(name)
    }
}

impl ContainerOpener for MemoryOpener {
    fn open(&self, name: &str) -> MapResult<Box<dyn MapContainer>> {
        match self.containers.read().get(name) {
            Some(container) => Ok(Box::new(container.clone())),
            None => {
                log::error!("No container published for unit {}", name);
                Err(MapError::new(
                    &format!("No container published for unit {}", name),
                    ErrorKind::OpenFailed,
                ))
            }
        }
    }
}

/// Table of contents entry of a container file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SectionEntry {
    tag: String,
    offset: u64,
    len: u64,
    checksum: u32,
}

/// Fixed-size prefix of a container file: magic, version, TOC length.
const PREFIX_LEN: u64 = 16;

/// A container file opened from disk.
///
/// Only the table of contents is read on open; section bytes are read when
/// requested.
#[derive(Debug)]
pub struct FileContainer {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
    data_start: u64,
    toc: HashMap<String, SectionEntry>,
}

impl FileContainer {
    pub fn open(name: &str, path: &Path) -> Result<Self, ContainerError> {
        let mut file = OpenOptions::new().read(true).open(path)?;

        let mut prefix = [0u8; PREFIX_LEN as usize];
        file.read_exact(&mut prefix)?;
        let magic = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if magic != MAGIC {
            return Err(ContainerError::Format(format!(
                "bad magic {:x} in {}",
                magic,
                path.display()
            )));
        }
        let version = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if version != VERSION {
            return Err(ContainerError::Format(format!(
                "unsupported version {} in {}",
                version,
                path.display()
            )));
        }
        let mut toc_len = [0u8; 8];
        toc_len.copy_from_slice(&prefix[8..16]);
        let toc_len = u64::from_le_bytes(toc_len);

        let file_len = file.metadata()?.len();
        let data_start = match PREFIX_LEN.checked_add(toc_len) {
            Some(end) if end <= file_len => end,
            _ => {
                return Err(ContainerError::Format(format!(
                    "table of contents of {} bytes exceeds file {} of {} bytes",
                    toc_len,
                    path.display(),
                    file_len
                )))
            }
        };

        let mut toc_bytes = vec![0u8; toc_len as usize];
        file.read_exact(&mut toc_bytes)?;
        let entries: Vec<SectionEntry> =
            bincode::serde::decode_from_slice(&toc_bytes, bincode::config::legacy())
                .map(|(entries, _)| entries)
                .map_err(|e| ContainerError::Format(e.to_string()))?;

        let data_len = file_len - data_start;
        for entry in &entries {
            let in_bounds = entry
                .offset
                .checked_add(entry.len)
                .is_some_and(|end| end <= data_len);
            if !in_bounds {
                return Err(ContainerError::Format(format!(
                    "section {} at {}+{} lies outside {}",
                    entry.tag,
                    entry.offset,
                    entry.len,
                    path.display()
                )));
            }
        }

        Ok(FileContainer {
            name: name.to_string(),
            path: path.to_path_buf(),
            file: Mutex::new(file),
            data_start,
            toc: entries.into_iter().map(|e| (e.tag.clone(), e)).collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_section(&self, tag: &str) -> Result<Vec<u8>, ContainerError> {
        let entry = self
            .toc
            .get(tag)
            .ok_or_else(|| ContainerError::MissingSection(tag.to_string()))?;

        let mut buffer = vec![0u8; entry.len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.data_start + entry.offset))?;
            file.read_exact(&mut buffer)?;
        }

        let actual = crc32(&buffer);
        if actual != entry.checksum {
            return Err(ContainerError::Checksum {
                tag: tag.to_string(),
                expected: entry.checksum,
                actual,
            });
        }
        Ok(buffer)
    }
}

impl MapContainer for FileContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn section(&self, tag: &str) -> MapResult<Arc<[u8]>> {
        self.read_section(tag).map(Arc::from).map_err(|e| {
            log::error!("Failed to read section {} of {}: {}", tag, self.path.display(), e);
            e.into()
        })
    }

    fn has_section(&self, tag: &str) -> bool {
        self.toc.contains_key(tag)
    }
}

/// Opens `<root>/<name>.mwm` container files.
#[derive(Clone, Debug)]
pub struct DirectoryOpener {
    root: PathBuf,
}

impl DirectoryOpener {
    pub fn new(root: impl AsRef<Path>) -> Self {
        DirectoryOpener {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the container file backing unit `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, CONTAINER_EXTENSION))
    }
}

impl ContainerOpener for DirectoryOpener {
    fn open(&self, name: &str) -> MapResult<Box<dyn MapContainer>> {
        let path = self.path_for(name);
        match FileContainer::open(name, &path) {
            Ok(container) => Ok(Box::new(container)),
            Err(e) => {
                log::error!("Failed to open container {}: {}", path.display(), e);
                Err(MapError::new_with_cause(
                    &format!("Failed to open container {}", path.display()),
                    ErrorKind::OpenFailed,
                    e.into(),
                ))
            }
        }
    }
}

/// Writes a container file section by section.
#[derive(Debug, Default)]
pub struct ContainerWriter {
    sections: Vec<(String, Vec<u8>)>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the section `tag`.
    pub fn add_section(&mut self, tag: &str, bytes: Vec<u8>) -> &mut Self {
        self.sections.retain(|(t, _)| t != tag);
        self.sections.push((tag.to_string(), bytes));
        self
    }

    pub fn write(&self, path: impl AsRef<Path>) -> MapResult<()> {
        let mut entries = Vec::with_capacity(self.sections.len());
        let mut offset = 0u64;
        for (tag, bytes) in &self.sections {
            entries.push(SectionEntry {
                tag: tag.clone(),
                offset,
                len: bytes.len() as u64,
                checksum: crc32(bytes),
            });
            offset += bytes.len() as u64;
        }
        let toc = bincode::serde::encode_to_vec(&entries, bincode::config::legacy()).map_err(
            |e| {
                MapError::new(
                    &format!("Failed to encode table of contents: {}", e),
                    ErrorKind::InternalError,
                )
            },
        )?;

        // Written beside the target and renamed over it, so handles opened on
        // the previous version keep reading the previous version.
        let path = path.as_ref();
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)?;
        file.write_all(&MAGIC.to_le_bytes())?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&(toc.len() as u64).to_le_bytes())?;
        file.write_all(&toc)?;
        for (_, bytes) in &self.sections {
            file.write_all(bytes)?;
        }
        file.sync_all()?;
        drop(file);
        std::fs::rename(&staging, path)?;
        Ok(())
    }
}

/// CRC32-MPEG2 of `data`.
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}
