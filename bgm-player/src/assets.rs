//! Track assets
//!
//! The hosting environment resolves a file name to a seekable byte range, the
//! only I/O boundary of the playback worker. `DirectoryAssets` serves names from
//! a root folder; `AssetDescriptor::from_file_range` covers packed archives where
//! a track occupies a slice of a larger file.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves asset file names to readable byte ranges
pub trait AssetProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<AssetDescriptor>;
}

/// Seekable handle restricted to `[start, start + len)` of a file
#[derive(Debug)]
pub struct AssetDescriptor {
    name: String,
    file: File,
    start: u64,
    len: u64,
    pos: u64,
}

impl AssetDescriptor {
    /// Wrap a byte range of an already opened file
    pub fn from_file_range(name: impl Into<String>, mut file: File, start: u64, len: u64) -> Result<Self> {
        let name = name.into();
        let file_len = file.metadata()?.len();
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::Asset(format!("{}: range overflows", name)))?;
        if end > file_len {
            return Err(Error::Asset(format!(
                "{}: range {}..{} exceeds file length {}",
                name, start, end, file_len
            )));
        }
        file.seek(SeekFrom::Start(start))?;

        Ok(Self {
            name,
            file,
            start,
            len,
            pos: 0,
        })
    }

    /// Wrap a whole file
    pub fn from_file(name: impl Into<String>, file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Self::from_file_range(name, file, 0, len)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.len
    }

    /// File extension of the asset name, used as a format hint
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }
}

impl Read for AssetDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let read = self.file.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for AssetDescriptor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of asset")
        })?;

        // Past-the-end seeks are allowed, reads there return 0
        let absolute = self.start.checked_add(target).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek beyond addressable range")
        })?;
        self.file.seek(SeekFrom::Start(absolute))?;
        self.pos = target;
        Ok(target)
    }
}

impl symphonia::core::io::MediaSource for AssetDescriptor {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// Serves assets from a folder on disk
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a name to a path under the root, refusing anything that escapes it
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let normal_only = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !normal_only {
            return Err(Error::Asset(format!("invalid asset name: {:?}", name)));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetProvider for DirectoryAssets {
    fn open(&self, name: &str) -> Result<AssetDescriptor> {
        let path = self.resolve(name)?;
        debug!("Opening asset {}", path.display());

        let file = File::open(&path)
            .map_err(|e| Error::Asset(format!("failed to open {}: {}", path.display(), e)))?;
        AssetDescriptor::from_file(name, file)
    }
}
