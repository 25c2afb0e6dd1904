//! In-memory byte buffer provider

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::Provider;
use crate::error::{Error, Result};

/// Byte buffer addressed from [`base`](Provider::base)
#[derive(Debug, Clone, Default)]
pub struct BufferProvider {
    data: Vec<u8>,
    name: String,
    kind: String,
    base: u64,
}

impl BufferProvider {
    pub fn new(data: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            data,
            name: name.into(),
            kind: "Buffer".to_string(),
            base: 0,
        }
    }

    /// Load a whole file; the provider is named after the file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        info!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(Self {
            data,
            name,
            kind: "File".to_string(),
            base: 0,
        })
    }

    /// Like [`open`](Self::open), but an unreadable file gives an empty,
    /// unnamed provider
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::open(path).unwrap_or_else(|e| {
            warn!("Cannot load {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Write the current bytes to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, &self.data)?;
        info!("Saved {} bytes to {}", self.data.len(), path.display());
        Ok(())
    }

    /// Buffer range for `len` bytes at absolute `addr`
    fn range(&self, addr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl Provider for BufferProvider {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        match self.range(addr, buf.len()) {
            Some(range) => {
                buf.copy_from_slice(&self.data[range]);
                Ok(())
            }
            None => {
                buf.fill(0);
                Err(Error::Provider(format!(
                    "read of {} bytes at {:#x} is outside the buffer",
                    buf.len(),
                    addr
                )))
            }
        }
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len()).ok_or_else(|| {
            Error::Provider(format!(
                "write of {} bytes at {:#x} is outside the buffer",
                data.len(),
                addr
            ))
        })?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn base(&self) -> u64 {
        self.base
    }

    fn set_base(&mut self, base: u64) {
        self.base = base;
    }
}
