//! Provider used when no source is attached

use super::Provider;
use crate::error::{Error, Result};

/// Empty source: zero bytes, every read fails, nothing is writable
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

impl Provider for NullProvider {
    fn size(&self) -> u64 {
        0
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        Err(Error::Provider(format!(
            "no source attached (read at {:#x})",
            addr
        )))
    }
}
