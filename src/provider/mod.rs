//! Byte sources that values are read from and written to
//!
//! A [`Provider`] maps absolute addresses to bytes. Reads never fail hard:
//! an unreadable range comes back zero-filled together with an error that
//! callers are free to ignore. Writes report failure and leave the source
//! untouched.
//!
//! ## Implementations
//!
//! - [`NullProvider`]: no source attached
//! - [`BufferProvider`]: an in-memory byte buffer, optionally loaded from a file
//! - [`AffineProvider`]: runs another provider on a dedicated thread

mod affine;
mod buffer;
mod null;

pub use affine::AffineProvider;
pub use buffer::BufferProvider;
pub use null::NullProvider;

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::error::{Error, Result};

/// Source of raw bytes for value decode and encode
pub trait Provider {
    /// Number of addressable bytes starting at [`base`](Provider::base)
    fn size(&self) -> u64;

    /// Fill `buf` from `addr`.
    ///
    /// On error `buf` is zero-filled.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Whether `len` bytes at `addr` lie inside the source
    fn is_readable(&self, addr: u64, len: usize) -> bool {
        let base = self.base();
        addr >= base
            && (addr - base)
                .checked_add(len as u64)
                .map_or(false, |end| end <= self.size())
    }

    fn is_writable(&self) -> bool {
        false
    }

    /// Write `data` at `addr`; nothing is written on error
    fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let _ = (addr, data);
        Err(Error::Provider(format!("{} source is read-only", self.kind())))
    }

    /// Display name of the source, empty when nothing is attached
    fn name(&self) -> String {
        String::new()
    }

    /// Short source category such as "File" or "Process"
    fn kind(&self) -> String {
        "None".to_string()
    }

    /// Whether the bytes can change underneath the reader
    fn is_live(&self) -> bool {
        false
    }

    /// Address that maps to the first byte of the source
    fn base(&self) -> u64 {
        0
    }

    fn set_base(&mut self, base: u64) {
        let _ = base;
    }

    /// Symbol covering `addr`, if the source knows one
    fn get_symbol(&self, addr: u64) -> Option<String> {
        let _ = addr;
        None
    }

    fn is_valid(&self) -> bool {
        !self.name().is_empty()
    }

    /// Read `len` bytes, zero-filled where unreadable
    fn read_bytes(&self, addr: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        if let Err(e) = self.read(addr, &mut buf) {
            trace!("Read of {} bytes at {:#x} failed: {}", len, addr, e);
            buf.fill(0);
        }
        buf
    }

    fn read_u8(&self, addr: u64) -> u8 {
        self.read_bytes(addr, 1)[0]
    }

    fn read_u16(&self, addr: u64) -> u16 {
        LittleEndian::read_u16(&self.read_bytes(addr, 2))
    }

    fn read_u32(&self, addr: u64) -> u32 {
        LittleEndian::read_u32(&self.read_bytes(addr, 4))
    }

    fn read_u64(&self, addr: u64) -> u64 {
        LittleEndian::read_u64(&self.read_bytes(addr, 8))
    }

    fn read_f32(&self, addr: u64) -> f32 {
        LittleEndian::read_f32(&self.read_bytes(addr, 4))
    }

    fn read_f64(&self, addr: u64) -> f64 {
        LittleEndian::read_f64(&self.read_bytes(addr, 8))
    }

    /// Write after checking that the source accepts writes
    fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::Provider(format!(
                "{} source is read-only",
                self.kind()
            )));
        }
        self.write(addr, data)
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn is_readable(&self, addr: u64, len: usize) -> bool {
        (**self).is_readable(addr, len)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn kind(&self) -> String {
        (**self).kind()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }

    fn base(&self) -> u64 {
        (**self).base()
    }

    fn set_base(&mut self, base: u64) {
        (**self).set_base(base)
    }

    fn get_symbol(&self, addr: u64) -> Option<String> {
        (**self).get_symbol(addr)
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }
}
