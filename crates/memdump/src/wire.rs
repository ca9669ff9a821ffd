//! Little-endian primitives shared by the trace decoder and encoder.

use std::io::{self, Read, Write};

use crate::error::{MemdumpError, Result};

pub(crate) const TAG_ALLOC: u32 = 1;
pub(crate) const TAG_FREE: u32 = 2;

/// Byte-counting reader over a trace stream.
///
/// Every read either fills the requested width or fails with
/// [`MemdumpError::MalformedTrace`] pointing at the offset where the read started.
#[derive(Debug)]
pub(crate) struct TraceReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> TraceReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn read_u32(&mut self, field: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(MemdumpError::malformed(
                    self.offset,
                    format!("unexpected end of stream while reading {field}"),
                ));
            }
            Err(err) => return Err(err.into()),
        }
        self.offset += 4;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads exactly `len` bytes without trusting `len` for the up-front allocation.
    pub(crate) fn read_bytes(&mut self, len: u32, field: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.inner)
            .take(u64::from(len))
            .read_to_end(&mut buf)?;

        if read < len as usize {
            return Err(MemdumpError::malformed(
                self.offset,
                format!("{field} claims {len} bytes but only {read} remain"),
            ));
        }

        self.offset += u64::from(len);
        Ok(buf)
    }
}

pub(crate) fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}
