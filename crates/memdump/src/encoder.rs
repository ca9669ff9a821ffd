use std::io::{self, Write};

use crate::space::Space;
use crate::wire::{write_u32, TAG_ALLOC, TAG_FREE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawEvent {
    Alloc {
        id: u32,
        size: u32,
        space_code: u32,
        stacktrace_index: u32,
    },
    Free {
        id: u32,
    },
}

/// Writes traces in the layout read by [`TraceDecoder`](crate::TraceDecoder).
///
/// Header counts are derived from what was pushed unless overridden.
///
/// # Examples
///
/// ```rust
/// use memdump::{decode, Space, TraceEncoder, TraceFilter};
///
/// let mut encoder = TraceEncoder::new();
/// let main = encoder.stacktrace("main");
/// encoder.alloc(1, 100, Space::Object, main).free(1);
///
/// let session = decode(&encoder.to_bytes()[..], TraceFilter::all()).unwrap();
/// assert_eq!(session.counters().total_allocated, 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceEncoder {
    stacktraces: Vec<String>,
    events: Vec<RawEvent>,
    item_count: Option<u32>,
}

impl TraceEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stacktrace string and returns its index.
    pub fn stacktrace(&mut self, text: impl Into<String>) -> u32 {
        self.stacktraces.push(text.into());
        (self.stacktraces.len() - 1) as u32
    }

    pub fn alloc(&mut self, id: u32, size: u32, space: Space, stacktrace_index: u32) -> &mut Self {
        self.alloc_raw(id, size, space.code(), stacktrace_index)
    }

    /// Like [`alloc`](Self::alloc) but with an unchecked space code.
    pub fn alloc_raw(
        &mut self,
        id: u32,
        size: u32,
        space_code: u32,
        stacktrace_index: u32,
    ) -> &mut Self {
        self.events.push(RawEvent::Alloc {
            id,
            size,
            space_code,
            stacktrace_index,
        });
        self
    }

    pub fn free(&mut self, id: u32) -> &mut Self {
        self.events.push(RawEvent::Free { id });
        self
    }

    /// Forces the header's item count, e.g. to describe a truncated dump.
    pub fn item_count(&mut self, count: u32) -> &mut Self {
        self.item_count = Some(count);
        self
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let item_count = self.item_count.unwrap_or(self.events.len() as u32);
        write_u32(out, item_count)?;
        write_u32(out, self.stacktraces.len() as u32)?;

        for text in &self.stacktraces {
            write_u32(out, text.len() as u32)?;
            out.write_all(text.as_bytes())?;
        }

        for event in &self.events {
            match *event {
                RawEvent::Alloc {
                    id,
                    size,
                    space_code,
                    stacktrace_index,
                } => {
                    for value in [TAG_ALLOC, id, size, space_code, stacktrace_index] {
                        write_u32(out, value)?;
                    }
                }
                RawEvent::Free { id } => {
                    write_u32(out, TAG_FREE)?;
                    write_u32(out, id)?;
                }
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_format() {
        let mut encoder = TraceEncoder::new();
        let main = encoder.stacktrace("main");
        encoder.alloc(1, 100, Space::Object, main).free(1);

        let words = |bytes: &[u8]| -> Vec<u32> {
            bytes
                .chunks(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };

        let bytes = encoder.to_bytes();
        // header, "main" length, "main", alloc (5 words), free (2 words)
        assert_eq!(bytes.len(), 8 + 4 + 4 + 20 + 8);
        assert_eq!(words(&bytes[..12]), vec![2, 1, 4]);
        assert_eq!(&bytes[12..16], b"main");
        assert_eq!(words(&bytes[16..]), vec![1, 1, 100, 1, 0, 2, 1]);
    }

    #[test]
    fn test_item_count_override() {
        let mut encoder = TraceEncoder::new();
        encoder.free(3).item_count(5);

        let bytes = encoder.to_bytes();
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(encoder.event_count(), 1);
    }
}
