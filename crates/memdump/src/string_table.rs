use std::io::Read;
use std::sync::Arc;

use crate::error::{MemdumpError, Result};
use crate::wire::TraceReader;

/// Stacktrace strings of a trace, addressed by their 0-based decode order.
///
/// Entries are shared with the call sites that reference them, so the table
/// stays immutable once decoded.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    entries: Vec<Arc<str>>,
}

impl StringTable {
    /// Decodes exactly `count` length-prefixed UTF-8 records.
    pub(crate) fn decode<R: Read>(reader: &mut TraceReader<R>, count: u32) -> Result<Self> {
        let mut entries = Vec::new();

        for index in 0..count {
            let len = reader.read_u32("stacktrace length")?;
            let start = reader.offset();
            let bytes = reader.read_bytes(len, "stacktrace")?;
            let text = String::from_utf8(bytes).map_err(|err| {
                MemdumpError::malformed(
                    start,
                    format!("stacktrace {index} is not valid UTF-8: {err}"),
                )
            })?;
            entries.push(Arc::from(text));
        }

        Ok(Self { entries })
    }

    /// Decodes a standalone string table of `count` entries from `source`.
    pub fn decode_from<R: Read>(source: R, count: u32) -> Result<Self> {
        Self::decode(&mut TraceReader::new(source), count)
    }

    pub fn get(&self, index: u32) -> Option<&Arc<str>> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| &**entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(strings: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for s in strings {
            bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
            bytes.extend_from_slice(s.as_bytes());
        }
        bytes
    }

    #[test]
    fn test_decodes_in_order() {
        let bytes = encode(&["main", "", "alloc_tracker.cpp:42\nmain"]);
        let table = StringTable::decode_from(&bytes[..], 3).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0).map(|s| &**s), Some("main"));
        assert_eq!(table.get(1).map(|s| &**s), Some(""));
        assert_eq!(
            table.get(2).map(|s| &**s),
            Some("alloc_tracker.cpp:42\nmain")
        );
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_consumes_exactly_count_entries() {
        let bytes = encode(&["a", "b", "c"]);
        let mut reader = TraceReader::new(&bytes[..]);
        let table = StringTable::decode(&mut reader, 2).unwrap();

        assert_eq!(table.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(reader.offset(), 10);
    }

    #[test]
    fn test_oversized_length_is_malformed() {
        let mut bytes = 100u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");

        let err = StringTable::decode_from(&bytes[..], 1).unwrap_err();
        assert!(matches!(err, MemdumpError::MalformedTrace { offset: 4, .. }));
    }

    #[test]
    fn test_missing_entry_is_malformed() {
        let bytes = encode(&["only"]);
        let err = StringTable::decode_from(&bytes[..], 2).unwrap_err();
        assert!(matches!(err, MemdumpError::MalformedTrace { offset: 8, .. }));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xc3, 0x28]);

        let err = StringTable::decode_from(&bytes[..], 1).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }
}
