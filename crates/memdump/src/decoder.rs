//! Streaming decoder for the binary allocation trace.
//!
//! Layout, all integers unsigned 32-bit little-endian:
//!
//! ```text
//! header:        item_count, stacktrace_count
//! stacktraces:   stacktrace_count × (length, length bytes of UTF-8)
//! events:        item_count × event
//! event (alloc): tag=1, alloc_id, size, space_code, stacktrace_index
//! event (free):  tag=2, alloc_id
//! ```
//!
//! Events are applied strictly in stream order, which is the only
//! happens-before relation the format carries.

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MemdumpError, Result};
use crate::ledger::AllocationLedger;
use crate::space::{Space, SpaceFilter};
use crate::string_table::StringTable;
use crate::wire::{TraceReader, TAG_ALLOC, TAG_FREE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub item_count: u32,
    pub stacktrace_count: u32,
}

/// Alloc record with its space and stacktrace already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocEvent {
    pub id: u32,
    pub size: u32,
    pub space: Space,
    pub stacktrace_index: u32,
    pub stacktrace: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Alloc(AllocEvent),
    Free { id: u32 },
}

/// Decides which alloc events are accounted. Frees are never filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceFilter {
    pub space: SpaceFilter,
    pub substring: Option<String>,
}

impl TraceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(space: SpaceFilter, substring: Option<String>) -> Self {
        Self { space, substring }
    }

    pub fn accepts(&self, space: Space, stacktrace: &str) -> bool {
        if !self.space.matches(space) {
            return false;
        }
        match &self.substring {
            Some(needle) => stacktrace.contains(needle.as_str()),
            None => true,
        }
    }
}

/// Run-wide byte counters of one decode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraceCounters {
    /// Sum of all accepted alloc sizes, never decreases.
    pub total_allocated: u64,
    pub current_allocated: u64,
    /// Running maximum of `current_allocated`.
    pub peak_allocated: u64,
    /// Allocs that reused a still-live id.
    pub duplicate_allocations: u64,
    /// Frees whose id was not live.
    pub unmatched_frees: u64,
}

impl TraceCounters {
    fn on_alloc(&mut self, size: u32) {
        let size = u64::from(size);
        self.total_allocated = self.total_allocated.saturating_add(size);
        self.current_allocated = self.current_allocated.saturating_add(size);
        self.peak_allocated = self.peak_allocated.max(self.current_allocated);
    }

    fn on_free(&mut self, size: u32) {
        self.current_allocated = self.current_allocated.saturating_sub(u64::from(size));
    }
}

/// Pulls events one at a time from a trace stream.
///
/// The header and the whole string table are read eagerly by [`TraceDecoder::new`];
/// events are decoded lazily by [`TraceDecoder::next_event`].
#[derive(Debug)]
pub struct TraceDecoder<R> {
    reader: TraceReader<R>,
    header: TraceHeader,
    strings: StringTable,
    remaining: u32,
}

impl<R: Read> TraceDecoder<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut reader = TraceReader::new(source);
        let item_count = reader.read_u32("item count")?;
        let stacktrace_count = reader.read_u32("stacktrace count")?;
        debug!(item_count, stacktrace_count, "decoding trace header");

        let strings = StringTable::decode(&mut reader, stacktrace_count)?;

        Ok(Self {
            reader,
            header: TraceHeader {
                item_count,
                stacktrace_count,
            },
            strings,
            remaining: item_count,
        })
    }

    pub fn header(&self) -> TraceHeader {
        self.header
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Number of events the header still promises.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Decodes the next event, or `None` once `item_count` events were read.
    /// Bytes after the last promised event are left unread.
    pub fn next_event(&mut self) -> Result<Option<TraceEvent>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let tag_offset = self.reader.offset();
        let event = match self.reader.read_u32("event tag")? {
            TAG_ALLOC => TraceEvent::Alloc(self.read_alloc()?),
            TAG_FREE => TraceEvent::Free {
                id: self.reader.read_u32("free alloc id")?,
            },
            tag => {
                return Err(MemdumpError::malformed(
                    tag_offset,
                    format!("invalid event tag {tag}"),
                ));
            }
        };

        self.remaining -= 1;
        Ok(Some(event))
    }

    fn read_alloc(&mut self) -> Result<AllocEvent> {
        let id = self.reader.read_u32("alloc id")?;
        let size = self.reader.read_u32("alloc size")?;
        let space = Space::from_code(self.reader.read_u32("space code")?)?;
        let index_offset = self.reader.offset();
        let stacktrace_index = self.reader.read_u32("stacktrace index")?;

        let stacktrace = self.strings.get(stacktrace_index).cloned().ok_or_else(|| {
            MemdumpError::malformed(
                index_offset,
                format!(
                    "stacktrace index {stacktrace_index} out of range ({} stacktraces)",
                    self.strings.len()
                ),
            )
        })?;

        Ok(AllocEvent {
            id,
            size,
            space,
            stacktrace_index,
            stacktrace,
        })
    }

    /// Applies every remaining event to a fresh session.
    pub fn decode(mut self, filter: TraceFilter) -> Result<DecodeSession> {
        let mut session = DecodeSession::new(self.header, filter);

        while let Some(event) = self.next_event()? {
            session.apply(event);
        }

        session.strings = self.strings;
        debug!(
            total_allocated = session.counters.total_allocated,
            peak_allocated = session.counters.peak_allocated,
            current_allocated = session.counters.current_allocated,
            call_sites = session.ledger.call_site_count(),
            "trace decoded"
        );

        Ok(session)
    }
}

impl<R: Read> Iterator for TraceDecoder<R> {
    type Item = Result<TraceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(event) => event.map(Ok),
            Err(err) => {
                // A failed read leaves the stream position undefined.
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

/// State of one decode run: string table, ledger and counters.
///
/// Sessions share nothing, so independent traces can be decoded side by side.
#[derive(Debug)]
pub struct DecodeSession {
    header: TraceHeader,
    strings: StringTable,
    ledger: AllocationLedger,
    counters: TraceCounters,
    filter: TraceFilter,
}

impl DecodeSession {
    pub fn new(header: TraceHeader, filter: TraceFilter) -> Self {
        Self {
            header,
            strings: StringTable::default(),
            ledger: AllocationLedger::new(),
            counters: TraceCounters::default(),
            filter,
        }
    }

    /// Applies one event. Alloc events rejected by the filter change nothing.
    pub fn apply(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::Alloc(alloc) => {
                if !self.filter.accepts(alloc.space, &alloc.stacktrace) {
                    return;
                }

                let replaced = self.ledger.record_alloc(
                    alloc.id,
                    alloc.size,
                    alloc.stacktrace_index,
                    &alloc.stacktrace,
                );
                if replaced.is_some() {
                    self.counters.duplicate_allocations += 1;
                }
                self.counters.on_alloc(alloc.size);
            }
            TraceEvent::Free { id } => match self.ledger.record_free(id) {
                Some(freed) => self.counters.on_free(freed.size),
                None => {
                    debug!(alloc_id = id, "free of an allocation outside the trace window");
                    self.counters.unmatched_frees += 1;
                }
            },
        }
    }

    pub fn header(&self) -> TraceHeader {
        self.header
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn ledger(&self) -> &AllocationLedger {
        &self.ledger
    }

    pub fn counters(&self) -> TraceCounters {
        self.counters
    }

    pub fn filter(&self) -> &TraceFilter {
        &self.filter
    }
}

/// Decodes a complete trace from `source`.
pub fn decode<R: Read>(source: R, filter: TraceFilter) -> Result<DecodeSession> {
    TraceDecoder::new(source)?.decode(filter)
}

/// Decodes a trace file, usually `memdump.bin`.
pub fn decode_file(path: impl AsRef<Path>, filter: TraceFilter) -> Result<DecodeSession> {
    let path = path.as_ref();
    debug!(path = %path.display(), "opening trace");
    let file = File::open(path)?;
    decode(BufReader::new(file), filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(id: u32, size: u32, space: Space, stacktrace: &str) -> TraceEvent {
        TraceEvent::Alloc(AllocEvent {
            id,
            size,
            space,
            stacktrace_index: 0,
            stacktrace: Arc::from(stacktrace),
        })
    }

    fn session(filter: TraceFilter) -> DecodeSession {
        DecodeSession::new(
            TraceHeader {
                item_count: 0,
                stacktrace_count: 0,
            },
            filter,
        )
    }

    #[test]
    fn test_counters_track_peak() {
        let mut session = session(TraceFilter::all());
        session.apply(alloc(1, 100, Space::Object, "main"));
        session.apply(alloc(2, 50, Space::Object, "main"));
        session.apply(TraceEvent::Free { id: 1 });
        session.apply(alloc(3, 20, Space::Object, "main"));

        let counters = session.counters();
        assert_eq!(counters.total_allocated, 170);
        assert_eq!(counters.current_allocated, 70);
        assert_eq!(counters.peak_allocated, 150);
    }

    #[test]
    fn test_filter_by_space_and_substring() {
        let filter = TraceFilter::new(
            SpaceFilter::Only(Space::Internal),
            Some("runtime".to_string()),
        );

        assert!(filter.accepts(Space::Internal, "panda::runtime::Init"));
        assert!(!filter.accepts(Space::Object, "panda::runtime::Init"));
        assert!(!filter.accepts(Space::Internal, "panda::compiler::Run"));
        assert!(TraceFilter::all().accepts(Space::Code, ""));
    }

    #[test]
    fn test_rejected_alloc_changes_nothing() {
        let mut session = session(TraceFilter::new(SpaceFilter::Only(Space::Code), None));
        session.apply(alloc(1, 64, Space::Object, "main"));

        assert_eq!(session.counters(), TraceCounters::default());
        assert_eq!(session.ledger().call_site_count(), 0);

        // the matching free is still applied and finds nothing
        session.apply(TraceEvent::Free { id: 1 });
        assert_eq!(session.counters().unmatched_frees, 1);
        assert_eq!(session.counters().current_allocated, 0);
    }

    #[test]
    fn test_duplicate_allocations_are_counted() {
        let mut session = session(TraceFilter::all());
        session.apply(alloc(1, 10, Space::Object, "main"));
        session.apply(alloc(1, 20, Space::Object, "main"));
        session.apply(TraceEvent::Free { id: 1 });

        let counters = session.counters();
        assert_eq!(counters.duplicate_allocations, 1);
        assert_eq!(counters.total_allocated, 30);
        assert_eq!(counters.current_allocated, 10);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        // header: 2 items, 0 stacktraces, then one bogus tag
        let mut bytes = Vec::new();
        for value in [2u32, 0, 9] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut decoder = TraceDecoder::new(&bytes[..]).unwrap();
        assert!(matches!(
            decoder.next(),
            Some(Err(MemdumpError::MalformedTrace { offset: 8, .. }))
        ));
        assert!(decoder.next().is_none());
    }
}
