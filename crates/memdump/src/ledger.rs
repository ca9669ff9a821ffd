use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

/// Aggregate statistics for one unique stacktrace.
#[derive(Debug, Clone)]
pub struct CallSiteStats {
    pub stacktrace_index: u32,
    pub stacktrace: Arc<str>,
    /// Allocated minus freed bytes. Equals live bytes when the trace was
    /// dumped at runtime teardown.
    pub net_allocated_bytes: i64,
    /// One entry per alloc event, never removed on free.
    pub allocation_sizes: Vec<u32>,
    /// Frees matched against allocations of this site.
    pub frees: u64,
}

impl CallSiteStats {
    pub fn new(stacktrace_index: u32, stacktrace: Arc<str>) -> Self {
        Self {
            stacktrace_index,
            stacktrace,
            net_allocated_bytes: 0,
            allocation_sizes: Vec::new(),
            frees: 0,
        }
    }

    pub fn allocation_count(&self) -> usize {
        self.allocation_sizes.len()
    }

    /// Inclusive `(min, max)` of the recorded sizes, from a single pass.
    pub fn size_range(&self) -> Option<(u32, u32)> {
        let (&first, rest) = self.allocation_sizes.split_first()?;
        let mut min = first;
        let mut max = first;
        for &size in rest {
            if size < min {
                min = size;
            } else if size > max {
                max = size;
            }
        }
        Some((min, max))
    }

    pub fn is_live(&self) -> bool {
        self.net_allocated_bytes > 0
    }

    fn on_alloc(&mut self, size: u32) {
        self.net_allocated_bytes = self.net_allocated_bytes.saturating_add(i64::from(size));
        self.allocation_sizes.push(size);
    }

    fn on_free(&mut self, size: u32) {
        self.net_allocated_bytes = self.net_allocated_bytes.saturating_sub(i64::from(size));
        self.frees = self.frees.saturating_add(1);

        if self.net_allocated_bytes < 0 {
            warn!(
                stacktrace_index = self.stacktrace_index,
                net_allocated_bytes = self.net_allocated_bytes,
                "call site freed more bytes than it allocated"
            );
        }
    }
}

/// An allocation seen in the trace whose free has not been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveAllocation {
    pub id: u32,
    /// Key of the owning call site in the ledger.
    pub stacktrace_index: u32,
    pub size: u32,
}

/// Live allocation id → call site associations plus per call site totals.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    call_sites: HashMap<u32, CallSiteStats>,
    live: HashMap<u32, LiveAllocation>,
}

impl AllocationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stats for `stacktrace_index`, creating them on first use.
    pub fn call_site_entry(
        &mut self,
        stacktrace_index: u32,
        stacktrace: &Arc<str>,
    ) -> &mut CallSiteStats {
        self.call_sites
            .entry(stacktrace_index)
            .or_insert_with(|| CallSiteStats::new(stacktrace_index, Arc::clone(stacktrace)))
    }

    /// Records an allocation against its call site.
    ///
    /// A still-live `id` is overwritten (last alloc wins) and the replaced entry
    /// is returned. Its bytes stay attributed to its call site because no free
    /// can reach them anymore.
    pub fn record_alloc(
        &mut self,
        id: u32,
        size: u32,
        stacktrace_index: u32,
        stacktrace: &Arc<str>,
    ) -> Option<LiveAllocation> {
        self.call_site_entry(stacktrace_index, stacktrace)
            .on_alloc(size);

        let replaced = self.live.insert(
            id,
            LiveAllocation {
                id,
                stacktrace_index,
                size,
            },
        );

        if let Some(previous) = replaced {
            warn!(
                alloc_id = id,
                previous_size = previous.size,
                size,
                "allocation id reused without an intervening free"
            );
        }

        replaced
    }

    /// Consumes the live allocation for `id`. Unknown ids are ignored.
    pub fn record_free(&mut self, id: u32) -> Option<LiveAllocation> {
        let freed = self.live.remove(&id)?;

        if let Some(call_site) = self.call_sites.get_mut(&freed.stacktrace_index) {
            call_site.on_free(freed.size);
        }

        Some(freed)
    }

    pub fn call_site(&self, stacktrace_index: u32) -> Option<&CallSiteStats> {
        self.call_sites.get(&stacktrace_index)
    }

    pub fn call_sites(&self) -> impl Iterator<Item = &CallSiteStats> {
        self.call_sites.values()
    }

    pub fn call_site_count(&self) -> usize {
        self.call_sites.len()
    }

    pub fn live(&self, id: u32) -> Option<&LiveAllocation> {
        self.live.get(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[test]
    fn test_alloc_creates_call_site_lazily() {
        let mut ledger = AllocationLedger::new();
        assert_eq!(ledger.call_site_count(), 0);

        let main = site("main");
        ledger.record_alloc(1, 100, 0, &main);
        ledger.record_alloc(2, 50, 0, &main);

        assert_eq!(ledger.call_site_count(), 1);
        let stats = ledger.call_site(0).unwrap();
        assert_eq!(&*stats.stacktrace, "main");
        assert_eq!(stats.net_allocated_bytes, 150);
        assert_eq!(stats.allocation_sizes, vec![100, 50]);
        assert_eq!(ledger.live_count(), 2);
    }

    #[test]
    fn test_free_decrements_owning_site() {
        let mut ledger = AllocationLedger::new();
        let a = site("a");
        let b = site("b");
        ledger.record_alloc(1, 100, 0, &a);
        ledger.record_alloc(2, 30, 1, &b);

        let freed = ledger.record_free(1).unwrap();
        assert_eq!(freed.size, 100);
        assert_eq!(freed.stacktrace_index, 0);

        let a_stats = ledger.call_site(0).unwrap();
        assert_eq!(a_stats.net_allocated_bytes, 0);
        assert_eq!(a_stats.allocation_sizes, vec![100]);
        assert_eq!(a_stats.frees, 1);
        assert_eq!(ledger.call_site(1).unwrap().net_allocated_bytes, 30);
        assert!(ledger.live(1).is_none());
        assert!(ledger.live(2).is_some());
    }

    #[test]
    fn test_unknown_free_is_noop() {
        let mut ledger = AllocationLedger::new();
        ledger.record_alloc(1, 8, 0, &site("x"));

        assert!(ledger.record_free(99).is_none());
        assert!(ledger.record_free(1).is_some());
        assert!(ledger.record_free(1).is_none());

        let stats = ledger.call_site(0).unwrap();
        assert_eq!(stats.net_allocated_bytes, 0);
        assert_eq!(stats.frees, 1);
    }

    #[test]
    fn test_duplicate_id_last_alloc_wins() {
        let mut ledger = AllocationLedger::new();
        let a = site("a");
        let b = site("b");

        assert!(ledger.record_alloc(7, 10, 0, &a).is_none());
        let replaced = ledger.record_alloc(7, 20, 1, &b).unwrap();
        assert_eq!(replaced.size, 10);
        assert_eq!(replaced.stacktrace_index, 0);

        ledger.record_free(7);
        assert_eq!(ledger.call_site(0).unwrap().net_allocated_bytes, 10);
        assert_eq!(ledger.call_site(1).unwrap().net_allocated_bytes, 0);
    }

    #[test]
    fn test_size_range_single_scan() {
        let mut stats = CallSiteStats::new(0, site("s"));
        assert_eq!(stats.size_range(), None);

        stats.allocation_sizes = vec![64, 16, 256, 64];
        assert_eq!(stats.size_range(), Some((16, 256)));

        stats.allocation_sizes = vec![32, 32];
        assert_eq!(stats.size_range(), Some((32, 32)));
    }
}
