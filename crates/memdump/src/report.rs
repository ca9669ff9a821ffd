//! Filtering, ordering and summarizing of call site statistics.

use serde::Serialize;

use crate::decoder::{DecodeSession, TraceCounters};
use crate::ledger::CallSiteStats;

/// Shown in place of an empty stacktrace.
pub const NO_STACKTRACE: &str = "<No stacktrace>";

fn sort_key(call_site: &CallSiteStats) -> (i64, usize) {
    (call_site.net_allocated_bytes, call_site.allocation_count())
}

/// Orders call sites by `(net_allocated_bytes, allocation count)`, largest first.
/// Ties keep their input order.
pub fn sort<'a, I>(call_sites: I) -> Vec<&'a CallSiteStats>
where
    I: IntoIterator<Item = &'a CallSiteStats>,
{
    let mut sorted: Vec<_> = call_sites.into_iter().collect();
    sorted.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    sorted
}

/// With `live_only`, keeps call sites that still hold bytes.
pub fn filter_live(call_sites: Vec<&CallSiteStats>, live_only: bool) -> Vec<&CallSiteStats> {
    if !live_only {
        return call_sites;
    }
    call_sites
        .into_iter()
        .filter(|call_site| call_site.is_live())
        .collect()
}

/// `"all N bytes"` when every size is equal, `"from MIN to MAX bytes"` otherwise.
pub fn describe_sizes(sizes: &[u32]) -> String {
    let Some((&first, rest)) = sizes.split_first() else {
        return "no allocations".to_string();
    };

    let mut min = first;
    let mut max = first;
    for &size in rest {
        if size < min {
            min = size;
        } else if size > max {
            max = size;
        }
    }

    if min == max {
        format!("all {min} bytes")
    } else {
        format!("from {min} to {max} bytes")
    }
}

pub fn describe_stacktrace(text: &str) -> &str {
    if text.is_empty() {
        NO_STACKTRACE
    } else {
        text
    }
}

/// One rendered call site row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteSummary {
    pub stacktrace_index: u32,
    pub net_allocated_bytes: i64,
    pub allocation_count: usize,
    pub min_size: u32,
    pub max_size: u32,
    pub sizes: String,
    pub stacktrace: String,
}

impl From<&CallSiteStats> for CallSiteSummary {
    fn from(stats: &CallSiteStats) -> Self {
        let (min_size, max_size) = stats.size_range().unwrap_or((0, 0));
        Self {
            stacktrace_index: stats.stacktrace_index,
            net_allocated_bytes: stats.net_allocated_bytes,
            allocation_count: stats.allocation_count(),
            min_size,
            max_size,
            sizes: describe_sizes(&stats.allocation_sizes),
            stacktrace: describe_stacktrace(&stats.stacktrace).to_string(),
        }
    }
}

impl CallSiteSummary {
    /// `Allocated: N bytes. K allocs <sizes> from:\n<stacktrace>`
    pub fn line(&self) -> String {
        format!(
            "Allocated: {} bytes. {} allocs {} from:\n{}",
            self.net_allocated_bytes, self.allocation_count, self.sizes, self.stacktrace
        )
    }
}

/// Structured result of a report run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub counters: TraceCounters,
    pub space: String,
    pub filter: Option<String>,
    pub live_only: bool,
    /// Call sites that passed the live filter, before `limit` was applied.
    pub total_call_sites: usize,
    pub call_sites: Vec<CallSiteSummary>,
}

impl Report {
    pub fn summary_line(&self) -> String {
        format!(
            "Total allocated: {}, peak allocated: {}, current allocated {}",
            self.counters.total_allocated,
            self.counters.peak_allocated,
            self.counters.current_allocated
        )
    }

    /// Summary line followed by one entry per call site.
    pub fn lines(&self) -> Vec<String> {
        std::iter::once(self.summary_line())
            .chain(self.call_sites.iter().map(CallSiteSummary::line))
            .collect()
    }

    /// `(displayed, total)` call site counts.
    pub fn entry_counts(&self) -> (usize, usize) {
        (self.call_sites.len(), self.total_call_sites)
    }

    pub fn is_empty(&self) -> bool {
        self.call_sites.is_empty()
    }
}

/// Turns a decoded session into a [`Report`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder {
    live_only: bool,
    limit: usize,
}

impl ReportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report call sites with bytes still allocated.
    #[must_use]
    pub fn live_only(mut self, live_only: bool) -> Self {
        self.live_only = live_only;
        self
    }

    /// Maximum number of call sites to report, 0 means all.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(&self, session: &DecodeSession) -> Report {
        // index order first so equal keys come out deterministically
        let mut by_index: Vec<_> = session.ledger().call_sites().collect();
        by_index.sort_by_key(|call_site| call_site.stacktrace_index);

        let selected = filter_live(sort(by_index), self.live_only);
        let total_call_sites = selected.len();
        let take = if self.limit > 0 {
            self.limit
        } else {
            total_call_sites
        };

        let filter = session.filter();
        Report {
            counters: session.counters(),
            space: filter.space.to_string(),
            filter: filter.substring.clone(),
            live_only: self.live_only,
            total_call_sites,
            call_sites: selected
                .into_iter()
                .take(take)
                .map(CallSiteSummary::from)
                .collect(),
        }
    }
}
