//! Post-mortem memory accounting for allocation traces.
//!
//! An instrumented runtime dumps every allocation and free it observed into a
//! binary trace (`memdump.bin`). This crate streams that trace back, rebuilds
//! the allocation id → call site mapping, tracks live versus freed bytes per
//! call site and reports total, peak and current usage.
//!
//! ```rust
//! use memdump::{ReportConfig, Space, TraceEncoder};
//!
//! let mut encoder = TraceEncoder::new();
//! let main = encoder.stacktrace("main");
//! encoder
//!     .alloc(1, 100, Space::Object, main)
//!     .alloc(2, 50, Space::Object, main)
//!     .free(1);
//!
//! let config = ReportConfig::builder().live_only(true).build();
//! let report = config.generate(&encoder.to_bytes()[..])?;
//!
//! assert_eq!(report.counters.peak_allocated, 150);
//! assert_eq!(report.call_sites[0].net_allocated_bytes, 50);
//! # Ok::<(), memdump::MemdumpError>(())
//! ```

mod config;
mod decoder;
mod encoder;
mod error;
mod ledger;
mod output;
pub mod report;
pub mod space;
mod string_table;
mod wire;

pub use config::{ReportConfig, ReportConfigBuilder};
pub use decoder::{
    decode, decode_file, AllocEvent, DecodeSession, TraceCounters, TraceDecoder, TraceEvent,
    TraceFilter, TraceHeader,
};
pub use encoder::TraceEncoder;
pub use error::{MemdumpError, Result};
pub use ledger::{AllocationLedger, CallSiteStats, LiveAllocation};
pub use output::{
    format_bytes, reporter_for, Format, JsonPrettyReporter, JsonReporter, Reporter,
    TableReporter, TextReporter,
};
pub use report::{CallSiteSummary, Report, ReportBuilder};
pub use space::{Space, SpaceFilter};
pub use string_table::StringTable;
