use std::io::Read;

use crate::decoder::{decode, TraceFilter};
use crate::error::Result;
use crate::output::{reporter_for, Format, Reporter};
use crate::report::{Report, ReportBuilder};
use crate::space::SpaceFilter;

/// Settings for one report run. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub live_only: bool,
    pub space: SpaceFilter,
    pub substring: Option<String>,
    pub limit: usize,
    pub format: Format,
}

impl ReportConfig {
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Reads overrides from the process environment:
    /// `MEMDUMP_LIVE`, `MEMDUMP_SPACE`, `MEMDUMP_FILTER`, `MEMDUMP_LIMIT` and `MEMDUMP_JSON`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false)
        };

        let mut builder = Self::builder().live_only(flag("MEMDUMP_LIVE"));

        if let Some(space) = lookup("MEMDUMP_SPACE") {
            builder = builder.space(&space)?;
        }
        if let Some(substring) = lookup("MEMDUMP_FILTER").filter(|s| !s.is_empty()) {
            builder = builder.substring(substring);
        }
        if let Some(limit) = lookup("MEMDUMP_LIMIT").and_then(|s| s.parse::<usize>().ok()) {
            builder = builder.limit(limit);
        }
        if flag("MEMDUMP_JSON") {
            builder = builder.format(Format::Json);
        }

        Ok(builder.build())
    }

    pub fn trace_filter(&self) -> TraceFilter {
        TraceFilter::new(self.space, self.substring.clone())
    }

    pub fn report_builder(&self) -> ReportBuilder {
        ReportBuilder::new()
            .live_only(self.live_only)
            .limit(self.limit)
    }

    pub fn reporter(&self) -> Box<dyn Reporter> {
        reporter_for(self.format)
    }

    /// Decodes `source` with this configuration and builds the report.
    pub fn generate<R: Read>(&self, source: R) -> Result<Report> {
        let session = decode(source, self.trace_filter())?;
        Ok(self.report_builder().build(&session))
    }
}

/// Builder for [`ReportConfig`].
///
/// # Examples
///
/// ```rust
/// use memdump::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .live_only(true)
///     .space("internal")?
///     .substring("mem_stats.cpp")
///     .build();
/// assert!(config.live_only);
/// # Ok::<(), memdump::MemdumpError>(())
/// ```
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    #[must_use]
    pub fn live_only(mut self, live_only: bool) -> Self {
        self.config.live_only = live_only;
        self
    }

    /// Selects a space by name (`"all"` or a canonical name).
    ///
    /// Fails with [`MemdumpError::UnknownSpaceName`](crate::MemdumpError::UnknownSpaceName)
    /// so that bad input is rejected before any trace is opened.
    pub fn space(mut self, name: &str) -> Result<Self> {
        self.config.space = SpaceFilter::parse(name)?;
        Ok(self)
    }

    #[must_use]
    pub fn space_filter(mut self, space: SpaceFilter) -> Self {
        self.config.space = space;
        self
    }

    #[must_use]
    pub fn substring(mut self, substring: impl Into<String>) -> Self {
        self.config.substring = Some(substring.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    pub fn build(self) -> ReportConfig {
        self.config
    }
}
