use colored::Colorize;
use prettytable::{color, Attr, Cell, Row, Table};
use std::io::Write;

use crate::error::Result;
use crate::report::Report;

/// Output format for a report.
///
/// # Examples
///
/// ```rust
/// use memdump::{Format, ReportConfig};
///
/// let config = ReportConfig::builder().format(Format::JsonPretty).build();
/// assert!(matches!(config.format, Format::JsonPretty));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// Summary line plus one `Allocated: ...` entry per call site.
    #[default]
    Text,
    Table,
    Json,
    JsonPretty,
}

/// Trait for implementing custom report output.
///
/// Implement this trait to control how reports are displayed or stored, for
/// example to forward them to a logging system or a CI artifact.
///
/// # Examples
///
/// ```rust
/// use memdump::{Report, Reporter, Result};
/// use std::io::Write;
///
/// struct CountOnly;
///
/// impl Reporter for CountOnly {
///     fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
///         writeln!(out, "{} call sites", report.call_sites.len())?;
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter: Send + Sync {
    fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()>;
}

/// Returns the built-in reporter for `format`.
pub fn reporter_for(format: Format) -> Box<dyn Reporter> {
    match format {
        Format::Text => Box::new(TextReporter),
        Format::Table => Box::new(TableReporter),
        Format::Json => Box::new(JsonReporter),
        Format::JsonPretty => Box::new(JsonPrettyReporter),
    }
}

pub struct TextReporter;

impl Reporter for TextReporter {
    fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        for line in report.lines() {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

pub struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        let counters = report.counters;
        writeln!(
            out,
            "{} total {} | peak {} | current {}",
            "[memdump]".blue().bold(),
            format_bytes(counters.total_allocated),
            format_bytes(counters.peak_allocated),
            format_bytes(counters.current_allocated),
        )?;

        let (displayed, total) = report.entry_counts();
        let scope = format!(
            "space: {}, filter: {}{}",
            report.space,
            report.filter.as_deref().unwrap_or("-"),
            if report.live_only { ", live only" } else { "" }
        );
        if displayed < total {
            writeln!(out, "{} ({}/{})", scope.yellow(), displayed, total)?;
        } else {
            writeln!(out, "{}", scope.yellow())?;
        }

        if report.is_empty() {
            writeln!(out, "No call sites matched.")?;
            return Ok(());
        }

        let use_colors = std::env::var("NO_COLOR").is_err();
        let mut table = Table::new();
        let headers = ["Allocated", "Allocs", "Sizes", "Stacktrace"];
        table.add_row(Row::new(
            headers
                .iter()
                .map(|header| {
                    let cell = Cell::new(header).with_style(Attr::Bold);
                    if use_colors {
                        cell.with_style(Attr::ForegroundColor(color::CYAN))
                    } else {
                        cell
                    }
                })
                .collect(),
        ));

        for call_site in &report.call_sites {
            let allocated = if call_site.net_allocated_bytes < 0 {
                format!("-{}", format_bytes(call_site.net_allocated_bytes.unsigned_abs()))
            } else {
                format_bytes(call_site.net_allocated_bytes.unsigned_abs())
            };
            table.add_row(Row::new(vec![
                Cell::new(&allocated),
                Cell::new(&call_site.allocation_count.to_string()),
                Cell::new(&call_site.sizes),
                Cell::new(&call_site.stacktrace),
            ]));
        }

        table.print(out)?;
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer(&mut *out, report)?;
        writeln!(out)?;
        Ok(())
    }
}

pub struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        Ok(())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.5 MB");
    }
}
