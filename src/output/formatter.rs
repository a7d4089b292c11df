//! Core formatting traits and implementations
//!
//! This module defines the output formatting interface and provides
//! a plain text implementation with table formatting capabilities.

use crate::{
    error::{AppError, Result},
    executor::{HostsEntry, TestSummary},
    models::{DomainResolution, NetworkTestRecord, ResolutionResult, SpeedResult},
};
use std::fmt::Write as _;
use std::net::IpAddr;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format per-domain resolution outcomes
    fn format_resolutions(&self, resolutions: &[DomainResolution]) -> Result<String>;

    /// Format ranked IPs as a table
    fn format_ranking(&self, ranked: &[NetworkTestRecord], resolutions: &[DomainResolution]) -> Result<String>;

    /// Format batch counts
    fn format_summary(&self, summary: &TestSummary) -> Result<String>;

    /// Format hosts-file lines
    fn format_hosts(&self, entries: &[HostsEntry]) -> Result<String>;

    fn format_error(&self, error: &str) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Show per-server answers under each domain
    pub verbose_mode: bool,
    /// Show table borders
    pub table_borders: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
        }
    }
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub alignment: Alignment,
    pub max_width: usize,
}

impl Column {
    pub fn new(header: &str, alignment: Alignment) -> Self {
        Self {
            header: header.to_string(),
            alignment,
            max_width: 48,
        }
    }
}

/// Text alignment options
#[derive(Debug, Clone, Copy)]
pub enum Alignment {
    Left,
    Right,
}

/// Row data for table formatting
pub type RowData = Vec<String>;

pub(crate) fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::internal(format!("Failed to format output: {}", e))
}

/// Columns of the ranking table
pub(crate) fn ranking_columns() -> Vec<Column> {
    vec![
        Column::new("#", Alignment::Right),
        Column::new("IP", Alignment::Left),
        Column::new("Avg", Alignment::Right),
        Column::new("Min", Alignment::Right),
        Column::new("Max", Alignment::Right),
        Column::new("Jitter", Alignment::Right),
        Column::new("Loss", Alignment::Right),
        Column::new("Download", Alignment::Right),
        Column::new("Upload", Alignment::Right),
        Column::new("Domains", Alignment::Left),
    ]
}

/// Domains whose answers contained `ip`, in resolution order
pub(crate) fn domains_for(ip: &IpAddr, resolutions: &[DomainResolution]) -> String {
    let domains: Vec<&str> = resolutions
        .iter()
        .filter(|r| r.unique_ips.contains_key(ip))
        .map(|r| r.domain.as_str())
        .collect();
    if domains.is_empty() {
        "-".to_string()
    } else {
        domains.join(", ")
    }
}

pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        "-".to_string()
    } else if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Speed cell; estimates carry a `~` prefix
pub(crate) fn format_speed(result: Option<&SpeedResult>) -> String {
    match result {
        Some(r) if r.success && r.estimated => format!("~{:.2} Mbps", r.speed_mbps),
        Some(r) if r.success => format!("{:.2} Mbps", r.speed_mbps),
        Some(_) => "failed".to_string(),
        None => "-".to_string(),
    }
}

/// Cells of one ranking row, in `ranking_columns` order
pub(crate) fn ranking_row(rank: usize, record: &NetworkTestRecord, resolutions: &[DomainResolution]) -> RowData {
    let (avg, min, max, jitter, loss) = match &record.ping {
        Some(p) if p.success => (
            format_ms(p.avg_delay),
            format_ms(p.min_delay),
            format_ms(p.max_delay),
            format_ms(p.jitter),
            format!("{:.1}%", p.packet_loss),
        ),
        Some(p) => ("-".into(), "-".into(), "-".into(), "-".into(), format!("{:.1}%", p.packet_loss)),
        None => ("-".into(), "-".into(), "-".into(), "-".into(), "-".into()),
    };
    let speed = record.speed.as_ref();
    vec![
        rank.to_string(),
        record.ip.to_string(),
        avg,
        min,
        max,
        jitter,
        loss,
        format_speed(speed.and_then(|s| s.download.as_ref())),
        format_speed(speed.and_then(|s| s.upload.as_ref())),
        domains_for(&record.ip, resolutions),
    ]
}

/// One-line description of a server's answer
pub(crate) fn describe_result(result: &ResolutionResult) -> String {
    if result.success {
        let ips: Vec<String> = result.ips.iter().map(|ip| ip.to_string()).collect();
        format!(
            "{} in {} [{}]",
            ips.join(", "),
            format_ms(result.elapsed_ms),
            result.speed_tier.as_str()
        )
    } else {
        let kind = result.failure.map(|k| k.as_str()).unwrap_or("error");
        match &result.error {
            Some(detail) => format!("{}: {}", kind, detail),
            None => kind.to_string(),
        }
    }
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }

    /// Create a table with the given columns and data
    pub fn create_table(&self, columns: &[Column], rows: &[RowData]) -> String {
        self.create_styled_table(columns, rows, |_, _, cell| cell)
    }

    /// Like `create_table`, with `style(row, column, padded_cell)` applied
    /// after alignment; `row` is `None` for the header
    pub fn create_styled_table<F>(&self, columns: &[Column], rows: &[RowData], style: F) -> String
    where
        F: Fn(Option<usize>, usize, String) -> String,
    {
        if rows.is_empty() {
            return String::new();
        }

        let widths = Self::column_widths(columns, rows);
        let borders = self.options.table_borders;
        let mut output = String::new();

        if borders {
            output.push_str(&Self::horizontal_border(&widths));
            output.push('\n');
        }
        let headers: Vec<String> = columns.iter().map(|c| c.header.clone()).collect();
        output.push_str(&self.create_row(&headers, &widths, columns, |col, cell| style(None, col, cell)));
        output.push('\n');
        if borders {
            output.push_str(&Self::horizontal_border(&widths));
            output.push('\n');
        }

        for (idx, row) in rows.iter().enumerate() {
            output.push_str(&self.create_row(row, &widths, columns, |col, cell| style(Some(idx), col, cell)));
            output.push('\n');
        }

        if borders {
            output.push_str(&Self::horizontal_border(&widths));
        }
        output
    }

    fn column_widths(columns: &[Column], rows: &[RowData]) -> Vec<usize> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                rows.iter()
                    .filter_map(|r| r.get(idx))
                    .map(|c| c.chars().count())
                    .fold(col.header.chars().count(), usize::max)
                    .min(col.max_width)
            })
            .collect()
    }

    fn create_row<F>(&self, data: &[String], widths: &[usize], columns: &[Column], style: F) -> String
    where
        F: Fn(usize, String) -> String,
    {
        let borders = self.options.table_borders;
        let mut row = String::new();
        if borders {
            row.push('|');
        }

        for (idx, ((cell, &width), column)) in data.iter().zip(widths).zip(columns).enumerate() {
            if borders {
                row.push(' ');
            }
            row.push_str(&style(idx, align_text(cell, width, column.alignment)));
            if borders {
                row.push_str(" |");
            } else {
                row.push_str("  ");
            }
        }

        row.trim_end().to_string()
    }

    fn horizontal_border(widths: &[usize]) -> String {
        let mut border = String::from("+");
        for &width in widths {
            border.push_str(&"-".repeat(width + 2));
            border.push('+');
        }
        border
    }
}

/// Pad or truncate `text` to exactly `width` characters
pub(crate) fn align_text(text: &str, width: usize, alignment: Alignment) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.chars().take(width).collect();
    }
    let padding = " ".repeat(width - len);
    match alignment {
        Alignment::Left => format!("{}{}", text, padding),
        Alignment::Right => format!("{}{}", padding, text),
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.len() + 4);
        writeln!(output, "{}", border).map_err(fmt_err)?;
        writeln!(output, "  {}  ", title).map_err(fmt_err)?;
        write!(output, "{}", border).map_err(fmt_err)?;
        Ok(output)
    }

    fn format_resolutions(&self, resolutions: &[DomainResolution]) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "DNS Resolution:").map_err(fmt_err)?;
        writeln!(output, "---------------").map_err(fmt_err)?;

        for resolution in resolutions {
            let analysis = &resolution.analysis;
            writeln!(
                output,
                "{}: {} unique IPs from {}/{} servers (avg {})",
                resolution.domain,
                analysis.total_unique_ips,
                analysis.successful_servers,
                analysis.total_servers,
                format_ms(analysis.avg_response_time_ms)
            )
            .map_err(fmt_err)?;

            if resolution.used_system_fallback {
                writeln!(output, "  answered by the system resolver").map_err(fmt_err)?;
            }
            if resolution.is_poisoned {
                writeln!(output, "  WARNING: {}", resolution.poison_message).map_err(fmt_err)?;
            }

            if self.options.verbose_mode {
                for (ip, record) in &resolution.unique_ips {
                    writeln!(
                        output,
                        "  {:<40} {} ({})",
                        ip,
                        format_ms(record.avg_elapsed_ms),
                        record.sources.join(", ")
                    )
                    .map_err(fmt_err)?;
                }
                for result in resolution.raw_results.iter().filter(|r| !r.success) {
                    writeln!(output, "  {:<40} {}", result.server, describe_result(result)).map_err(fmt_err)?;
                }
            }
        }

        Ok(output.trim_end().to_string())
    }

    fn format_ranking(&self, ranked: &[NetworkTestRecord], resolutions: &[DomainResolution]) -> Result<String> {
        if ranked.is_empty() {
            return Ok("No reachable IPs found".to_string());
        }
        let rows: Vec<RowData> = ranked
            .iter()
            .enumerate()
            .map(|(i, record)| ranking_row(i + 1, record, resolutions))
            .collect();
        Ok(self.create_table(&ranking_columns(), &rows))
    }

    fn format_summary(&self, summary: &TestSummary) -> Result<String> {
        Ok(format!(
            "Tested {} IPs: {} reachable, {} unreachable ({:.1}% success)",
            summary.total, summary.successful, summary.failed, summary.success_rate
        ))
    }

    fn format_hosts(&self, entries: &[HostsEntry]) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "# hosts entries").map_err(fmt_err)?;
        for entry in entries {
            writeln!(output, "{}", entry).map_err(fmt_err)?;
        }
        Ok(output.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("OK: {}", message))
    }
}
