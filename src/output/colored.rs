//! Colored formatter implementation with terminal color support

use super::formatter::{
    describe_result, fmt_err, format_ms, ranking_columns, ranking_row, FormattingOptions, OutputFormatter,
    PlainFormatter, RowData,
};
use crate::{
    error::Result,
    executor::{HostsEntry, TestSummary},
    models::{DomainResolution, NetworkTestRecord},
};
use colored::*;
use std::fmt::Write as _;

/// Latency classification for color coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyLevel {
    Excellent, // < 50ms
    Good,      // 50-100ms
    Fair,      // 100-200ms
    Poor,      // >= 200ms
}

impl LatencyLevel {
    pub fn from_delay(delay_ms: f64) -> Self {
        if delay_ms < 50.0 {
            Self::Excellent
        } else if delay_ms < 100.0 {
            Self::Good
        } else if delay_ms < 200.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Excellent => Color::Green,
            Self::Good => Color::Cyan,
            Self::Fair => Color::Yellow,
            Self::Poor => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            muted: Color::BrightBlack,
        }
    }
}

/// Colored formatter; layout matches [`PlainFormatter`]
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            plain_formatter: PlainFormatter::new(options.clone()),
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> String {
        if self.options.enable_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.options.enable_color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// Color for a ranking cell, keyed on the row's average delay
    fn style_ranking_cell(&self, record: Option<&NetworkTestRecord>, column: usize, cell: String) -> String {
        match (record, column) {
            (None, _) => self.bold(&cell),
            (Some(r), 2) => match r.avg_delay() {
                Some(avg) => self.colorize(&cell, LatencyLevel::from_delay(avg).color()),
                None => cell,
            },
            (Some(_), 7) | (Some(_), 8) if cell.trim() == "failed" => self.colorize(&cell, self.color_scheme.error),
            (Some(_), 9) => self.colorize(&cell, self.color_scheme.muted),
            _ => cell,
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let border = "=".repeat(title.len() + 4);
        Ok(format!(
            "{}\n  {}  \n{}",
            self.colorize(&border, self.color_scheme.header),
            self.bold(title),
            self.colorize(&border, self.color_scheme.header)
        ))
    }

    fn format_resolutions(&self, resolutions: &[DomainResolution]) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "{}", self.colorize("DNS Resolution:", self.color_scheme.header)).map_err(fmt_err)?;

        for resolution in resolutions {
            let analysis = &resolution.analysis;
            let count = format!("{} unique IPs", analysis.total_unique_ips);
            let count = if analysis.total_unique_ips == 0 {
                self.colorize(&count, self.color_scheme.error)
            } else {
                self.colorize(&count, self.color_scheme.success)
            };
            writeln!(
                output,
                "{}: {} from {}/{} servers (avg {})",
                self.bold(&resolution.domain),
                count,
                analysis.successful_servers,
                analysis.total_servers,
                format_ms(analysis.avg_response_time_ms)
            )
            .map_err(fmt_err)?;

            if resolution.used_system_fallback {
                writeln!(
                    output,
                    "  {}",
                    self.colorize("answered by the system resolver", self.color_scheme.muted)
                )
                .map_err(fmt_err)?;
            }
            if resolution.is_poisoned {
                writeln!(
                    output,
                    "  {} {}",
                    self.colorize("WARNING:", self.color_scheme.warning),
                    resolution.poison_message
                )
                .map_err(fmt_err)?;
            }

            if self.options.verbose_mode {
                for (ip, record) in &resolution.unique_ips {
                    writeln!(
                        output,
                        "  {:<40} {} {}",
                        ip,
                        format_ms(record.avg_elapsed_ms),
                        self.colorize(&format!("({})", record.sources.join(", ")), self.color_scheme.muted)
                    )
                    .map_err(fmt_err)?;
                }
                for result in resolution.raw_results.iter().filter(|r| !r.success) {
                    writeln!(
                        output,
                        "  {:<40} {}",
                        result.server,
                        self.colorize(&describe_result(result), self.color_scheme.error)
                    )
                    .map_err(fmt_err)?;
                }
            }
        }

        Ok(output.trim_end().to_string())
    }

    fn format_ranking(&self, ranked: &[NetworkTestRecord], resolutions: &[DomainResolution]) -> Result<String> {
        if ranked.is_empty() {
            return Ok(self.colorize("No reachable IPs found", self.color_scheme.warning));
        }
        let rows: Vec<RowData> = ranked
            .iter()
            .enumerate()
            .map(|(i, record)| ranking_row(i + 1, record, resolutions))
            .collect();
        Ok(self
            .plain_formatter
            .create_styled_table(&ranking_columns(), &rows, |row, column, cell| {
                self.style_ranking_cell(row.and_then(|i| ranked.get(i)), column, cell)
            }))
    }

    fn format_summary(&self, summary: &TestSummary) -> Result<String> {
        let rate = format!("{:.1}% success", summary.success_rate);
        let rate = if summary.success_rate >= 80.0 {
            self.colorize(&rate, self.color_scheme.success)
        } else if summary.success_rate >= 50.0 {
            self.colorize(&rate, self.color_scheme.warning)
        } else {
            self.colorize(&rate, self.color_scheme.error)
        };
        Ok(format!(
            "Tested {} IPs: {} reachable, {} unreachable ({})",
            summary.total, summary.successful, summary.failed, rate
        ))
    }

    fn format_hosts(&self, entries: &[HostsEntry]) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "{}", self.colorize("# hosts entries", self.color_scheme.muted)).map_err(fmt_err)?;
        for entry in entries {
            writeln!(output, "{}", entry).map_err(fmt_err)?;
        }
        Ok(output.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("ERROR:", self.color_scheme.error), error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("WARNING:", self.color_scheme.warning), warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("OK:", self.color_scheme.success), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_color() -> ColoredFormatter {
        ColoredFormatter::new(FormattingOptions {
            enable_color: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_latency_levels() {
        assert_eq!(LatencyLevel::from_delay(10.0), LatencyLevel::Excellent);
        assert_eq!(LatencyLevel::from_delay(50.0), LatencyLevel::Good);
        assert_eq!(LatencyLevel::from_delay(150.0), LatencyLevel::Fair);
        assert_eq!(LatencyLevel::from_delay(200.0), LatencyLevel::Poor);
        assert_eq!(LatencyLevel::Poor.color(), Color::Red);
    }

    #[test]
    fn test_disabled_color_matches_plain_layout() {
        let colored = no_color();
        let plain = PlainFormatter::new(FormattingOptions {
            enable_color: false,
            ..Default::default()
        });
        let summary = TestSummary {
            total: 2,
            successful: 1,
            failed: 1,
            success_rate: 50.0,
        };
        assert_eq!(
            colored.format_summary(&summary).unwrap(),
            plain.format_summary(&summary).unwrap()
        );
        assert_eq!(colored.format_error("boom").unwrap(), "ERROR: boom");
    }

    #[test]
    fn test_colored_warning_keeps_text() {
        colored::control::set_override(true);
        let formatter = ColoredFormatter::new(FormattingOptions::default());
        let text = formatter.format_warning("slow server").unwrap();
        assert!(text.contains("slow server"));
        assert!(text.contains("\u{1b}["));
        colored::control::unset_override();
    }
}
