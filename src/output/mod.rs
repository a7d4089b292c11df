//! Output formatting and display system
//!
//! Renders a finished run as colored or plain text, or as a single JSON
//! document for scripting.

mod colored;
mod formatter;

pub use colored::{ColorScheme, ColoredFormatter, LatencyLevel};
pub use formatter::{Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData};

use crate::{
    dns::QualificationReport,
    error::{AppError, Result},
    executor::{HostsEntry, TestSummary},
    models::{DomainResolution, NetworkTestRecord},
};
use serde::{Deserialize, Serialize};

/// Everything a run produced, in presentation order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualification: Option<QualificationReport>,
    pub resolutions: Vec<DomainResolution>,
    pub results: Vec<NetworkTestRecord>,
    pub ranked: Vec<NetworkTestRecord>,
    pub summary: Option<TestSummary>,
    pub hosts: Vec<HostsEntry>,
}

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            table_borders: true,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, false)
    }
}

/// Main output coordinator that handles all result display
pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self { formatter }
    }

    /// Render the full text report
    pub fn display_report(&self, report: &RunReport) -> Result<String> {
        let mut sections = vec![self.formatter.format_header("Network IP Prober Results")?];

        if let Some(qualification) = &report.qualification {
            let qualified = qualification.qualified_servers();
            let line = format!(
                "{} of {} DNS servers qualified",
                qualified.len(),
                qualification.servers.len()
            );
            sections.push(if qualified.is_empty() {
                self.formatter.format_warning(&line)?
            } else {
                self.formatter.format_success(&line)?
            });
        }

        sections.push(self.formatter.format_resolutions(&report.resolutions)?);

        if let Some(summary) = &report.summary {
            sections.push(self.formatter.format_summary(summary)?);
            sections.push(self.formatter.format_ranking(&report.ranked, &report.resolutions)?);
        }

        if !report.hosts.is_empty() {
            sections.push(self.formatter.format_hosts(&report.hosts)?);
        }

        Ok(sections.join("\n\n"))
    }

    pub fn display_error(&self, error: &str) -> Result<String> {
        self.formatter.format_error(error)
    }

    pub fn display_warning(&self, warning: &str) -> Result<String> {
        self.formatter.format_warning(warning)
    }
}

/// Pretty JSON document for `--json`
pub fn report_to_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| AppError::internal(format!("Failed to serialize report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PingMethod, PingResult};
    use std::net::IpAddr;

    fn report() -> RunReport {
        let ip: IpAddr = "93.184.216.34".parse().unwrap();
        let mut resolution = DomainResolution::failed("example.com", "");
        resolution.unique_ips.insert(ip, Default::default());
        resolution.analysis.total_unique_ips = 1;

        let mut ping = PingResult::failed(ip, 3, PingMethod::SystemPing, "");
        ping.success = true;
        ping.avg_delay = 20.0;
        ping.min_delay = 18.0;
        ping.error = None;
        let mut record = NetworkTestRecord::new(ip);
        record.ping = Some(ping);

        RunReport {
            qualification: None,
            resolutions: vec![resolution],
            results: vec![record.clone()],
            ranked: vec![record],
            summary: Some(TestSummary {
                total: 1,
                successful: 1,
                failed: 0,
                success_rate: 100.0,
            }),
            hosts: vec![HostsEntry {
                ip,
                domain: "example.com".to_string(),
            }],
        }
    }

    #[test]
    fn test_plain_report_sections() {
        let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_plain_formatter());
        let text = coordinator.display_report(&report()).unwrap();

        assert!(text.contains("Network IP Prober Results"));
        assert!(text.contains("example.com: 1 unique IPs"));
        assert!(text.contains("Tested 1 IPs"));
        assert!(text.contains("93.184.216.34 example.com"));
    }

    #[test]
    fn test_resolve_only_report_has_no_table() {
        let mut report = report();
        report.summary = None;
        report.hosts.clear();
        let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_plain_formatter());
        let text = coordinator.display_report(&report).unwrap();
        assert!(!text.contains("Tested"));
        assert!(!text.contains("# hosts entries"));
    }

    #[test]
    fn test_json_report() {
        let json = report_to_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["resolutions"][0]["domain"], "example.com");
        assert_eq!(value["summary"]["successful"], 1);
        assert_eq!(value["hosts"][0]["ip"], "93.184.216.34");
        assert!(value.get("qualification").is_none());
    }
}
