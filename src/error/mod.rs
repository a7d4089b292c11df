//! Error handling for the network IP prober
//!
//! Per-server and per-IP failures never surface here; they are recorded in
//! result structs. [`AppError`] is reserved for problems that stop a run:
//! bad configuration, an unusable worker setup, or nothing resolving at all.

use crate::dns::LookupError;
use thiserror::Error;

/// Custom error types for the network IP prober
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("DNS resolution error: {0}")]
    DnsResolution(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Rejected arguments such as zero workers or an empty server list
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Addresses, numbers, enum names and JSON
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Ping or throughput probe errors
    #[error("Probe error: {0}")]
    Probe(String),

    /// Server skipped because its circuit is open
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Test execution error: {0}")]
    TestExecution(String),

    /// Ctrl-C during a long phase
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reporting attributes shared by every error of one kind
struct Traits {
    category: &'static str,
    exit_code: i32,
    recoverable: bool,
    hint: Option<&'static str>,
}

macro_rules! constructors {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant(message.into())
            }
        )*
    };
}

impl AppError {
    constructors! {
        config => Config,
        network => Network,
        dns_resolution => DnsResolution,
        timeout => Timeout,
        validation => Validation,
        io => Io,
        parse => Parse,
        probe => Probe,
        circuit_open => CircuitOpen,
        test_execution => TestExecution,
        cancelled => Cancelled,
        internal => Internal,
    }

    fn traits(&self) -> Traits {
        let (category, exit_code, recoverable, hint) = match self {
            Self::Config(_) => ("CONFIG", 1, false, Some("Check the .env file (see --env-help) and the command line.")),
            Self::Validation(_) => ("VALIDATION", 1, false, Some("Worker counts, thread counts and thresholds must be positive.")),
            Self::Parse(_) => ("PARSE", 1, false, Some("DNS servers must be IP addresses; enum options are listed in --help.")),
            Self::Network(_) => ("NETWORK", 2, true, Some("Check your internet connection and firewall.")),
            Self::DnsResolution(_) => ("DNS", 2, true, Some("Check that the domain exists or try other servers with --dns-servers.")),
            Self::CircuitOpen(_) => ("CIRCUIT", 2, true, Some("The server failed repeatedly and is retried after its cool-down.")),
            Self::Timeout(_) => ("TIMEOUT", 3, true, Some("Raise --dns-timeout or --ping-timeout.")),
            Self::Probe(_) => ("PROBE", 4, true, Some("Raw ICMP needs privileges; the system ping is used otherwise.")),
            Self::Io(_) => ("IO", 5, false, Some("Check file permissions and disk space.")),
            Self::TestExecution(_) => ("TEST", 6, false, None),
            Self::Cancelled(_) => ("CANCELLED", 130, false, None),
            Self::Internal(_) => ("INTERNAL", 99, false, Some("This is likely a bug; please report it with the details above.")),
        };
        Traits { category, exit_code, recoverable, hint }
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        self.traits().category
    }

    /// Whether running again could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        self.traits().recoverable
    }

    /// Process exit code for the binary
    pub fn exit_code(&self) -> i32 {
        self.traits().exit_code
    }

    /// The message with a suggestion appended when one applies
    pub fn user_friendly_message(&self) -> String {
        match self.traits().hint {
            Some(hint) => format!("{}\n\nSuggestion: {}", self, hint),
            None => self.to_string(),
        }
    }

    /// Same variant with `f` applied to the message
    pub fn map_message<F: FnOnce(&str) -> String>(self, f: F) -> Self {
        match self {
            Self::Config(m) => Self::Config(f(&m)),
            Self::Network(m) => Self::Network(f(&m)),
            Self::DnsResolution(m) => Self::DnsResolution(f(&m)),
            Self::Timeout(m) => Self::Timeout(f(&m)),
            Self::Validation(m) => Self::Validation(f(&m)),
            Self::Io(m) => Self::Io(f(&m)),
            Self::Parse(m) => Self::Parse(f(&m)),
            Self::Probe(m) => Self::Probe(f(&m)),
            Self::CircuitOpen(m) => Self::CircuitOpen(f(&m)),
            Self::TestExecution(m) => Self::TestExecution(f(&m)),
            Self::Cancelled(m) => Self::Cancelled(f(&m)),
            Self::Internal(m) => Self::Internal(f(&m)),
        }
    }

    /// `[CATEGORY] message`, colored by severity when enabled
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();
        if !use_color {
            return format!("[{}] {}", category, message);
        }

        use colored::{Color, Colorize};
        let color = match self.exit_code() {
            1 => Color::Red,
            2 => Color::Yellow,
            3 => Color::Blue,
            4 | 130 => Color::Magenta,
            99 => Color::BrightRed,
            _ => Color::Cyan,
        };
        format!("[{}] {}", category.color(color).bold(), message.color(color))
    }
}

impl From<LookupError> for AppError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::Timeout => Self::timeout("DNS query timed out"),
            LookupError::Unreachable => Self::network("DNS server unreachable"),
            other => Self::dns_resolution(other.to_string()),
        }
    }
}

impl From<trust_dns_resolver::error::ResolveError> for AppError {
    fn from(error: trust_dns_resolver::error::ResolveError) -> Self {
        LookupError::from(error).into()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(format!("speed endpoint: {}", error))
        } else if error.is_connect() {
            Self::network(format!("speed endpoint: {}", error))
        } else {
            Self::probe(format!("speed endpoint: {}", error))
        }
    }
}

impl From<surge_ping::SurgeError> for AppError {
    fn from(error: surge_ping::SurgeError) -> Self {
        Self::probe(format!("ICMP: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation exceeded its deadline")
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::cancelled("worker task aborted")
        } else {
            Self::test_execution(format!("worker task panicked: {}", error))
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Prefix an error message with what was being attempted
///
/// The variant, and so the exit code, is preserved.
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            e.into().map_message(|m| format!("{}: {}", context, m))
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Prints fatal errors for the binary
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Text written to stderr for `error`
    pub fn render(&self, error: &AppError) -> String {
        let mut out = error.format_for_console(self.use_color);
        if self.verbose {
            out.push_str("\n\n");
            out.push_str(&error.user_friendly_message());
            if error.is_recoverable() {
                let retry = "This error might be temporary. You can try running the command again.";
                out.push_str("\n\n");
                if self.use_color {
                    use colored::Colorize;
                    out.push_str(&retry.green().to_string());
                } else {
                    out.push_str(retry);
                }
            }
        }
        out
    }

    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", self.render(error));
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_exit_with_one() {
        for error in [AppError::config("x"), AppError::validation("x"), AppError::parse("x")] {
            assert_eq!(error.exit_code(), 1);
            assert!(!error.is_recoverable());
        }
    }

    #[test]
    fn test_exit_codes_by_kind() {
        let cases = [
            (AppError::network("x"), "NETWORK", 2),
            (AppError::dns_resolution("x"), "DNS", 2),
            (AppError::circuit_open("x"), "CIRCUIT", 2),
            (AppError::timeout("x"), "TIMEOUT", 3),
            (AppError::probe("x"), "PROBE", 4),
            (AppError::io("x"), "IO", 5),
            (AppError::test_execution("x"), "TEST", 6),
            (AppError::cancelled("x"), "CANCELLED", 130),
            (AppError::internal("x"), "INTERNAL", 99),
        ];
        for (error, category, code) in cases {
            assert_eq!(error.category(), category);
            assert_eq!(error.exit_code(), code);
        }
    }

    #[test]
    fn test_lookup_errors_map_by_cause() {
        assert!(matches!(AppError::from(LookupError::Timeout), AppError::Timeout(_)));
        assert!(matches!(AppError::from(LookupError::Unreachable), AppError::Network(_)));
        let no_records = AppError::from(LookupError::NoRecords);
        assert_eq!(no_records.category(), "DNS");
        assert!(no_records.is_recoverable());
    }

    #[test]
    fn test_friendly_message_carries_hint() {
        let message = AppError::validation("max_workers must be greater than 0").user_friendly_message();
        assert!(message.starts_with("Validation error: max_workers"));
        assert!(message.contains("Suggestion:"));

        assert_eq!(AppError::cancelled("ctrl-c").user_friendly_message(), "Cancelled: ctrl-c");
    }

    #[test]
    fn test_context_keeps_variant() {
        let result: Result<()> = Err(AppError::config("bad value"));
        let error = result.context("Loading custom.env").unwrap_err();
        assert!(matches!(error, AppError::Config(_)));
        assert_eq!(error.to_string(), "Configuration error: Loading custom.env: bad value");

        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        let error = io.with_context(|| "Writing example.env".to_string()).unwrap_err();
        assert_eq!(error.exit_code(), 5);
    }

    #[test]
    fn test_std_conversions() {
        let addr = "not-an-ip".parse::<std::net::IpAddr>().unwrap_err();
        assert!(AppError::from(addr).to_string().contains("IP address parse error"));

        let number = "many".parse::<u32>().unwrap_err();
        assert_eq!(AppError::from(number).category(), "PARSE");

        let dotenv_error = dotenv::Error::LineParse("PING_COUNT".to_string(), 3);
        assert_eq!(AppError::from(dotenv_error).category(), "CONFIG");

        let wrapped: AppError = anyhow::anyhow!("root cause").context("outer").into();
        assert_eq!(wrapped.to_string(), "Internal error: outer: root cause");
    }

    #[test]
    fn test_console_rendering() {
        let error = AppError::dns_resolution("No domain resolved to any IP address");
        assert_eq!(
            error.format_for_console(false),
            "[DNS] DNS resolution error: No domain resolved to any IP address"
        );
        assert!(error.format_for_console(true).contains("No domain resolved"));

        let verbose = ErrorReporter::new(false, true).render(&error);
        assert!(verbose.contains("Suggestion:"));
        assert!(verbose.contains("might be temporary"));

        let terse = ErrorReporter::new(false, false).render(&error);
        assert!(!terse.contains("Suggestion:"));
    }
}
