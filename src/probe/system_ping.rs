//! Fallback latency check through the platform `ping` binary

use regex::Regex;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

/// Exit codes that still carry parseable replies (1 means some loss)
const ACCEPTED_EXIT_CODES: [i32; 2] = [0, 1];
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// `ping` dialect; they disagree on flag names and units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingPlatform {
    /// iputils and busybox: `-W` in whole seconds
    Linux,
    /// BSD ping: `-W` in milliseconds
    MacOs,
    Windows,
}

impl PingPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// Options for one `ping` invocation
#[derive(Debug, Clone)]
pub struct SystemPingOptions {
    pub count: u32,
    pub timeout: Duration,
    pub packet_size: usize,
    pub platform: PingPlatform,
}

impl SystemPingOptions {
    pub fn new(count: u32, timeout: Duration, packet_size: usize) -> Self {
        Self {
            count,
            timeout,
            packet_size,
            platform: PingPlatform::current(),
        }
    }

    /// Upper bound on the whole process run
    pub fn process_timeout(&self) -> Duration {
        let per_echo = self.timeout.as_secs_f64() + 1.0;
        Duration::from_secs_f64(self.count as f64 * per_echo + 5.0)
    }
}

/// Command-line arguments for pinging `ip`, target last
pub fn build_args(ip: IpAddr, options: &SystemPingOptions) -> Vec<String> {
    let mut args = Vec::new();
    if options.platform == PingPlatform::Windows {
        args.extend([
            "-n".to_string(),
            options.count.to_string(),
            "-w".to_string(),
            options.timeout.as_millis().to_string(),
            "-l".to_string(),
            options.packet_size.to_string(),
        ]);
        if ip.is_ipv6() {
            args.push("-6".to_string());
        }
    } else {
        let wait = match options.platform {
            PingPlatform::MacOs => options.timeout.as_millis().max(1).to_string(),
            _ => (options.timeout.as_secs_f64().ceil().max(1.0) as u64).to_string(),
        };
        args.extend(["-c".to_string(), options.count.to_string(), "-W".to_string(), wait]);
        if ip.is_ipv6() {
            args.push("-6".to_string());
        } else {
            args.extend(["-s".to_string(), options.packet_size.to_string()]);
        }
    }
    args.push(ip.to_string());
    args
}

fn unix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"time=(\d+\.\d+) ms", r"time=(\d+) ms"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn windows_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?i)time[=<](\d+)ms", r"时间[=<](\d+)ms"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Round-trip times in ms found in `ping` output
///
/// Patterns are tried in order and the first that matches anything wins.
pub fn parse_delays(output: &str, windows: bool) -> Vec<f64> {
    let patterns = if windows { windows_patterns() } else { unix_patterns() };
    for pattern in patterns {
        let delays: Vec<f64> = pattern
            .captures_iter(output)
            .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
            .collect();
        if !delays.is_empty() {
            return delays;
        }
    }
    Vec::new()
}

/// Run `ping` once and return the parsed delays plus any error text
pub async fn run_system_ping(ip: IpAddr, options: &SystemPingOptions) -> (Vec<f64>, Option<String>) {
    let mut command = Command::new("ping");
    command
        .args(build_args(ip, options))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(options.process_timeout(), command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return (Vec::new(), Some(format!("failed to run system ping: {}", err))),
        Err(_) => return (Vec::new(), Some(format!("system ping to {} timed out", ip))),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let code = output.status.code();
    let delays = parse_delays(&stdout, options.platform == PingPlatform::Windows);

    let accepted = code.map(|c| ACCEPTED_EXIT_CODES.contains(&c)).unwrap_or(false);
    let error = if delays.is_empty() {
        let preview: String = stdout.chars().take(OUTPUT_PREVIEW_CHARS).collect();
        let status = code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
        Some(if accepted {
            format!("no replies parsed from ping output (exit {}): {}", status, preview.trim())
        } else {
            format!("ping exited with status {}: {}", status, preview.trim())
        })
    } else {
        None
    };

    (delays, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(platform: PingPlatform) -> SystemPingOptions {
        SystemPingOptions {
            count: 4,
            timeout: Duration::from_millis(1500),
            packet_size: 64,
            platform,
        }
    }

    #[test]
    fn test_linux_args() {
        let v4 = build_args("10.0.0.1".parse().unwrap(), &options(PingPlatform::Linux));
        assert_eq!(v4, vec!["-c", "4", "-W", "2", "-s", "64", "10.0.0.1"]);

        let v6 = build_args("2001:db8::1".parse().unwrap(), &options(PingPlatform::Linux));
        assert_eq!(v6, vec!["-c", "4", "-W", "2", "-6", "2001:db8::1"]);
    }

    #[test]
    fn test_macos_wait_is_in_milliseconds() {
        let v4 = build_args("10.0.0.1".parse().unwrap(), &options(PingPlatform::MacOs));
        assert_eq!(v4, vec!["-c", "4", "-W", "1500", "-s", "64", "10.0.0.1"]);

        let mut short = options(PingPlatform::MacOs);
        short.timeout = Duration::from_micros(300);
        assert_eq!(build_args("10.0.0.1".parse().unwrap(), &short)[3], "1");
    }

    #[test]
    fn test_windows_args() {
        let v6 = build_args("2001:db8::1".parse().unwrap(), &options(PingPlatform::Windows));
        assert_eq!(v6, vec!["-n", "4", "-w", "1500", "-l", "64", "-6", "2001:db8::1"]);
    }

    #[test]
    fn test_process_timeout() {
        assert_eq!(options(PingPlatform::Linux).process_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_parse_unix_output() {
        let output = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms\n\
                      64 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=14.1 ms\n";
        assert_eq!(parse_delays(output, false), vec![12.3, 14.1]);

        let integral = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12 ms\n";
        assert_eq!(parse_delays(integral, false), vec![12.0]);
    }

    #[test]
    fn test_parse_windows_output() {
        let english = "Reply from 1.1.1.1: bytes=32 time=9ms TTL=57\nReply from 1.1.1.1: bytes=32 time<1ms TTL=57\n";
        assert_eq!(parse_delays(english, true), vec![9.0, 1.0]);

        let chinese = "来自 1.1.1.1 的回复: 字节=32 时间=15ms TTL=57\n";
        assert_eq!(parse_delays(chinese, true), vec![15.0]);
    }

    #[test]
    fn test_parse_nothing() {
        assert!(parse_delays("Request timed out.", true).is_empty());
        assert!(parse_delays("", false).is_empty());
    }
}
