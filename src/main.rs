//! Network IP Prober - Main CLI Application
//!
//! Resolves domains through many DNS servers at once, probes every IP that
//! comes back for latency and throughput, and prints the best ones.

use clap::Parser;
use network_ip_prober::{
    app::App,
    cli::Cli,
    error::{AppError, ErrorReporter},
};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue at: https://github.com/MaurUppi/network-ip-prober/issues");
        process::exit(1);
    }));

    let cli = Cli::parse();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        process::exit(2);
    }

    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    if let Err(e) = App::new(cli).run().await {
        reporter.report_error(&e);
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format (see --env-help)");
            eprintln!("  - DNS servers must be plain IP addresses");
            eprintln!("  - Speed endpoints must be http:// or https:// URLs");
        }
        AppError::DnsResolution(_) => {
            eprintln!();
            eprintln!("DNS resolution help:");
            eprintln!("  - Check that the domains exist");
            eprintln!("  - Try --exhaustive to wait for every server");
            eprintln!("  - Try different servers with --dns-servers 8.8.8.8,1.1.1.1");
        }
        AppError::Network(_) | AppError::Probe(_) => {
            eprintln!();
            eprintln!("Network troubleshooting:");
            eprintln!("  - Check your internet connection and firewall");
            eprintln!("  - Raw ICMP may need elevated privileges; the system ping is used otherwise");
        }
        _ => {}
    }
}
