//! Data models and structures for the network IP prober

pub mod config;
pub mod dns;
pub mod probe;

// Re-export main model types
pub use config::Config;
pub use dns::{
    DomainResolution, FailureKind, ResolutionAnalysis, ResolutionResult, SpeedTier, SystemResolution,
    UniqueIpRecord, SYSTEM_DNS_SOURCE,
};
pub use probe::{NetworkTestRecord, PingMethod, PingResult, SpeedResult, SpeedResults, TestDirection};
