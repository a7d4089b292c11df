//! Cross-server consistency check for DNS answers

use crate::models::ResolutionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

pub const INCONCLUSIVE_MESSAGE: &str = "inconclusive: insufficient servers";
pub const CLEAN_MESSAGE: &str = "no obvious DNS poisoning detected";

/// Advisory verdict; nothing acts on it automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisoningVerdict {
    pub is_poisoned: bool,
    pub message: String,
    pub suspect_server: Option<String>,
}

impl PoisoningVerdict {
    fn clean(message: &str) -> Self {
        Self {
            is_poisoned: false,
            message: message.to_string(),
            suspect_server: None,
        }
    }
}

/// Flag the first successful server whose answer shares no IP with the
/// first successful answer
pub fn detect_poisoning(results: &[ResolutionResult]) -> PoisoningVerdict {
    let mut successes = results.iter().filter(|r| r.success);
    let (Some(reference), Some(_)) = (successes.next(), successes.clone().next()) else {
        return PoisoningVerdict::clean(INCONCLUSIVE_MESSAGE);
    };

    let baseline: HashSet<IpAddr> = reference.ips.iter().copied().collect();
    for other in successes {
        if other.ips.iter().all(|ip| !baseline.contains(ip)) {
            return PoisoningVerdict {
                is_poisoned: true,
                message: format!(
                    "possible DNS poisoning: {} returned no addresses in common with {}",
                    other.server, reference.server
                ),
                suspect_server: Some(other.server.clone()),
            };
        }
    }

    PoisoningVerdict::clean(CLEAN_MESSAGE)
}
