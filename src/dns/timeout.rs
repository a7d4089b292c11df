//! Per-server timeout selection from observed response times

use crate::models::SpeedTier;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Weights for the most recent samples, oldest first
const RECENT_WEIGHTS: [f64; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

/// Minimum samples before the weighted tiers apply
pub const MIN_HISTORY_SAMPLES: usize = 3;

/// Timeout used when nothing is known about a server
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Weighted mean of the newest (up to five) samples
///
/// The heaviest weight goes to the newest sample. Returns `None` for an
/// empty history.
pub fn weighted_recent_average<'a, I>(history: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
{
    let iter = history.into_iter();
    let len = iter.len();
    if len == 0 {
        return None;
    }
    let take = len.min(RECENT_WEIGHTS.len());
    let recent: Vec<f64> = iter.skip(len - take).copied().collect();
    let weights = &RECENT_WEIGHTS[RECENT_WEIGHTS.len() - take..];

    let weighted: f64 = recent.iter().zip(weights).map(|(v, w)| v * w).sum();
    Some(weighted / weights.iter().sum::<f64>())
}

/// Timeout band for a weighted mean in ms
pub fn timeout_for_average(avg_ms: f64) -> Duration {
    let millis = if avg_ms < 300.0 {
        800
    } else if avg_ms < 600.0 {
        1200
    } else if avg_ms < 1200.0 {
        2000
    } else if avg_ms < 2500.0 {
        3500
    } else {
        5000
    };
    Duration::from_millis(millis)
}

/// Timeout derived from the resolver's first completed query
pub fn timeout_for_first_query(first_ms: f64) -> Duration {
    let millis = if first_ms < 300.0 {
        1200
    } else if first_ms < 800.0 {
        2000
    } else {
        3500
    };
    Duration::from_millis(millis)
}

/// Timeout for the next query to a server
///
/// Servers with too little history fall back to the resolver-wide first
/// query time, then to the default.
pub fn select_timeout(history: &VecDeque<f64>, first_query_ms: Option<f64>) -> Duration {
    if history.len() >= MIN_HISTORY_SAMPLES {
        if let Some(avg) = weighted_recent_average(history) {
            return timeout_for_average(avg);
        }
    }
    first_query_ms
        .map(timeout_for_first_query)
        .unwrap_or(DEFAULT_QUERY_TIMEOUT)
}

/// Label for a server's response speed
pub fn speed_tier_for(history: &VecDeque<f64>) -> SpeedTier {
    if history.is_empty() {
        return SpeedTier::Unknown;
    }

    if history.len() >= MIN_HISTORY_SAMPLES {
        let avg = weighted_recent_average(history).unwrap_or(0.0);
        return if avg < 300.0 {
            SpeedTier::VeryFast
        } else if avg < 600.0 {
            SpeedTier::Fast
        } else if avg < 1200.0 {
            SpeedTier::Normal
        } else if avg < 2500.0 {
            SpeedTier::Slow
        } else {
            SpeedTier::VerySlow
        };
    }

    let avg = history.iter().sum::<f64>() / history.len() as f64;
    if avg < 500.0 {
        SpeedTier::Fast
    } else if avg < 1500.0 {
        SpeedTier::Normal
    } else {
        SpeedTier::Slow
    }
}

/// Timeout that tracks a server's recent mean response time
///
/// `timeout = mean(last 10) * factor * 2`, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct AdaptiveTimeout {
    pub base_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub adaptation_factor: f64,
    history: HashMap<String, VecDeque<f64>>,
}

const ADAPTIVE_HISTORY: usize = 20;
const ADAPTIVE_WINDOW: usize = 10;

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_millis(500),
            Duration::from_secs(10),
            0.8,
        )
    }
}

impl AdaptiveTimeout {
    pub fn new(base_timeout: Duration, min_timeout: Duration, max_timeout: Duration, adaptation_factor: f64) -> Self {
        Self {
            base_timeout,
            min_timeout,
            max_timeout,
            adaptation_factor,
            history: HashMap::new(),
        }
    }

    pub fn get_timeout(&self, server: &str) -> Duration {
        let Some(history) = self.history.get(server).filter(|h| !h.is_empty()) else {
            return self.base_timeout;
        };

        let recent: Vec<f64> = history.iter().rev().take(ADAPTIVE_WINDOW).copied().collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let secs = (mean * self.adaptation_factor * 2.0)
            .clamp(self.min_timeout.as_secs_f64(), self.max_timeout.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Record a response time; failures count too since they bound the wait
    pub fn update(&mut self, server: &str, response_time: Duration, _success: bool) {
        let history = self.history.entry(server.to_string()).or_default();
        if history.len() == ADAPTIVE_HISTORY {
            history.pop_front();
        }
        history.push_back(response_time.as_secs_f64());
    }

    pub fn samples(&self, server: &str) -> usize {
        self.history.get(server).map(VecDeque::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f64]) -> VecDeque<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_weighted_average_prefers_newest() {
        let h = history(&[100.0, 100.0, 100.0, 100.0, 1000.0]);
        let avg = weighted_recent_average(&h).unwrap();
        assert!((avg - 100.0 - 900.0 * 3.0 / 10.0).abs() < 1e-9);

        let short = history(&[100.0, 400.0]);
        let avg = weighted_recent_average(&short).unwrap();
        assert!((avg - (100.0 * 2.5 + 400.0 * 3.0) / 5.5).abs() < 1e-9);

        assert!(weighted_recent_average(&VecDeque::new()).is_none());
    }

    #[test]
    fn test_only_last_five_samples_count() {
        let h = history(&[9000.0, 9000.0, 50.0, 50.0, 50.0, 50.0, 50.0]);
        assert_eq!(weighted_recent_average(&h), Some(50.0));
    }

    #[test]
    fn test_timeout_bands() {
        assert_eq!(timeout_for_average(299.0), Duration::from_millis(800));
        assert_eq!(timeout_for_average(300.0), Duration::from_millis(1200));
        assert_eq!(timeout_for_average(1199.0), Duration::from_secs(2));
        assert_eq!(timeout_for_average(2000.0), Duration::from_millis(3500));
        assert_eq!(timeout_for_average(2500.0), Duration::from_secs(5));
    }

    #[test]
    fn test_select_timeout_paths() {
        assert_eq!(select_timeout(&VecDeque::new(), None), DEFAULT_QUERY_TIMEOUT);
        assert_eq!(select_timeout(&VecDeque::new(), Some(100.0)), Duration::from_millis(1200));
        assert_eq!(select_timeout(&VecDeque::new(), Some(500.0)), Duration::from_secs(2));
        assert_eq!(select_timeout(&VecDeque::new(), Some(900.0)), Duration::from_millis(3500));
        assert_eq!(select_timeout(&history(&[50.0, 60.0]), Some(900.0)), Duration::from_millis(3500));
        assert_eq!(select_timeout(&history(&[50.0, 60.0]), None), DEFAULT_QUERY_TIMEOUT);
        assert_eq!(select_timeout(&history(&[50.0, 60.0, 70.0]), None), Duration::from_millis(800));
    }

    #[test]
    fn test_speed_tiers() {
        assert_eq!(speed_tier_for(&VecDeque::new()), SpeedTier::Unknown);
        assert_eq!(speed_tier_for(&history(&[100.0])), SpeedTier::Fast);
        assert_eq!(speed_tier_for(&history(&[1000.0, 1200.0])), SpeedTier::Normal);
        assert_eq!(speed_tier_for(&history(&[2000.0])), SpeedTier::Slow);
        assert_eq!(speed_tier_for(&history(&[10.0, 20.0, 30.0])), SpeedTier::VeryFast);
        assert_eq!(speed_tier_for(&history(&[3000.0, 3000.0, 3000.0])), SpeedTier::VerySlow);
    }

    #[test]
    fn test_adaptive_timeout() {
        let mut adaptive = AdaptiveTimeout::default();
        assert_eq!(adaptive.get_timeout("8.8.8.8"), Duration::from_secs(2));

        adaptive.update("8.8.8.8", Duration::from_millis(1000), true);
        assert_eq!(adaptive.get_timeout("8.8.8.8"), Duration::from_secs_f64(1.6));

        adaptive.update("1.1.1.1", Duration::from_millis(10), true);
        assert_eq!(adaptive.get_timeout("1.1.1.1"), Duration::from_millis(500));

        adaptive.update("9.9.9.9", Duration::from_secs(30), false);
        assert_eq!(adaptive.get_timeout("9.9.9.9"), Duration::from_secs(10));

        for _ in 0..30 {
            adaptive.update("8.8.8.8", Duration::from_millis(100), true);
        }
        assert_eq!(adaptive.samples("8.8.8.8"), 20);
    }
}
