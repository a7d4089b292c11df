//! Exponential backoff with optional jitter

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Maximum attempts the resolver makes against one server
pub const RESOLVER_MAX_ATTEMPTS: u32 = 2;

/// Delay the resolver sleeps after failed attempt `attempt` (0-based): `0.2 * 2^attempt` s
pub fn resolver_retry_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64(0.2 * 2f64.powi(attempt as i32))
}

/// Retry schedule: `min(base * 2^attempt, max) * U(0.5, 1.5)`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 5,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32, jitter: bool) -> Self {
        Self { base_delay, max_delay, max_retries, jitter }
    }

    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(62) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..1.5)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Run `op` until it succeeds or retries run out, returning the last error
    pub async fn execute_with_retry<F, Fut, T, E>(&self, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(_) if self.should_retry(attempt) => {
                    tokio::time::sleep(self.get_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
