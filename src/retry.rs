// Retry policy for API requests that hit a bad gateway.

use crate::error::{PinpointError, Result};
use rand::Rng;
use std::time::{Duration, Instant};

/// Backoff for HTTP 502 responses: the delay grows with each attempt
/// (`attempt * jitter`, never under `floor`), and the loop gives up after
/// `max_attempts` or once `max_elapsed` has passed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_elapsed: Duration,
    pub floor: Duration,
    /// Jitter range in milliseconds, multiplied by the attempt number.
    pub jitter_ms: (u64, u64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            max_elapsed: Duration::from_secs(120),
            floor: Duration::from_millis(150),
            jitter_ms: (100, 400),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let (lo, hi) = self.jitter_ms;
        let jitter = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            lo
        };
        Duration::from_millis(jitter.saturating_mul(u64::from(attempt))).max(self.floor)
    }

    /// Call `send` until `should_retry` rejects its result, sleeping between
    /// attempts through `sleep`. Errors from `send` are returned at once.
    pub fn run<T>(
        &self,
        mut send: impl FnMut() -> Result<T>,
        should_retry: impl Fn(&T) -> bool,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = send()?;
            if !should_retry(&response) {
                return Ok(response);
            }
            if attempt >= self.max_attempts || started.elapsed() >= self.max_elapsed {
                tracing::warn!(attempts = attempt, "giving up on bad gateway");
                return Err(PinpointError::RetriesExhausted { attempts: attempt });
            }
            let delay = self.delay(attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "bad gateway, retrying");
            sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn scripted(statuses: &[u16]) -> impl FnMut() -> Result<u16> + '_ {
        let mut next = 0;
        move || {
            let status = statuses[next];
            next += 1;
            Ok(status)
        }
    }

    #[test]
    fn retries_bad_gateway_until_success() {
        let sleeps = RefCell::new(Vec::new());
        let status = RetryPolicy::default()
            .run(scripted(&[502, 502, 200]), |s| *s == 502, |d| sleeps.borrow_mut().push(d))
            .unwrap();

        assert_eq!(status, 200);
        let sleeps = sleeps.into_inner();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps.iter().all(|d| *d >= Duration::from_millis(150)));
    }

    #[test]
    fn other_statuses_are_not_retried() {
        let mut slept = 0;
        let status = RetryPolicy::default()
            .run(scripted(&[500]), |s| *s == 502, |_| slept += 1)
            .unwrap();
        assert_eq!(status, 500);
        assert_eq!(slept, 0);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let mut slept = 0;
        let err = policy
            .run(scripted(&[502, 502, 502, 200]), |s| *s == 502, |_| slept += 1)
            .unwrap_err();
        assert!(matches!(err, PinpointError::RetriesExhausted { attempts: 3 }));
        assert_eq!(slept, 2);
    }

    #[test]
    fn delay_grows_with_attempts_and_respects_floor() {
        let policy = RetryPolicy {
            jitter_ms: (100, 100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(150));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(5), Duration::from_millis(500));
    }
}
