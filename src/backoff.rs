// Copyright 2025 The drover authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Escalating delay sequence for retry loops around connection attempts.
//!
//! The helper only supplies wait durations; the caller owns the retry loop.

use std::time::Duration;

/// Delay steps in seconds. The last value repeats once the sequence is
/// exhausted.
pub const DELAYS: [u64; 12] = [0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144];

/// Delay for the given zero-based attempt number, clamped at the last step
/// and capped at `cap` when one is given.
pub fn delay_for_attempt(attempt: usize, cap: Option<Duration>) -> Duration {
    let step = attempt.min(DELAYS.len() - 1);
    let delay = Duration::from_secs(DELAYS[step]);
    match cap {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Attempt counter over [`delay_for_attempt`].
///
/// Each [`delay`](Backoff::delay) call returns the duration for the current
/// attempt and advances the counter. [`reset`](Backoff::reset) restores the
/// initial state after a successful attempt.
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    attempt: usize,
    cap: Option<Duration>,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every returned delay at `cap`.
    pub fn with_cap(cap: Duration) -> Self {
        Self {
            attempt: 0,
            cap: Some(cap),
        }
    }

    /// The delay for the current attempt; advances the counter.
    pub fn delay(&mut self) -> Duration {
        let delay = delay_for_attempt(self.attempt, self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Restore the initial state.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Sleep for the current attempt's delay, then advance the counter.
    pub async fn wait(&mut self) {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_prefix() {
        let mut backoff = Backoff::new();
        let observed: Vec<u64> = (0..6).map(|_| backoff.delay().as_secs()).collect();
        assert_eq!(observed, [0, 1, 2, 3, 5, 8]);
    }

    #[test]
    fn test_clamped_at_last_step() {
        let mut backoff = Backoff::new();
        for _ in 0..12 {
            backoff.delay();
        }
        assert_eq!(backoff.delay().as_secs(), 144);
        assert_eq!(backoff.delay().as_secs(), 144);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.delay();
        }
        backoff.reset();
        assert_eq!(backoff.delay().as_secs(), 0);
        assert_eq!(backoff.delay().as_secs(), 1);
    }

    #[test]
    fn test_cap() {
        let mut backoff = Backoff::with_cap(Duration::from_secs(4));
        let observed: Vec<u64> = (0..6).map(|_| backoff.delay().as_secs()).collect();
        assert_eq!(observed, [0, 1, 2, 3, 4, 4]);
    }

    #[test]
    fn test_pure_function_clamp() {
        assert_eq!(delay_for_attempt(0, None).as_secs(), 0);
        assert_eq!(delay_for_attempt(11, None).as_secs(), 144);
        assert_eq!(delay_for_attempt(100, None).as_secs(), 144);
        assert_eq!(
            delay_for_attempt(100, Some(Duration::from_secs(30))).as_secs(),
            30
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_advances() {
        let mut backoff = Backoff::new();
        backoff.wait().await; // step 0, no sleep
        let before = tokio::time::Instant::now();
        backoff.wait().await; // step 1, one second
        assert_eq!(before.elapsed(), Duration::from_secs(1));
    }
}
