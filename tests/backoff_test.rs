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

//! Backoff sequence behavior through the public API.

use std::time::Duration;

use drover::backoff::{delay_for_attempt, Backoff};

#[test]
fn first_six_delays_follow_the_sequence() {
    let mut backoff = Backoff::new();
    let observed: Vec<u64> = (0..6).map(|_| backoff.delay().as_secs()).collect();
    assert_eq!(observed, [0, 1, 2, 3, 5, 8]);
}

#[test]
fn thirteenth_call_and_beyond_return_the_last_value() {
    let mut backoff = Backoff::new();
    for _ in 0..12 {
        backoff.delay();
    }
    assert_eq!(backoff.delay(), Duration::from_secs(144));
    assert_eq!(backoff.delay(), Duration::from_secs(144));
}

#[test]
fn reset_restarts_the_sequence() {
    let mut backoff = Backoff::new();
    for _ in 0..7 {
        backoff.delay();
    }
    backoff.reset();
    assert_eq!(backoff.delay(), Duration::ZERO);
}

#[test]
fn cap_bounds_every_delay() {
    let mut backoff = Backoff::with_cap(Duration::from_secs(10));
    let max = (0..20).map(|_| backoff.delay()).max().unwrap();
    assert_eq!(max, Duration::from_secs(10));
}

#[test]
fn pure_mapping_matches_the_stateful_helper() {
    let mut backoff = Backoff::new();
    for attempt in 0..15 {
        assert_eq!(backoff.delay(), delay_for_attempt(attempt, None));
    }
}
