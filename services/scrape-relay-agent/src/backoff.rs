// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Exponential backoff for failed polls

use std::time::Duration;

/// Growth factor applied after every interval.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Exponential backoff bounded by an initial and a maximum wait.
///
/// There is no limit on total elapsed time; the poll loop never gives up.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            current: initial.min(max),
            max,
            multiplier: BACKOFF_MULTIPLIER,
        }
    }

    /// Interval to wait before the next attempt.
    ///
    /// Returned intervals are non-decreasing and never exceed the maximum.
    pub fn next_interval(&mut self) -> Duration {
        let result = self.current;
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = next.min(self.max);
        result
    }

    /// Start over from the initial interval.
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.next_interval(), Duration::from_secs(1));
        assert_eq!(backoff.next_interval(), Duration::from_millis(1500));
        assert_eq!(backoff.next_interval(), Duration::from_millis(2250));
        assert_eq!(backoff.next_interval(), Duration::from_micros(3_375_000));
        // 5.0625s capped
        assert_eq!(backoff.next_interval(), Duration::from_secs(5));
        assert_eq!(backoff.next_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_never_exceeds_max_and_never_decreases() {
        let max = Duration::from_millis(7300);
        let mut backoff = Backoff::new(Duration::from_millis(130), max);

        let mut previous = Duration::ZERO;
        for _ in 0..50 {
            let interval = backoff.next_interval();
            assert!(interval >= previous, "{:?} < {:?}", interval, previous);
            assert!(interval <= max, "{:?} > {:?}", interval, max);
            previous = interval;
        }
        assert_eq!(previous, max);
    }

    #[test]
    fn test_backoff_initial_above_max() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(2));
        assert_eq!(backoff.next_interval(), Duration::from_secs(2));
        assert_eq!(backoff.next_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        backoff.next_interval();
        backoff.next_interval();
        backoff.next_interval();

        backoff.reset();
        assert_eq!(backoff.next_interval(), Duration::from_secs(1));
        assert_eq!(backoff.next_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_huge_max_does_not_panic() {
        let mut backoff = Backoff::new(Duration::from_secs(u64::MAX / 2), Duration::MAX);
        backoff.next_interval();
        backoff.next_interval();
        assert_eq!(backoff.next_interval(), Duration::MAX);
    }
}
