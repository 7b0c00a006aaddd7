//! Bounded polling.
//!
//! Every retry loop in the probe (dump retry, focus retry, language-cycle
//! retry) goes through the same combinator: a fixed attempt budget with a
//! short delay between attempts. The delay is a settle window, not a
//! synchronization primitive; callers re-snapshot to confirm effects.

use std::thread;
use std::time::Duration;

/// Poll `f` until it yields a value, up to `attempts` times with `delay`
/// between attempts (no trailing sleep after the last attempt).
pub fn poll_until<T>(
    attempts: usize,
    delay: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> Option<T> {
    for attempt in 0..attempts {
        if let Some(value) = f() {
            return Some(value);
        }
        if attempt + 1 < attempts && !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_first_success() {
        let mut calls = 0;
        let out = poll_until(5, Duration::ZERO, || {
            calls += 1;
            Some(42)
        });
        assert_eq!(out, Some(42));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_poll_until_eventual_success() {
        let mut calls = 0;
        let out = poll_until(5, Duration::ZERO, || {
            calls += 1;
            if calls == 3 { Some("ok") } else { None }
        });
        assert_eq!(out, Some("ok"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_poll_until_exhausts_budget() {
        let mut calls = 0;
        let out: Option<()> = poll_until(4, Duration::ZERO, || {
            calls += 1;
            None
        });
        assert_eq!(out, None);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_poll_until_zero_attempts() {
        let out: Option<()> = poll_until(0, Duration::ZERO, || panic!("must not be called"));
        assert_eq!(out, None);
    }
}
