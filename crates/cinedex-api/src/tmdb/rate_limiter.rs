//! Request spacing for the TMDB API.

use std::time::Duration;

use tokio::time::Instant;

/// Default minimum interval between requests (~40 req/s).
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(25);

/// Hands out send slots at least `min_interval` apart.
///
/// Callers reserve a slot under the lock and sleep outside it, so
/// concurrent requests queue in reservation order. A request rejected
/// anyway (HTTP 429) is reported to the caller, never re-sent.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbRateLimiter {
    min_interval: Duration,
    /// Earliest instant the next request may be sent.
    next_slot: Option<Instant>,
}

impl TmdbRateLimiter {
    pub(crate) const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: None,
        }
    }

    pub(crate) const fn default_interval() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }

    /// Reserves the next send slot and returns when it opens.
    pub(crate) fn reserve(&mut self) -> Instant {
        let now = Instant::now();
        let slot = self.next_slot.map_or(now, |next| next.max(now));
        self.next_slot = Some(slot + self.min_interval);
        if slot > now {
            tracing::trace!(wait_ms = (slot - now).as_millis(), "TMDB request spacing");
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_slot_is_immediate() {
        // Arrange
        let mut limiter = TmdbRateLimiter::new(Duration::from_secs(1));
        let before = Instant::now();

        // Act
        let slot = limiter.reserve();

        // Assert
        assert!(slot >= before);
        assert!(slot <= Instant::now());
    }

    #[test]
    fn test_back_to_back_reservations_queue_up() {
        // Arrange
        let mut limiter = TmdbRateLimiter::new(Duration::from_secs(1));

        // Act
        let [first, second, third] = [limiter.reserve(), limiter.reserve(), limiter.reserve()];

        // Assert
        assert_eq!(second - first, Duration::from_secs(1));
        assert_eq!(third - second, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_idle_time_is_not_banked() {
        // Arrange
        let mut limiter = TmdbRateLimiter::new(Duration::from_millis(20));
        limiter.reserve();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        let before = Instant::now();
        let first = limiter.reserve();
        let second = limiter.reserve();

        // Assert
        assert!(first >= before);
        assert_eq!(second - first, Duration::from_millis(20));
    }

    #[test]
    fn test_default_interval() {
        // Arrange & Act
        let limiter = TmdbRateLimiter::default_interval();

        // Assert
        assert_eq!(limiter.min_interval, Duration::from_millis(25));
        assert!(limiter.next_slot.is_none());
    }
}
