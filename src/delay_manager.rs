use log::info;
use rand::Rng;
use std::time::Duration;

/// Bounds for the randomized pause taken before every search page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        DelayRange {
            min: Duration::from_millis(min_ms.min(max_ms)),
            max: Duration::from_millis(max_ms.max(min_ms)),
        }
    }

    pub fn none() -> Self {
        DelayRange {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let mut rng = rand::thread_rng();
        let ms = rng.gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        DelayRange::from_millis(2_000, 3_000)
    }
}

pub async fn random_page_delay(range: &DelayRange) {
    let delay = range.pick();
    if delay.is_zero() {
        return;
    }
    info!("Waiting for {} ms (Page Delay)...", delay.as_millis());
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_is_two_to_three_seconds() {
        let range = DelayRange::default();
        for _ in 0..50 {
            let d = range.pick();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(3));
        }
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let range = DelayRange::from_millis(500, 100);
        assert_eq!(range.min, Duration::from_millis(100));
        assert_eq!(range.max, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_range_returns_immediately() {
        let started = std::time::Instant::now();
        random_page_delay(&DelayRange::none()).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
