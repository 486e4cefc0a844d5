use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaceFrom {
    /// The delay runs from when the previous call started.
    Start,
    /// The delay runs from when the previous call returned.
    Completion,
}

/// Shared call pacer for the sweep.
///
/// A sequential sweep waits `delay` after each call returns before starting
/// the next one. With several workers in flight the pacer instead spaces call
/// starts at least `delay` apart. The first call never waits in either mode.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    from: PaceFrom,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    /// Gap of `delay` between one call returning and the next starting.
    pub fn sequential(delay: Duration) -> Self {
        Self::with_mode(delay, PaceFrom::Completion)
    }

    /// Call starts spaced `delay` apart across all workers.
    pub fn spaced_starts(delay: Duration) -> Self {
        Self::with_mode(delay, PaceFrom::Start)
    }

    /// Picks the mode for a sweep running `concurrency` calls at once.
    pub fn for_concurrency(delay: Duration, concurrency: usize) -> Self {
        if concurrency <= 1 {
            Self::sequential(delay)
        } else {
            Self::spaced_starts(delay)
        }
    }

    fn with_mode(delay: Duration, from: PaceFrom) -> Self {
        Self {
            delay,
            from,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot before starting a call.
    pub async fn acquire(&self) {
        // Holding the lock while sleeping queues later callers behind us.
        let mut next = self.next_slot.lock().await;
        if let Some(slot) = *next {
            if slot > Instant::now() {
                sleep_until(slot).await;
            }
        }
        if self.from == PaceFrom::Start {
            *next = Some(Instant::now() + self.delay);
        }
    }

    /// Mark the call started by the matching `acquire` as returned.
    pub async fn release(&self) {
        if self.from == PaceFrom::Completion {
            *self.next_slot.lock().await = Some(Instant::now() + self.delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaced_starts_ignore_call_duration() {
        let pacer = Pacer::spaced_starts(Duration::from_millis(50));
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_waits_after_each_slow_call() {
        let pacer = Pacer::sequential(Duration::from_millis(50));
        let start = Instant::now();
        for _ in 0..3 {
            pacer.acquire().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            pacer.release().await;
        }
        // 3 calls of 200ms with two 50ms gaps between them.
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_never_sleeps() {
        for pacer in [
            Pacer::sequential(Duration::ZERO),
            Pacer::spaced_starts(Duration::ZERO),
        ] {
            let start = Instant::now();
            for _ in 0..5 {
                pacer.acquire().await;
                pacer.release().await;
            }
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[test]
    fn mode_follows_concurrency() {
        assert_eq!(
            Pacer::for_concurrency(Duration::ZERO, 1).from,
            PaceFrom::Completion
        );
        assert_eq!(
            Pacer::for_concurrency(Duration::ZERO, 4).from,
            PaceFrom::Start
        );
    }
}
