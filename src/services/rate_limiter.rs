use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration, Instant};
use parking_lot::Mutex;

/// Paces outbound registry requests.
///
/// The filing registry enforces a fair-access limit (10 requests/second per
/// client). Every request made by `EdgarClient` goes through `acquire`, so a
/// batch of workers shares one budget.
pub struct RateLimiter {
    /// Caps in-flight requests
    semaphore: Arc<Semaphore>,
    /// Earliest instant the next request may start
    next_slot: Arc<Mutex<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_concurrent` - Maximum in-flight requests
    /// * `requests_per_second` - Sustained request rate (0 is treated as 1)
    pub fn new(max_concurrent: usize, requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1) as u64;
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            next_slot: Arc::new(Mutex::new(Instant::now())),
            min_interval: Duration::from_micros(1_000_000 / rps),
        }
    }

    /// Waits for an in-flight slot and for this request's turn in the pacing schedule.
    ///
    /// Returns a guard that releases the slot when dropped.
    pub async fn acquire(&self) -> RateLimitGuard {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");

        // Reserve a slot under the lock, sleep outside it
        let wait_until = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.min_interval;
            slot
        };

        let now = Instant::now();
        if wait_until > now {
            sleep(wait_until - now).await;
        }

        RateLimitGuard { _permit: permit }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Holds an in-flight slot until dropped
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
