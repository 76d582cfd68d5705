//! Coalescing of high-frequency progress samples

use std::time::{Duration, Instant};

/// Lets at most one sample through per interval.
///
/// Samples arriving inside the interval are held back; the newest one is
/// handed out by [`ProgressThrottle::drain`] once the source is done.
#[derive(Debug)]
pub struct ProgressThrottle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
}

impl<T: Clone> ProgressThrottle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    /// Offer a sample; returns it if it should be persisted now.
    pub fn offer(&mut self, sample: T) -> Option<T> {
        self.offer_at(sample, Instant::now())
    }

    fn offer_at(&mut self, sample: T, now: Instant) -> Option<T> {
        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);

        if due {
            self.last_emit = Some(now);
            self.pending = None;
            Some(sample)
        } else {
            self.pending = Some(sample);
            None
        }
    }

    /// Take the newest sample that was held back, if any.
    pub fn drain(&mut self) -> Option<T> {
        self.pending.take()
    }
}
