//! Timer-based notification coalescer.
//!
//! The first submission in a session is delivered synchronously; later
//! submissions are held for the configured window, last-write-wins, and
//! released by polling. There is no background timer thread; the editor
//! drives `poll` at the end of each transaction and on demand.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Coalescer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
    has_fired: bool,
}

impl<T> Coalescer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            has_fired: false,
        }
    }

    /// Submit a payload. Returns it back when it must be delivered
    /// immediately (first submission ever); otherwise holds it,
    /// superseding any payload already waiting.
    pub fn submit(&mut self, payload: T, now: Instant) -> Option<T> {
        if !self.has_fired {
            self.has_fired = true;
            return Some(payload);
        }
        self.pending = Some((now + self.delay, payload));
        None
    }

    /// Release the held payload once its window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, p)| p),
            _ => None,
        }
    }

    /// Release the held payload regardless of its window
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, p)| p)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_submission_is_synchronous() {
        let mut coalescer = Coalescer::new(Duration::from_millis(100));
        let now = Instant::now();
        assert_eq!(coalescer.submit(1, now), Some(1));
    }

    #[test]
    fn test_later_submissions_coalesce_last_write_wins() {
        let mut coalescer = Coalescer::new(Duration::from_millis(100));
        let now = Instant::now();

        assert_eq!(coalescer.submit(1, now), Some(1));
        assert_eq!(coalescer.submit(2, now), None);
        assert_eq!(coalescer.submit(3, now + Duration::from_millis(10)), None);

        // Not due yet.
        assert_eq!(coalescer.poll(now + Duration::from_millis(50)), None);
        // Due, and only the last payload survives.
        assert_eq!(coalescer.poll(now + Duration::from_millis(200)), Some(3));
        assert!(!coalescer.has_pending());
    }
}
