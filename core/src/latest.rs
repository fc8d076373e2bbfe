//! Latest-wins guard for racing asynchronous lookups.
//!
//! Every new lookup takes a `Ticket`; when its result arrives it is only kept
//! if no newer lookup was started in the meantime. In-flight requests are
//! never aborted, their results are just dropped.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct LatestWins {
    generation: AtomicU64,
}

impl LatestWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a lookup. Any earlier ticket becomes stale.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// `Some(value)` if `ticket` is still the newest, `None` if stale.
    pub fn finish<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        self.is_current(ticket).then_some(value)
    }

    /// Make every outstanding ticket stale, e.g. when the input is cleared.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `f` under a fresh ticket.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let ticket = self.begin();
        let value = f();
        self.finish(ticket, value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn newest_ticket_wins() {
        let guard = LatestWins::new();
        let first = guard.begin();
        let second = guard.begin();
        assert_eq!(guard.finish(first, "ali"), None);
        assert_eq!(guard.finish(second, "alice"), Some("alice"));
    }

    #[test]
    fn invalidate_discards_everything_in_flight() {
        let guard = LatestWins::new();
        let ticket = guard.begin();
        guard.invalidate();
        assert!(!guard.is_current(ticket));
    }

    #[test]
    fn run_keeps_uncontested_result() {
        let guard = LatestWins::new();
        assert_eq!(guard.run(|| 42), Some(42));
    }

    #[test]
    fn slow_stale_lookup_is_dropped_across_threads() {
        let guard = Arc::new(LatestWins::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let slow = {
            let guard = guard.clone();
            thread::spawn(move || {
                guard.run(|| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    "stale"
                })
            })
        };

        started_rx.recv().unwrap();
        let fresh = guard.run(|| "fresh");
        release_tx.send(()).unwrap();

        assert_eq!(fresh, Some("fresh"));
        assert_eq!(slow.join().unwrap(), None);
    }
}
