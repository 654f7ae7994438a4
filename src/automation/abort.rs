//! Cancellation handle shared between the capture session and input watchers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Poll granularity of [`CancelToken::sleep`].
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Externally settable stop flag.
///
/// Cloning shares the flag. Cancellation is terminal: there is no way to
/// clear it once requested.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the session to stop at its next checkpoint.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early if cancellation is requested.
    ///
    /// Returns `false` if the wait was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.request();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.request();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let token = CancelToken::new();
        let handle = token.clone();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.request();
        });
        assert!(!token.sleep(Duration::from_secs(5)));
        worker.join().unwrap();
    }
}
