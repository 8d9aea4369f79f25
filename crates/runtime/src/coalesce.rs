use std::time::Duration;

use tokio::time::Instant;

/// Default window used to coalesce bursts of view notifications.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(16);

/// Collapses a burst of notifications into a single delivery.
///
/// The first notification opens a window; later notifications inside it only
/// replace the pending value. When the window closes the latest value is
/// delivered once.
#[derive(Debug)]
pub struct Coalescer<T> {
    window: Duration,
    deadline: Option<Instant>,
    latest: Option<T>,
}

impl<T> Coalescer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            latest: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records `value`; opens a window if none is running.
    pub fn push(&mut self, value: T, now: Instant) {
        self.latest = Some(value);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Takes the pending value once the window has closed.
    pub fn poll_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.latest.take()
            }
            _ => None,
        }
    }

    /// Resolves when the running window closes; pending forever otherwise.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.latest = None;
    }
}

/// Passes a value through only when it differs from the last one passed.
#[derive(Debug, Default)]
pub struct Distinct<T> {
    last: Option<T>,
}

impl<T: PartialEq> Distinct<T> {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn changed(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
