use std::time::{Duration, Instant};

/// Clock abstraction to enforce deterministic time sourcing in core paths.
///
/// Monotonic time (`now`/`sleep`) drives the dispatch timeout and the
/// reattachment grace period; wall-clock timestamps on messages are taken
/// separately via [`wall_now`].
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> tokio::time::Sleep;
}

/// System-backed clock; timers resolve against the tokio runtime, so tests
/// running under `#[tokio::test(start_paused = true)]` control them.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(duration)
    }
}

/// Wall-clock timestamp for message `published`/`relevance` fields.
pub fn wall_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
