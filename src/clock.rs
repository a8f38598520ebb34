use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Time source for the polling loops
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Virtual clock for tests: `sleep` returns immediately and advances `now`.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    origin: Instant,
    elapsed: std::sync::Mutex<Duration>,
    sleeps: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: std::sync::Mutex::new(Duration::ZERO),
            sleeps: Default::default(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub(crate) fn sleeps(&self) -> usize {
        self.sleeps.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        std::future::ready(())
    }
}
