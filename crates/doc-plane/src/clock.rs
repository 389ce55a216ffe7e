use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Time source for timestamps and for the ingestion checkpoint delays.
/// Substitutable so tests can advance time instead of waiting on it.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> Arc<Self> {
        Arc::new(SystemClock)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when `advance` is called. Pending sleeps are
/// re-checked against the new time on every advance.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    notify: Notify,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            notify: Notify::new(),
        }
    }

    pub fn starting_now() -> Arc<Self> {
        Arc::new(Self::new(Utc::now()))
    }

    pub fn advance(&self, step: Duration) {
        {
            let mut now = self.now.lock();
            *now += chrono::Duration::milliseconds(step.as_millis() as i64);
        }
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + chrono::Duration::milliseconds(duration.as_millis() as i64);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for the wakeup before re-checking the deadline; an
            // advance landing in between would otherwise be lost.
            notified.as_mut().enable();
            if self.now() >= deadline {
                return;
            }
            notified.await;
        }
    }
}
