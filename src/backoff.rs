use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Suspends the sync between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Ordered waits, one per attempt. A zero wait means the attempt starts immediately.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    waits: Vec<Duration>,
}

impl Backoff {
    pub fn new(waits: Vec<Duration>) -> Self {
        Self { waits }
    }

    pub fn attempts(&self) -> usize {
        self.waits.len()
    }

    /// Wait before the attempt with index `attempt`, `None` once the budget is spent.
    pub fn wait(&self, attempt: usize) -> Option<Duration> {
        self.waits.get(attempt).cloned()
    }

    pub fn is_last(&self, attempt: usize) -> bool {
        attempt + 1 >= self.waits.len()
    }
}

#[cfg(test)]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use futures::future;

    use super::*;

    /// Records requested sleeps and returns immediately.
    #[derive(Clone, Default)]
    pub struct RecordingSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        pub fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.slept.lock().unwrap().push(duration);
            future::ready(()).boxed()
        }
    }
}
