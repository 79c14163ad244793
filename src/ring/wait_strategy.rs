//! Consumer back-off policies used while the queue is empty.

use std::fmt;
use std::hint;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Sequence;

/// How the consumer waits for the producer to publish `sequence`.
///
/// Implementations return the highest published sequence, which is at least
/// `sequence`.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64;

    /// Called by the producer after every publish.
    fn signal_all_when_blocking(&self) {}
}

/// Spin on the cursor. Lowest latency, burns a core.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            hint::spin_loop();
        }
    }
}

/// Spin briefly, then yield the thread between checks.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new(100)
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        let mut counter = self.spin_tries;
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                hint::spin_loop();
            }
        }
    }
}

/// Spin, then yield, then sleep for a fixed interval between checks.
///
/// Bounds CPU use under low load at the cost of up to `sleep` extra latency.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    pub fn new(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(200, Duration::from_nanos(100))
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        let mut counter = self.retries;
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            if counter > self.retries / 2 {
                counter -= 1;
                hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep);
            }
        }
    }
}

/// Park on a condition variable until the producer signals a publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    lock: Mutex<()>,
    published: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        let available = cursor.get();
        if available >= sequence {
            return available;
        }

        // The mutex guards no data, so a poisoned guard is still usable.
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            guard = self
                .published
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.published.notify_all();
    }
}

/// Configurable choice of [`WaitStrategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategyKind {
    BusySpin,
    Yielding {
        #[serde(default = "default_spin_tries")]
        spin_tries: u32,
    },
    Sleeping {
        #[serde(default = "default_sleep_retries")]
        retries: u32,
        #[serde(default = "default_sleep_nanos")]
        sleep_nanos: u64,
    },
    Blocking,
}

fn default_spin_tries() -> u32 {
    100
}

fn default_sleep_retries() -> u32 {
    200
}

fn default_sleep_nanos() -> u64 {
    100
}

impl Default for WaitStrategyKind {
    fn default() -> Self {
        WaitStrategyKind::Sleeping {
            retries: default_sleep_retries(),
            sleep_nanos: default_sleep_nanos(),
        }
    }
}

impl WaitStrategyKind {
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            WaitStrategyKind::BusySpin => Arc::new(BusySpinWaitStrategy),
            WaitStrategyKind::Yielding { spin_tries } => {
                Arc::new(YieldingWaitStrategy::new(spin_tries))
            }
            WaitStrategyKind::Sleeping {
                retries,
                sleep_nanos,
            } => Arc::new(SleepingWaitStrategy::new(
                retries,
                Duration::from_nanos(sleep_nanos),
            )),
            WaitStrategyKind::Blocking => Arc::new(BlockingWaitStrategy::new()),
        }
    }
}
