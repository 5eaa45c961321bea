//! Bounded event collector
//!
//! Collects items handed over from listeners (which may run on any task or
//! thread) and lets async code wait until an expected number arrived or a
//! deadline passed, whichever comes first.
//!
//! ```ignore
//! let receiver = EventReceiver::new(3);
//! let giver = receiver.giver();
//! manager.on(EventKind::Message, move |event| giver.give(event.clone()));
//! let events = receiver.wait().await;
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Default upper bound on [`EventReceiver::wait`]
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable sending side of an [`EventReceiver`]
#[derive(Debug, Clone)]
pub struct EventGiver<T> {
    tx: Sender<T>,
}

impl<T> EventGiver<T> {
    /// Hand over one item; silently dropped once the receiver is gone
    pub fn give(&self, item: T) {
        let _ = self.tx.send(item);
    }
}

/// Waits for an expected number of items
#[derive(Debug)]
pub struct EventReceiver<T> {
    expected: usize,
    max_wait: Duration,
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> EventReceiver<T> {
    /// Expect `expected` items within [`DEFAULT_MAX_WAIT`]
    pub fn new(expected: usize) -> Self {
        Self::with_max_wait(expected, DEFAULT_MAX_WAIT)
    }

    pub fn with_max_wait(expected: usize, max_wait: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self {
            expected,
            max_wait,
            tx,
            rx,
        }
    }

    pub fn give(&self, item: T) {
        let _ = self.tx.send(item);
    }

    pub fn giver(&self) -> EventGiver<T> {
        EventGiver {
            tx: self.tx.clone(),
        }
    }

    /// Poll every 100ms until exactly `expected` items arrived or `max_wait` elapsed
    ///
    /// Returns whatever was collected, which may be fewer items on timeout or
    /// more if several arrived within one poll interval.
    pub async fn wait(self) -> Vec<T> {
        let max_polls = (self.max_wait.as_millis() / POLL_INTERVAL.as_millis()).max(1) as usize;
        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut items = Vec::new();
        let mut polls = 0;

        loop {
            ticker.tick().await;
            items.extend(self.rx.try_iter());

            if items.len() >= self.expected || polls >= max_polls {
                return items;
            }
            polls += 1;
        }
    }
}
