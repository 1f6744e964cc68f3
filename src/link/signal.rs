//! Reply signal between the inbound handler and the cycle engine
//!
//! A latest-value-only channel: raising it twice before the engine looks
//! is the same as raising it once. Built on `tokio::sync::watch` carrying
//! a reply sequence number.

use tokio::sync::watch;

/// Raising side, held by the status demultiplexer
pub struct ReplySignal {
    tx: watch::Sender<u64>,
}

impl ReplySignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Mark one reply as received
    pub fn notify(&self) {
        self.tx.send_modify(|seq| *seq = seq.wrapping_add(1));
    }

    /// Replies raised since creation
    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Waiting side for one engine run
    pub fn waiter(&self) -> ReplyWaiter {
        ReplyWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ReplySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting side, owned by the cycle engine
pub struct ReplyWaiter {
    rx: watch::Receiver<u64>,
}

impl ReplyWaiter {
    /// Forget replies raised so far (stale replies from a previous cycle)
    pub fn clear(&mut self) {
        self.rx.borrow_and_update();
    }

    /// Wait for the next reply; `false` if the signal was dropped
    pub async fn wait(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
