//! FIFO mailboxes.
//!
//! A [`Mailbox`] owns both ends of a crossbeam channel. Producers call
//! [`add`](Mailbox::add), which never blocks; consumers pick the pop that
//! fits their loop: [`next`](Mailbox::next) polls, [`next_timeout`](Mailbox::next_timeout)
//! idles for a bounded time, and [`wait`](Mailbox::wait) blocks until an
//! item arrives or the mailbox is closed and drained.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

/// Why [`Mailbox::add`] refused an item. The item is handed back.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum MailboxError<T> {
    /// A bounded mailbox is at capacity.
    #[error("mailbox is full")]
    Full(T),
    /// The mailbox has been closed.
    #[error("mailbox is closed")]
    Closed(T),
}

impl<T> MailboxError<T> {
    /// Recover the refused item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// Returned by [`Mailbox::next_timeout`] once the mailbox is closed and
/// empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("mailbox is closed and drained")]
pub struct Drained;

/// A multi-producer FIFO queue.
///
/// Items added by one producer are popped in the order that producer
/// added them. Closing stops new items; items already queued are still
/// delivered.
pub struct Mailbox<T> {
    tx: RwLock<Option<Sender<T>>>,
    rx: Receiver<T>,
    capacity: Option<usize>,
}

impl<T> Mailbox<T> {
    /// A mailbox that only refuses items once closed.
    pub fn unbounded() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            capacity: None,
        }
    }

    /// A mailbox that holds at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            capacity: Some(capacity),
        }
    }

    /// Append `item` without blocking.
    pub fn add(&self, item: T) -> Result<(), MailboxError<T>> {
        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(MailboxError::Closed(item));
        };
        tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => MailboxError::Full(item),
            TrySendError::Disconnected(item) => MailboxError::Closed(item),
        })
    }

    /// Pop the oldest item, if any, without blocking.
    pub fn next(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// `Ok(None)` means the wait timed out; `Err(Drained)` means nothing
    /// will ever arrive again.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<T>, Drained> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Drained),
        }
    }

    /// Pop the oldest item, blocking until one arrives. Returns `None`
    /// once the mailbox is closed and empty.
    pub fn wait(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Refuse further items and wake blocked consumers once the queue
    /// drains. Idempotent.
    pub fn close(&self) {
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no items are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Capacity of a bounded mailbox.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bounded_mailbox_refuses_when_full() {
        let mailbox = Mailbox::bounded(2);
        mailbox.add(1).unwrap();
        mailbox.add(2).unwrap();
        assert_eq!(mailbox.add(3), Err(MailboxError::Full(3)));
        assert_eq!(mailbox.next(), Some(1));
        mailbox.add(3).unwrap();
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.capacity(), Some(2));
    }

    #[test]
    fn closed_mailbox_drains_then_reports() {
        let mailbox = Mailbox::unbounded();
        mailbox.add("a").unwrap();
        mailbox.close();
        assert!(mailbox.is_closed());
        assert_eq!(mailbox.add("b"), Err(MailboxError::Closed("b")));
        assert_eq!(mailbox.next_timeout(Duration::from_millis(1)), Ok(Some("a")));
        assert_eq!(mailbox.next_timeout(Duration::from_millis(1)), Err(Drained));
        assert_eq!(mailbox.wait(), None);
    }

    #[test]
    fn empty_open_mailbox_times_out() {
        let mailbox: Mailbox<u8> = Mailbox::unbounded();
        assert_eq!(mailbox.next(), None);
        assert_eq!(mailbox.next_timeout(Duration::from_millis(1)), Ok(None));
    }

    #[test]
    fn close_wakes_a_blocked_consumer() {
        let mailbox: Arc<Mailbox<u8>> = Arc::new(Mailbox::unbounded());
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || mailbox.wait())
        };
        mailbox.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn each_producer_keeps_its_order_under_interleaving() {
        const PRODUCERS: usize = 4;
        const ITEMS: usize = 500;
        let mailbox: Arc<Mailbox<(usize, usize)>> = Arc::new(Mailbox::unbounded());
        let barrier = Arc::new(std::sync::Barrier::new(PRODUCERS));
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                let mut popped = Vec::new();
                while let Some(item) = mailbox.wait() {
                    popped.push(item);
                }
                popped
            })
        };
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let mailbox = Arc::clone(&mailbox);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..ITEMS {
                        mailbox.add((producer, seq)).unwrap();
                    }
                })
            })
            .collect();
        for h in producers {
            h.join().unwrap();
        }
        mailbox.close();

        let popped = consumer.join().unwrap();
        assert_eq!(popped.len(), PRODUCERS * ITEMS);
        let mut next = [0usize; PRODUCERS];
        for (producer, seq) in popped {
            assert_eq!(seq, next[producer], "producer {producer} out of order");
            next[producer] += 1;
        }
        assert_eq!(next, [ITEMS; PRODUCERS]);
    }

    #[test]
    fn refused_item_comes_back() {
        assert_eq!(MailboxError::Full(7).into_inner(), 7);
        assert_eq!(MailboxError::Closed(8).into_inner(), 8);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn single_producer_order_is_preserved(
                items in proptest::collection::vec(any::<u32>(), 0..200),
            ) {
                let mailbox = Mailbox::unbounded();
                for &item in &items {
                    mailbox.add(item).unwrap();
                }
                let mut popped = Vec::new();
                while let Some(item) = mailbox.next() {
                    popped.push(item);
                }
                prop_assert_eq!(popped, items);
            }
        }
    }
}
