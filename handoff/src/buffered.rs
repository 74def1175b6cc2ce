//! Buffered channels: an unbounded FIFO queue between the two ends.
//!
//! Producers can [`write`](crate::WriteEnd::write) without asking for a permit. Permits still
//! work, and never have to wait, since the queue is never full. Values written either way
//! are read back in the order the writes and transfers completed.

use crate::backlog::Queue;
use crate::shared::Shared;

pub type ReadEnd<T, E> = crate::ReadEnd<T, E, Queue<T>>;
pub type WriteEnd<T, E> = crate::WriteEnd<T, E, Queue<T>>;
pub type Permit<T, E> = crate::Permit<T, E, Queue<T>>;

/// Creates a buffered channel, returning its read and write ends.
pub fn channel<T, E: Clone>() -> (ReadEnd<T, E>, WriteEnd<T, E>) {
    with_queue(Queue::default())
}

/// Creates a buffered channel whose queue has room for `capacity` values before it
/// reallocates. The queue still grows past `capacity` as needed.
pub fn channel_with_capacity<T, E: Clone>(capacity: usize) -> (ReadEnd<T, E>, WriteEnd<T, E>) {
    with_queue(Queue::with_capacity(capacity))
}

fn with_queue<T, E: Clone>(queue: Queue<T>) -> (ReadEnd<T, E>, WriteEnd<T, E>) {
    let shared = Shared::new(queue);
    (ReadEnd::new(shared.clone()), WriteEnd::new(shared))
}

impl<T, E: Clone> WriteEnd<T, E> {
    /// Queues `value` for the reader.
    ///
    /// If a read is pending, it's resolved with `value` before this returns. Writing to a
    /// closed channel drops `value` and does nothing else; there's no acknowledgment for a
    /// write, so the caller has to check [`is_closed`](Self::is_closed) if it cares.
    pub fn write(&self, value: T) {
        self.shared().write(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches2::assert_matches;
    use parking_lot::Mutex;

    use super::*;
    use crate::{Delivery, Grant};

    type Held<T> = Arc<Mutex<Vec<T>>>;

    fn keep<T: Send + 'static>(held: &Held<T>) -> impl FnOnce(T) + Send + 'static {
        let held = held.clone();
        move |v| held.lock().push(v)
    }

    #[test]
    fn writes_are_read_in_order() {
        let (rx, tx) = channel::<u32, ()>();
        for i in 0..10 {
            tx.write(i);
        }
        assert_eq!(rx.queued(), 10);

        let reads: Held<Delivery<u32, ()>> = Held::default();
        for _ in 0..10 {
            rx.read(keep(&reads)).unwrap();
        }

        let values: Vec<_> = reads.lock().drain(..).map(Result::unwrap).collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn write_resolves_pending_read() {
        let (rx, tx) = channel::<u32, ()>();

        let reads: Held<Delivery<u32, ()>> = Held::default();
        rx.read(keep(&reads)).unwrap();
        assert!(reads.lock().is_empty());

        tx.write(7);
        assert_eq!(*reads.lock(), [Ok(7)]);
        assert_eq!(rx.queued(), 0);
    }

    #[test]
    fn permits_and_writes_share_one_order() {
        let (rx, tx) = channel::<u32, ()>();

        tx.write(1);

        let grants: Held<Grant<Permit<u32, ()>, ()>> = Held::default();
        tx.prepare_write(keep(&grants)).unwrap();
        assert_matches!(grants.lock().pop(), Some(Ok(permit)));

        // The permit was granted before this write, but it completes after it.
        tx.write(2);
        permit.send(3);
        tx.write(4);

        // A buffered channel never parks a permit.
        tx.prepare_write(keep(&grants)).unwrap();
        assert_matches!(grants.lock().pop(), Some(Ok(permit)));
        permit.send(5);

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_read())
            .map(Result::unwrap)
            .collect();
        assert_eq!(drained, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn write_after_close_is_dropped() {
        let (rx, tx) = channel::<Arc<()>, ()>();
        rx.close_read(None);

        let value = Arc::new(());
        tx.write(value.clone());

        assert_eq!(Arc::strong_count(&value), 1);
        assert_eq!(rx.queued(), 0);
    }

    #[test]
    fn close_discards_queue() {
        let (rx, tx) = channel_with_capacity::<Arc<()>, &'static str>(4);

        let value = Arc::new(());
        tx.write(value.clone());
        tx.write(value.clone());
        assert_eq!(Arc::strong_count(&value), 3);

        tx.close_write(Some("reset"));

        assert_eq!(Arc::strong_count(&value), 1);
        assert_eq!(rx.queued(), 0);
        assert_matches!(rx.try_read(), Some(Err(info)));
        assert_eq!(info.cause(), Some(&"reset"));
    }
}
