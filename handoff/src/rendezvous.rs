//! Rendezvous channels: at most one value in flight.
//!
//! A value is handed over through a [`Permit`]. If a read is waiting, the transfer resolves
//! it right away. If not, the value sits in the channel's single slot until the next read,
//! and further permit requests are parked until that read drains the slot.

use crate::backlog::Slot;
use crate::shared::Shared;

pub type ReadEnd<T, E> = crate::ReadEnd<T, E, Slot<T>>;
pub type WriteEnd<T, E> = crate::WriteEnd<T, E, Slot<T>>;
pub type Permit<T, E> = crate::Permit<T, E, Slot<T>>;

/// Creates a rendezvous channel, returning its read and write ends.
pub fn channel<T, E: Clone>() -> (ReadEnd<T, E>, WriteEnd<T, E>) {
    let shared = Shared::new(Slot::default());
    (ReadEnd::new(shared.clone()), WriteEnd::new(shared))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches2::assert_matches;
    use parking_lot::Mutex;

    use super::*;
    use crate::{CloseInfo, Delivery, Grant, ProtocolViolation};

    type Held<T> = Arc<Mutex<Option<T>>>;

    fn keep<T: Send + 'static>(held: &Held<T>) -> impl FnOnce(T) + Send + 'static {
        let held = held.clone();
        move |v| *held.lock() = Some(v)
    }

    fn grant(tx: &WriteEnd<i32, &'static str>) -> Grant<Permit<i32, &'static str>, &'static str> {
        let granted = Held::default();
        tx.prepare_write(keep(&granted)).unwrap();
        let grant = granted.lock().take();
        grant.expect("permit wasn't granted synchronously")
    }

    #[test]
    fn transfer_resolves_pending_read() {
        let (rx, tx) = channel::<i32, &'static str>();

        let read: Held<Delivery<i32, &str>> = Held::default();
        rx.read(keep(&read)).unwrap();
        assert!(read.lock().is_none());

        assert_matches!(grant(&tx), Ok(permit));
        permit.send(5);

        assert_eq!(read.lock().take(), Some(Ok(5)));
        assert_eq!(rx.queued(), 0);
    }

    #[test]
    fn transfer_without_reader_fills_slot() {
        let (rx, tx) = channel::<i32, &'static str>();

        assert_matches!(grant(&tx), Ok(permit));
        permit.send(1);
        assert_eq!(rx.queued(), 1);

        let read: Held<Delivery<i32, &str>> = Held::default();
        rx.read(keep(&read)).unwrap();
        assert_eq!(read.lock().take(), Some(Ok(1)));
        assert_eq!(rx.queued(), 0);
    }

    #[test]
    fn full_slot_parks_permit_until_read() {
        let (rx, tx) = channel::<i32, &'static str>();

        assert_matches!(grant(&tx), Ok(permit));
        permit.send(1);

        let granted = Held::default();
        tx.prepare_write(keep(&granted)).unwrap();
        assert!(granted.lock().is_none());

        // The parked request still counts as outstanding.
        assert_eq!(tx.prepare_write(|_| panic!()), Err(ProtocolViolation::WritePending));

        assert_eq!(rx.try_read(), Some(Ok(1)));

        assert_matches!(granted.lock().take(), Some(Ok(permit)));
        permit.send(2);
        assert_eq!(rx.try_read(), Some(Ok(2)));
        assert_eq!(rx.try_read(), None);
    }

    #[test]
    fn close_resolves_parked_permit() {
        let (rx, tx) = channel::<i32, &'static str>();

        assert_matches!(grant(&tx), Ok(permit));
        permit.send(1);

        let granted = Held::default();
        tx.prepare_write(keep(&granted)).unwrap();

        rx.close_read(Some("gone"));

        assert_matches!(granted.lock().take(), Some(Err(info)));
        assert_eq!(info.cause(), Some(&"gone"));

        // The unread value was discarded.
        assert_eq!(rx.queued(), 0);
        assert_eq!(rx.try_read(), Some(Err(CloseInfo::new(Some("gone")))));
    }

    #[test]
    fn second_permit_request_is_a_violation() {
        let (rx, tx) = channel::<i32, &'static str>();

        assert_matches!(grant(&tx), Ok(permit));
        assert_eq!(tx.prepare_write(|_| panic!()), Err(ProtocolViolation::WritePending));

        permit.send(1);
        // The slot is full until the value is read, and a request made now would park.
        assert_eq!(rx.try_read(), Some(Ok(1)));
        assert_matches!(grant(&tx), Ok(_));
    }

    #[test]
    fn dropped_permit_is_released() {
        let (rx, tx) = channel::<i32, &'static str>();

        assert_matches!(grant(&tx), Ok(permit));
        drop(permit);

        assert!(!tx.is_closed());
        assert_eq!(rx.queued(), 0);
        assert_matches!(grant(&tx), Ok(permit));
        permit.send(3);
        assert_eq!(rx.try_read(), Some(Ok(3)));
    }

    #[test]
    fn failed_transfer_closes_channel() {
        let (rx, tx) = channel::<i32, &'static str>();

        let read: Held<Delivery<i32, &str>> = Held::default();
        rx.read(keep(&read)).unwrap();

        assert_matches!(grant(&tx), Ok(permit));
        permit.abort("broken pipe");

        assert_matches!(read.lock().take(), Some(Err(info)));
        assert_eq!(info.cause(), Some(&"broken pipe"));
        assert!(rx.is_closed());
        assert!(tx.is_closed());
    }

    #[test]
    fn transfer_after_close_is_dropped() {
        let (rx, tx) = channel::<Arc<()>, &'static str>();

        let granted = Held::default();
        tx.prepare_write(keep(&granted)).unwrap();
        assert_matches!(granted.lock().take(), Some(Ok(permit)));

        tx.close_write(Some("done"));

        let value = Arc::new(());
        permit.send(value.clone());
        assert_eq!(Arc::strong_count(&value), 1);
        assert_eq!(rx.queued(), 0);

        // The close keeps its original cause.
        assert_eq!(rx.close_info().and_then(CloseInfo::into_cause), Some("done"));
    }

    #[test]
    fn dropping_write_end_closes_cleanly() {
        let (rx, tx) = channel::<i32, &'static str>();

        let read: Held<Delivery<i32, &str>> = Held::default();
        rx.read(keep(&read)).unwrap();
        drop(tx);

        assert_matches!(read.lock().take(), Some(Err(info)));
        assert!(info.is_clean());
        assert!(rx.is_closed());
    }
}
