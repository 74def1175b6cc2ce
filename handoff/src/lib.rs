//! Point-to-point channels between exactly one producer and one consumer.
//!
//! Every channel is a pair of handles, a [`ReadEnd`] and a [`WriteEnd`], over one piece of
//! shared state. Values move from the write end to the read end one at a time, and closing
//! either end closes the whole channel. The close is recorded once, with an optional cause,
//! and every pending and future operation on both ends observes the same [`CloseInfo`].
//!
//! Two flavors are provided:
//!
//!  * [`rendezvous`] channels hold at most one unread value. A producer asks for a [`Permit`]
//!    with [`WriteEnd::prepare_write`] and then transfers one value through it. While a value
//!    is waiting to be read, new permits are held back until a read drains it.
//!  * [`buffered`] channels queue any number of values. Producers can [`write`] without a
//!    permit, and permit based writes share the same FIFO order.
//!
//! Reads and permit requests complete through one-shot callbacks. A callback is either
//! invoked immediately, or stored and invoked later by the operation that satisfies it (a
//! transfer, a write, or a close). Callbacks always run with the channel unlocked, so they
//! are free to call back into either end.
//!
//! Misusing the protocol (registering a second read while one is pending, or asking for a
//! second permit while one is outstanding) is reported synchronously as a
//! [`ProtocolViolation`] and never goes through a callback.
//!
//! [`write`]: WriteEnd::write

pub mod backlog;
pub mod buffered;
pub mod error;
pub mod rendezvous;

mod read;
mod shared;
mod write;


pub use error::{CloseInfo, Delivery, Grant, ProtocolViolation};
pub use read::ReadEnd;
pub use write::{Permit, WriteEnd};

mod internal {
    pub trait Sealed {}
}
