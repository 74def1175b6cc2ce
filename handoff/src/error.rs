//! Closure records and protocol errors.

use thiserror::Error;

/// The record of a channel closure, shared by both ends.
///
/// A channel is closed once, by whichever end closes it first. Every operation that is
/// pending at that moment or issued afterwards observes a clone of the same record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo<E> {
    cause: Option<E>,
}

impl<E> CloseInfo<E> {
    #[inline]
    pub(crate) const fn new(cause: Option<E>) -> Self {
        Self { cause }
    }

    /// The error the channel was closed with, or `None` if it was closed cleanly.
    #[inline]
    pub fn cause(&self) -> Option<&E> {
        self.cause.as_ref()
    }

    /// Takes the cause out of the record.
    #[inline]
    pub fn into_cause(self) -> Option<E> {
        self.cause
    }

    /// Whether the channel was closed without a cause.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.cause.is_none()
    }
}

/// The outcome of a read: the next value, or the channel's closure.
pub type Delivery<T, E> = Result<T, CloseInfo<E>>;

/// The outcome of a permit request: a permit, or the channel's closure.
pub type Grant<P, E> = Result<P, CloseInfo<E>>;

/// A caller broke the channel protocol.
///
/// These are programming errors. They are returned from the call that broke the protocol
/// and leave the channel state untouched, so the registration that was already in place
/// stays valid.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A read was registered while another read was still waiting for a value.
    #[error("a read is already pending on this channel")]
    ReadPending,
    /// A permit was requested while another permit was requested or outstanding.
    #[error("a write permit is already outstanding on this channel")]
    WritePending,
}
