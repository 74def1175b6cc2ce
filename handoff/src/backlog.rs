//! Storage for values that were written but not yet read.

use std::collections::VecDeque;

use crate::internal::Sealed;

/// Holds values between the write that produced them and the read that consumes them.
///
/// This trait is sealed. The crate provides [`Slot`] for rendezvous channels and [`Queue`]
/// for buffered channels.
pub trait Backlog<T>: Default + Sealed {
    /// Appends a value. Callers never push into a full backlog.
    #[doc(hidden)]
    fn push(&mut self, value: T);

    /// Removes the oldest value.
    #[doc(hidden)]
    fn pop(&mut self) -> Option<T>;

    /// Whether the backlog can take another value without a read draining it first.
    #[doc(hidden)]
    fn is_full(&self) -> bool;

    #[doc(hidden)]
    fn len(&self) -> usize;
}

/// A single value slot.
#[derive(Debug)]
pub struct Slot<T>(Option<T>);

impl<T> Default for Slot<T> {
    #[inline]
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Sealed for Slot<T> {}

impl<T> Backlog<T> for Slot<T> {
    #[inline]
    fn push(&mut self, value: T) {
        debug_assert!(self.0.is_none(), "rendezvous slot overwritten");
        self.0 = Some(value);
    }

    #[inline]
    fn pop(&mut self) -> Option<T> {
        self.0.take()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.0.is_some()
    }

    #[inline]
    fn len(&self) -> usize {
        usize::from(self.0.is_some())
    }
}

/// An unbounded FIFO queue.
#[derive(Debug)]
pub struct Queue<T>(VecDeque<T>);

impl<T> Queue<T> {
    #[inline]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self(VecDeque::with_capacity(capacity))
    }
}

impl<T> Default for Queue<T> {
    #[inline]
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T> Sealed for Queue<T> {}

impl<T> Backlog<T> for Queue<T> {
    #[inline]
    fn push(&mut self, value: T) {
        self.0.push_back(value);
    }

    #[inline]
    fn pop(&mut self) -> Option<T> {
        self.0.pop_front()
    }

    #[inline]
    fn is_full(&self) -> bool {
        false
    }

    #[inline]
    fn len(&self) -> usize {
        self.0.len()
    }
}
