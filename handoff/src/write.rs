use std::fmt::{self, Debug};
use std::future::poll_fn;
use std::sync::Arc;

use crate::backlog::Backlog;
use crate::error::{CloseInfo, Grant, ProtocolViolation};
use crate::shared::Shared;

/// The producing end of a channel.
///
/// Dropping the write end closes the channel without a cause, if it isn't closed already.
pub struct WriteEnd<T, E: Clone, B: Backlog<T>> {
    shared: Arc<Shared<T, E, B>>,
}

impl<T, E: Clone, B: Backlog<T>> WriteEnd<T, E, B> {
    pub(crate) fn new(shared: Arc<Shared<T, E, B>>) -> Self {
        Self { shared }
    }

    #[inline]
    pub(crate) fn shared(&self) -> &Arc<Shared<T, E, B>> {
        &self.shared
    }

    /// Requests permission to transfer one value.
    ///
    /// If the channel is closed, `on_granted` is invoked immediately with the closure. If
    /// the channel has room for a value, it's invoked immediately with a [`Permit`].
    /// Otherwise (a rendezvous channel whose last value hasn't been read yet) the request is
    /// parked and `on_granted` is invoked once a read makes room, or once the channel closes.
    ///
    /// Only one permit can be requested or outstanding at a time. Asking for another one
    /// returns [`ProtocolViolation::WritePending`] and drops `on_granted` without calling it.
    pub fn prepare_write<F>(&self, on_granted: F) -> Result<(), ProtocolViolation>
    where
        F: FnOnce(Grant<Permit<T, E, B>, E>) + Send + 'static,
    {
        self.shared.prepare_write(Box::new(on_granted))
    }

    /// Waits for a permit to transfer one value.
    ///
    /// This is the task based form of [`prepare_write`](Self::prepare_write). While the
    /// future is pending it holds the channel's permit request; dropping it withdraws the
    /// request.
    pub async fn reserve(&self) -> Result<Grant<Permit<T, E, B>, E>, ProtocolViolation> {
        let shared = &self.shared;
        let task = shared.next_task();
        let _withdraw = scopeguard::guard((), |()| shared.cancel_write_task(task));
        poll_fn(|cx| shared.poll_prepare_write(task, cx)).await
    }

    /// Waits for a permit and transfers `value` through it.
    ///
    /// If the channel closes first, the value is dropped and the closure is returned.
    pub async fn send(&self, value: T) -> Result<Result<(), CloseInfo<E>>, ProtocolViolation> {
        Ok(self.reserve().await?.map(|permit| permit.send(value)))
    }

    /// Closes the channel. Closing an already closed channel does nothing.
    pub fn close_write(&self, cause: Option<E>) {
        self.shared.close(cause)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns the channel's closure, if it's closed.
    #[inline]
    pub fn close_info(&self) -> Option<CloseInfo<E>> {
        self.shared.close_info()
    }
}

impl<T, E: Clone, B: Backlog<T>> Drop for WriteEnd<T, E, B> {
    fn drop(&mut self) {
        self.shared.close(None);
    }
}

impl<T, E: Clone, B: Backlog<T>> Debug for WriteEnd<T, E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteEnd")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A one-shot right to transfer a single value, granted by [`WriteEnd::prepare_write`].
///
/// The permit is consumed by [`transfer`](Self::transfer), so it can't be used twice.
/// Dropping it unused gives it back to the channel, after which a new permit can be requested.
#[must_use = "a permit does nothing unless a value is transferred through it"]
pub struct Permit<T, E: Clone, B: Backlog<T>> {
    shared: Arc<Shared<T, E, B>>,
    used: bool,
}

impl<T, E: Clone, B: Backlog<T>> Permit<T, E, B> {
    pub(crate) fn new(shared: Arc<Shared<T, E, B>>) -> Self {
        Self {
            shared,
            used: false,
        }
    }

    /// Completes the write.
    ///
    /// `Ok(value)` is handed to the pending read if there is one, or else left for the next
    /// read. `Err(cause)` closes the channel with `cause` and delivers nothing. If the channel
    /// closed after this permit was granted, the transfer does nothing.
    pub fn transfer(mut self, result: Result<T, E>) {
        self.used = true;
        self.shared.transfer(result);
    }

    /// Shorthand for `transfer(Ok(value))`.
    #[inline]
    pub fn send(self, value: T) {
        self.transfer(Ok(value))
    }

    /// Shorthand for `transfer(Err(cause))`.
    #[inline]
    pub fn abort(self, cause: E) {
        self.transfer(Err(cause))
    }
}

impl<T, E: Clone, B: Backlog<T>> Drop for Permit<T, E, B> {
    fn drop(&mut self) {
        if !self.used {
            self.shared.release_permit();
        }
    }
}

impl<T, E: Clone, B: Backlog<T>> Debug for Permit<T, E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}
