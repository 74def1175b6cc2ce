use std::fmt::{self, Debug};
use std::future::poll_fn;
use std::sync::Arc;

use crate::backlog::Backlog;
use crate::error::{CloseInfo, Delivery, ProtocolViolation};
use crate::shared::Shared;

/// The consuming end of a channel.
///
/// Dropping the read end closes the channel without a cause, if it isn't closed already.
pub struct ReadEnd<T, E: Clone, B: Backlog<T>> {
    shared: Arc<Shared<T, E, B>>,
}

impl<T, E: Clone, B: Backlog<T>> ReadEnd<T, E, B> {
    pub(crate) fn new(shared: Arc<Shared<T, E, B>>) -> Self {
        Self { shared }
    }

    /// Registers interest in the next value.
    ///
    /// If the channel is closed, or a value is already waiting, `on_result` is invoked
    /// before this returns. Otherwise it's stored and invoked exactly once, later, by the
    /// write that produces the next value or by the close of the channel.
    ///
    /// Only one read can be pending at a time. Registering another one returns
    /// [`ProtocolViolation::ReadPending`], drops `on_result` without calling it, and leaves
    /// the pending read in place.
    pub fn read<F>(&self, on_result: F) -> Result<(), ProtocolViolation>
    where
        F: FnOnce(Delivery<T, E>) + Send + 'static,
    {
        self.shared.read(Box::new(on_result))
    }

    /// Takes the next value if one is waiting, without registering a read.
    ///
    /// Returns `None` if the channel is open and nothing is waiting.
    pub fn try_read(&self) -> Option<Delivery<T, E>> {
        self.shared.try_read()
    }

    /// Waits for the next value.
    ///
    /// This is the task based form of [`read`](Self::read). While the future is pending it
    /// holds the channel's read registration. Dropping it withdraws the registration, and a
    /// value that arrived in the meantime stays in the channel for the next read.
    pub async fn recv(&self) -> Result<Delivery<T, E>, ProtocolViolation> {
        let shared = &self.shared;
        let task = shared.next_task();
        let _withdraw = scopeguard::guard((), |()| shared.cancel_read_task(task));
        poll_fn(|cx| shared.poll_read(task, cx)).await
    }

    /// The number of values written but not yet read.
    #[inline]
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }

    /// Closes the channel. Closing an already closed channel does nothing.
    pub fn close_read(&self, cause: Option<E>) {
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

impl<T, E: Clone, B: Backlog<T>> Drop for ReadEnd<T, E, B> {
    fn drop(&mut self) {
        self.shared.close(None);
    }
}

impl<T, E: Clone, B: Backlog<T>> Debug for ReadEnd<T, E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadEnd")
            .field("closed", &self.is_closed())
            .field("queued", &self.queued())
            .finish()
    }
}
