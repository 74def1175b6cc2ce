//! State shared by both ends of a channel, and the close state machine.
//!
//! All transitions happen with the state locked, but nothing user provided runs under the
//! lock. Callbacks, wakers and discarded values are collected into a [`Deferred`] and run
//! after the lock is released, since a callback could do literally anything, including
//! calling back into this channel.

use std::mem;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::backlog::Backlog;
use crate::error::{CloseInfo, Delivery, Grant, ProtocolViolation};
use crate::write::Permit;

pub(crate) type ReadCallback<T, E> = Box<dyn FnOnce(Delivery<T, E>) + Send>;
pub(crate) type GrantCallback<T, E, B> = Box<dyn FnOnce(Grant<Permit<T, E, B>, E>) + Send>;

/// A registration waiting to be resolved: either a one-shot callback or a task to wake.
///
/// Tasks are never handed a value directly. Waking one only tells it to poll again, which
/// keeps cancellation lossless: a value stays in the backlog until a poll takes it.
///
/// Each task registration carries the id of the future that made it, so a second future
/// can't take over, or withdraw, a registration it doesn't own.
enum Waiter<F> {
    Callback(F),
    Task { id: u64, waker: Waker },
}

impl<F> Waiter<F> {
    fn is_task(&self, task: u64) -> bool {
        matches!(self, Waiter::Task { id, .. } if *id == task)
    }
}

enum WriterState<T, E: Clone, B: Backlog<T>> {
    /// No permit was requested, or the last one was used.
    Idle,
    /// A permit was requested but the backlog is full.
    Parked(Waiter<GrantCallback<T, E, B>>),
    /// A permit is out and hasn't been used yet.
    Granted,
}

struct State<T, E: Clone, B: Backlog<T>> {
    /// Set once, by the first close. Never cleared.
    closed: Option<CloseInfo<E>>,
    reader: Option<Waiter<ReadCallback<T, E>>>,
    writer: WriterState<T, E, B>,
    backlog: B,
    /// Id handed to the next `recv` or `reserve` future.
    next_task: u64,
}

/// Work collected while the state is locked, run once it isn't.
#[must_use]
struct Deferred<T, E: Clone, B: Backlog<T>> {
    read: Option<(ReadCallback<T, E>, Delivery<T, E>)>,
    grant: Option<(GrantCallback<T, E, B>, Grant<Permit<T, E, B>, E>)>,
    reader_task: Option<Waker>,
    writer_task: Option<Waker>,
    discarded: Option<B>,
}

impl<T, E: Clone, B: Backlog<T>> Deferred<T, E, B> {
    fn new() -> Self {
        Self {
            read: None,
            grant: None,
            reader_task: None,
            writer_task: None,
            discarded: None,
        }
    }

    fn run(self) {
        // Values dropped by a close go first, they may hold anything.
        drop(self.discarded);

        if let Some((callback, delivery)) = self.read {
            callback(delivery);
        }
        if let Some((callback, grant)) = self.grant {
            callback(grant);
        }
        if let Some(waker) = self.reader_task {
            waker.wake();
        }
        if let Some(waker) = self.writer_task {
            waker.wake();
        }
    }
}

impl<T, E: Clone, B: Backlog<T>> State<T, E, B> {
    /// Hands a value to the pending reader, or leaves it in the backlog for the next read.
    ///
    /// A woken task keeps its registration until it polls, so no other read can slip in
    /// and take the value meant for it.
    fn deliver(&mut self, value: T, deferred: &mut Deferred<T, E, B>) {
        match self.reader.take() {
            Some(Waiter::Callback(callback)) => deferred.read = Some((callback, Ok(value))),
            Some(Waiter::Task { id, waker }) => {
                self.backlog.push(value);
                deferred.reader_task = Some(waker.clone());
                self.reader = Some(Waiter::Task { id, waker });
            }
            None => self.backlog.push(value),
        }
    }

    /// Issues the parked permit request if the backlog has room for another value.
    fn release_writer(
        &mut self,
        shared: &Arc<Shared<T, E, B>>,
        deferred: &mut Deferred<T, E, B>,
    ) {
        if self.backlog.is_full() {
            return;
        }

        match mem::replace(&mut self.writer, WriterState::Idle) {
            WriterState::Parked(Waiter::Callback(callback)) => {
                self.writer = WriterState::Granted;
                deferred.grant = Some((callback, Ok(Permit::new(shared.clone()))));
            }
            WriterState::Parked(Waiter::Task { id, waker }) => {
                // Stays parked until the task polls for its permit.
                deferred.writer_task = Some(waker.clone());
                self.writer = WriterState::Parked(Waiter::Task { id, waker });
            }
            other => self.writer = other,
        }
    }

    /// Moves the channel into the closed state. Returns false if it was already closed.
    ///
    /// Waiting values are discarded, the pending reader and any parked permit request are
    /// resolved with the close. A permit that was already granted stays outstanding; its
    /// transfer will find the channel closed.
    fn close(&mut self, cause: Option<E>, deferred: &mut Deferred<T, E, B>) -> bool {
        if self.closed.is_some() {
            return false;
        }

        let info = CloseInfo::new(cause);

        let discarded = mem::take(&mut self.backlog);
        if discarded.len() > 0 {
            tracing::trace!(discarded = discarded.len(), "discarding unread values on close");
        }
        deferred.discarded = Some(discarded);

        match self.reader.take() {
            Some(Waiter::Callback(callback)) => {
                deferred.read = Some((callback, Err(info.clone())));
            }
            Some(Waiter::Task { waker, .. }) => deferred.reader_task = Some(waker),
            None => {}
        }

        match mem::replace(&mut self.writer, WriterState::Idle) {
            WriterState::Parked(Waiter::Callback(callback)) => {
                deferred.grant = Some((callback, Err(info.clone())));
            }
            WriterState::Parked(Waiter::Task { waker, .. }) => deferred.writer_task = Some(waker),
            other => self.writer = other,
        }

        self.closed = Some(info);
        true
    }
}

/// The channel itself. Both ends, and any outstanding permit, hold an `Arc` to it.
pub(crate) struct Shared<T, E: Clone, B: Backlog<T>> {
    state: Mutex<State<T, E, B>>,
}

impl<T, E: Clone, B: Backlog<T>> Shared<T, E, B> {
    pub fn new(backlog: B) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                closed: None,
                reader: None,
                writer: WriterState::Idle,
                backlog,
                next_task: 0,
            }),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub fn close_info(&self) -> Option<CloseInfo<E>> {
        self.state.lock().closed.clone()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().backlog.len()
    }

    /// Allocates the id a `recv` or `reserve` future registers under.
    pub fn next_task(&self) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_task;
        state.next_task += 1;
        id
    }

    pub fn close(&self, cause: Option<E>) {
        let has_cause = cause.is_some();
        let mut deferred = Deferred::new();

        let mut state = self.state.lock();
        let closed = state.close(cause, &mut deferred);
        drop(state);

        if closed {
            tracing::trace!(has_cause, "channel closed");
        } else {
            tracing::trace!(has_cause, "channel already closed, ignoring close");
        }

        deferred.run();
    }

    pub fn read(self: &Arc<Self>, callback: ReadCallback<T, E>) -> Result<(), ProtocolViolation> {
        let mut deferred = Deferred::new();

        let mut state = self.state.lock();
        if state.reader.is_some() {
            drop(state);
            tracing::debug!("read registered while another read is pending");
            return Err(ProtocolViolation::ReadPending);
        }

        if let Some(info) = &state.closed {
            deferred.read = Some((callback, Err(info.clone())));
        } else if let Some(value) = state.backlog.pop() {
            deferred.read = Some((callback, Ok(value)));
            state.release_writer(self, &mut deferred);
        } else {
            state.reader = Some(Waiter::Callback(callback));
        }
        drop(state);

        deferred.run();
        Ok(())
    }

    pub fn try_read(self: &Arc<Self>) -> Option<Delivery<T, E>> {
        let mut deferred = Deferred::new();

        let mut state = self.state.lock();
        let delivery = if let Some(info) = &state.closed {
            Some(Err(info.clone()))
        } else {
            let value = state.backlog.pop()?;
            state.release_writer(self, &mut deferred);
            Some(Ok(value))
        };
        drop(state);

        deferred.run();
        delivery
    }

    pub fn poll_read(
        self: &Arc<Self>,
        task: u64,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Delivery<T, E>, ProtocolViolation>> {
        let mut deferred = Deferred::new();
        let waker = cx.waker().clone();

        let mut state = self.state.lock();
        let ours = match &state.reader {
            None => true,
            Some(reader) => reader.is_task(task),
        };
        if !ours {
            drop(state);
            tracing::debug!(task, "read polled while another read is pending");
            return Poll::Ready(Err(ProtocolViolation::ReadPending));
        }

        // Our registration from a previous poll. Dropped once unlocked.
        let stale = state.reader.take();

        let delivery = if let Some(info) = &state.closed {
            Err(info.clone())
        } else if let Some(value) = state.backlog.pop() {
            state.release_writer(self, &mut deferred);
            Ok(value)
        } else {
            state.reader = Some(Waiter::Task { id: task, waker });
            drop(state);
            drop(stale);
            return Poll::Pending;
        };
        drop(state);
        drop(stale);

        deferred.run();
        Poll::Ready(Ok(delivery))
    }

    /// Withdraws the read registration of the `task` future, if it still holds it.
    pub fn cancel_read_task(&self, task: u64) {
        let mut state = self.state.lock();
        let ours = state.reader.as_ref().is_some_and(|r| r.is_task(task));
        let stale = if ours { state.reader.take() } else { None };
        drop(state);
        drop(stale);
    }

    pub fn prepare_write(
        self: &Arc<Self>,
        callback: GrantCallback<T, E, B>,
    ) -> Result<(), ProtocolViolation> {
        let mut state = self.state.lock();
        if !matches!(state.writer, WriterState::Idle) {
            drop(state);
            tracing::debug!("permit requested while another permit is outstanding");
            return Err(ProtocolViolation::WritePending);
        }

        let grant = if let Some(info) = &state.closed {
            Err(info.clone())
        } else if state.backlog.is_full() {
            tracing::trace!("backlog full, parking permit request");
            state.writer = WriterState::Parked(Waiter::Callback(callback));
            return Ok(());
        } else {
            state.writer = WriterState::Granted;
            Ok(Permit::new(self.clone()))
        };
        drop(state);

        callback(grant);
        Ok(())
    }

    pub fn poll_prepare_write(
        self: &Arc<Self>,
        task: u64,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Grant<Permit<T, E, B>, E>, ProtocolViolation>> {
        let waker = cx.waker().clone();

        let mut state = self.state.lock();
        let ours = match &state.writer {
            WriterState::Idle => true,
            WriterState::Parked(waiter) => waiter.is_task(task),
            WriterState::Granted => false,
        };
        if !ours {
            drop(state);
            tracing::debug!(task, "permit polled while another permit is outstanding");
            return Poll::Ready(Err(ProtocolViolation::WritePending));
        }

        // Our parked request from a previous poll. Dropped once unlocked.
        let stale = mem::replace(&mut state.writer, WriterState::Idle);

        let grant = if let Some(info) = &state.closed {
            Err(info.clone())
        } else if state.backlog.is_full() {
            state.writer = WriterState::Parked(Waiter::Task { id: task, waker });
            drop(state);
            drop(stale);
            return Poll::Pending;
        } else {
            state.writer = WriterState::Granted;
            Ok(Permit::new(self.clone()))
        };
        drop(state);
        drop(stale);

        Poll::Ready(Ok(grant))
    }

    /// Withdraws the permit request of the `task` future, if it's still parked.
    pub fn cancel_write_task(&self, task: u64) {
        let mut state = self.state.lock();
        let ours = matches!(&state.writer, WriterState::Parked(waiter) if waiter.is_task(task));
        let stale = if ours {
            mem::replace(&mut state.writer, WriterState::Idle)
        } else {
            WriterState::Idle
        };
        drop(state);
        drop(stale);
    }

    /// Completes a granted permit. The permit is released before anything is delivered, so
    /// the reader can request the next permit from inside its callback.
    pub fn transfer(self: &Arc<Self>, result: Result<T, E>) {
        let mut deferred = Deferred::new();
        let mut late_value = None;

        let mut state = self.state.lock();
        debug_assert!(matches!(state.writer, WriterState::Granted));
        state.writer = WriterState::Idle;

        match result {
            Err(cause) => {
                if state.close(Some(cause), &mut deferred) {
                    tracing::trace!("channel closed by a failed transfer");
                }
            }
            Ok(value) if state.closed.is_none() => state.deliver(value, &mut deferred),
            Ok(value) => late_value = Some(value),
        }
        drop(state);

        if late_value.is_some() {
            tracing::trace!("dropping value transferred after close");
        }
        drop(late_value);

        deferred.run();
    }

    /// Gives back a permit that was never used.
    pub fn release_permit(&self) {
        let mut state = self.state.lock();
        if matches!(state.writer, WriterState::Granted) {
            state.writer = WriterState::Idle;
        }
    }

    /// Queues a value without a permit.
    pub fn write(&self, value: T) {
        let mut deferred = Deferred::new();

        let mut state = self.state.lock();
        if state.closed.is_some() {
            drop(state);
            tracing::trace!("dropping write on a closed channel");
            return;
        }

        state.deliver(value, &mut deferred);
        drop(state);

        deferred.run();
    }
}
