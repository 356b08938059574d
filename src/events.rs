//! Per-task inboxes.
//!
//! Every task owns one [`EventQueue`] of its own message type.  Producers
//! (other tasks, broker callbacks, the button driver, stdin) hold clones of
//! the handle and call [`EventQueue::send`], which never blocks.  The
//! owning task consumes in FIFO order, one message at a time.
//!
//! ```text
//! ┌──────────────┐
//! │ other task   │──┐
//! │ broker cb    │──┤ send()   ┌─────────────────────┐  drain() / dispatch()  ┌───────────┐
//! │ button       │──┼────────▶│ EventQueue<M, N>    │──────────────────────▶│  handler  │
//! │ stdin        │──┘ (never   │ embassy Channel     │  (one at a time,       │  (owner)  │
//! └──────────────┘  blocks)   └─────────────────────┘   serialized)          └───────────┘
//! ```
//!
//! A queue is created together with its task so producers can be wired up
//! before anything runs, but it stays closed until the task's `start`
//! opens it.  Sending to a closed queue reports [`Error::QueueClosed`];
//! sending to a full one reports [`Error::ResourceExhausted`].  Closing a
//! queue abandons whatever is still pending.
//!
//! Two consumption modes:
//!
//! | Mode                         | Used by                               |
//! |------------------------------|---------------------------------------|
//! | [`EventQueue::drain`]        | tasks whose worker loop ticks anyway  |
//! | [`EventQueue::dispatch`]     | tasks that idle until a message lands |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use futures_lite::future;

use crate::error::{Error, Result};

struct Shared<M, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, M, N>,
    open: AtomicBool,
    /// Wakes a blocked dispatcher when the queue is closed.
    closed: Signal<CriticalSectionRawMutex, ()>,
}

/// Bounded FIFO inbox holding up to `N` messages of type `M`.
pub struct EventQueue<M, const N: usize> {
    shared: Arc<Shared<M, N>>,
}

impl<M, const N: usize> Clone for EventQueue<M, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M, const N: usize> Default for EventQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, const N: usize> EventQueue<M, N> {
    /// Create a closed queue.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: Channel::new(),
                open: AtomicBool::new(false),
                closed: Signal::new(),
            }),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Accept messages from now on.
    pub fn open(&self) {
        self.shared.closed.reset();
        self.shared.open.store(true, Ordering::Release);
    }

    /// Stop accepting messages, abandon pending ones and wake a dispatcher.
    /// Returns the number of messages abandoned.
    pub fn close(&self) -> usize {
        self.shared.open.store(false, Ordering::Release);
        let mut abandoned = 0;
        while self.shared.channel.try_receive().is_ok() {
            abandoned += 1;
        }
        self.shared.closed.signal(());
        abandoned
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.shared.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.channel.is_empty()
    }

    /// Enqueue `message` without blocking.
    pub fn send(&self, message: M) -> Result<()> {
        if !self.is_open() {
            return Err(Error::QueueClosed);
        }
        match self.shared.channel.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::ResourceExhausted("inbox full")),
        }
    }

    /// Hand every pending message to `handler`, oldest first.
    /// Returns how many were handled.
    pub fn drain(&self, mut handler: impl FnMut(M)) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.shared.channel.try_receive() {
            handler(message);
            handled += 1;
        }
        handled
    }

    /// Block the calling thread, handing each message to `handler` as it
    /// arrives, until the queue is closed.
    pub fn dispatch(&self, mut handler: impl FnMut(M)) {
        while self.is_open() {
            let next = future::block_on(future::or(
                async { Some(self.shared.channel.receive().await) },
                async {
                    self.shared.closed.wait().await;
                    None
                },
            ));
            match next {
                Some(message) if self.is_open() => handler(message),
                _ => break,
            }
        }
    }
}
