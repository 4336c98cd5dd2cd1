//! Bounded FIFO shared between a session's loops.
//!
//! Unlike a channel, the queue exposes its fill level (the send loop reads
//! it for backpressure) and separates "full" from "closed" on push.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Why a push was refused. The rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue has been closed.
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer FIFO with async push and pop.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Push without waiting.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Push, waiting while the queue is full. Fails only once closed.
    pub async fn push(&self, mut item: T) -> Result<(), PushError<T>> {
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();

            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(back)) => item = back,
                Err(closed) => return Err(closed),
            }
            notified.await;
        }
    }

    /// Push ignoring capacity and the closed flag. Used for sentinels that
    /// must reach the consumer even after teardown has begun.
    pub fn force_push(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.readable.notify_one();
    }

    /// Pop the oldest item, waiting while empty. Returns `None` once the
    /// queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.state.lock().items.drain(..).collect();
        self.writable.notify_waiters();
        items
    }

    /// Refuse further pushes and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}
