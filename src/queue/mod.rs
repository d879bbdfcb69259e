//! Thread-safe bounded FIFO queue with blocking and timed operations.
//!
//! [`BoundedQueue`] is a monitor: one mutex guards the buffer and two
//! condition variables, `not_full` and `not_empty`, are waited on under that
//! same mutex. Every wait sits in a loop that re-checks its predicate, so a
//! notification (or a spurious wakeup) is only ever a hint that the state may
//! have changed.
//!
//! Timed operations compute an absolute deadline once at call entry. Each
//! individual wait is bounded by that deadline, so the total time spent
//! blocked never exceeds the requested timeout regardless of how many times
//! the thread is woken.
//!
//! Closing a queue wakes every waiter. Pending and future puts fail, while
//! gets keep draining buffered items and fail only once the buffer is empty.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{Error, PutError, Result};

struct Inner<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

struct State<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

/// A fixed-capacity FIFO queue shared between producer and consumer threads.
///
/// Cloning the queue yields another handle to the same buffer.
///
/// ```
/// use std::thread;
/// use blockpipe::queue::BoundedQueue;
///
/// let queue = BoundedQueue::new(2).unwrap();
///
/// let consumer = {
///     let queue = queue.clone();
///     thread::spawn(move || queue.get().unwrap())
/// };
///
/// queue.put(42).unwrap();
/// assert_eq!(consumer.join().unwrap(), 42);
/// assert!(queue.is_empty());
/// ```
pub struct BoundedQueue<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue that holds at most `capacity` items.
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity { capacity });
        }

        Ok(Self {
            state: Arc::new(State {
                inner: Mutex::new(Inner {
                    buffer: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Append `item`, blocking for as long as the queue is full.
    ///
    /// Fails only if the queue is closed, in which case the item is handed
    /// back inside the error.
    pub fn put(&self, item: T) -> std::result::Result<(), PutError<T>> {
        let mut inner = self.state.inner.lock();
        while inner.buffer.len() >= self.state.capacity && !inner.closed {
            self.state.not_full.wait(&mut inner);
        }
        self.push_locked(inner, item)
    }

    /// Append `item`, waiting at most `timeout` for space.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> std::result::Result<(), PutError<T>> {
        self.put_deadline(item, deadline_after(timeout))
    }

    /// Append `item`, waiting for space until `deadline` at the latest.
    ///
    /// On timeout the queue is left untouched and the item is returned in
    /// [`PutError::Timeout`].
    pub fn put_deadline(&self, item: T, deadline: Instant) -> std::result::Result<(), PutError<T>> {
        let mut inner = self.state.inner.lock();
        while inner.buffer.len() >= self.state.capacity && !inner.closed {
            if Instant::now() >= deadline {
                return Err(PutError::Timeout(item));
            }
            // Deadline is re-checked at the top of the loop
            let _ = self.state.not_full.wait_until(&mut inner, deadline);
        }
        self.push_locked(inner, item)
    }

    /// Remove and return the head item, blocking for as long as the queue is
    /// empty.
    ///
    /// Fails with [`Error::Closed`] once the queue is closed and drained.
    pub fn get(&self) -> Result<T> {
        let mut inner = self.state.inner.lock();
        while inner.buffer.is_empty() && !inner.closed {
            self.state.not_empty.wait(&mut inner);
        }
        self.pop_locked(inner)
    }

    /// Remove and return the head item, waiting at most `timeout` for one.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.get_deadline(deadline_after(timeout))
    }

    /// Remove and return the head item, waiting until `deadline` at the
    /// latest.
    ///
    /// On timeout nothing is removed and [`Error::Timeout`] is returned.
    pub fn get_deadline(&self, deadline: Instant) -> Result<T> {
        let started = Instant::now();
        let mut inner = self.state.inner.lock();
        while inner.buffer.is_empty() && !inner.closed {
            if Instant::now() >= deadline {
                return Err(Error::timeout(elapsed_ms(started)));
            }
            let _ = self.state.not_empty.wait_until(&mut inner, deadline);
        }
        self.pop_locked(inner)
    }

    /// Close the queue and wake every waiting thread.
    ///
    /// Closing is idempotent. Items already buffered can still be taken.
    pub fn close(&self) {
        let mut inner = self.state.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);

        tracing::trace!(capacity = self.state.capacity, "queue closed");
        self.state.not_full.notify_all();
        self.state.not_empty.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.inner.lock().closed
    }

    /// Number of buffered items at the moment of the call.
    pub fn len(&self) -> usize {
        self.state.inner.lock().buffer.len()
    }

    /// Whether the queue held no items at the moment of the call.
    pub fn is_empty(&self) -> bool {
        self.state.inner.lock().buffer.is_empty()
    }

    /// Whether the queue was at capacity at the moment of the call.
    pub fn is_full(&self) -> bool {
        self.state.inner.lock().buffer.len() >= self.state.capacity
    }

    /// Maximum number of items the queue can hold.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    fn push_locked(
        &self,
        mut inner: MutexGuard<'_, Inner<T>>,
        item: T,
    ) -> std::result::Result<(), PutError<T>> {
        if inner.closed {
            return Err(PutError::Closed(item));
        }
        inner.buffer.push_back(item);
        self.state.not_empty.notify_one();
        Ok(())
    }

    fn pop_locked(&self, mut inner: MutexGuard<'_, Inner<T>>) -> Result<T> {
        match inner.buffer.pop_front() {
            Some(item) => {
                self.state.not_full.notify_one();
                Ok(item)
            }
            None => Err(Error::Closed),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.state.inner.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &inner.buffer.len())
            .field("capacity", &self.state.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Saturate absurdly large timeouts instead of overflowing
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
