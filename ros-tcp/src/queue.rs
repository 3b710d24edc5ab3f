//! Per-link message buffers.
//!
//! Every subscriber link of a publication owns one of these as its send
//! queue, sized by the publisher's `queue_size`; a queue-backed `RosSub`
//! owns one for the frames waiting on `recv`. `publish` never waits on a
//! slow link: the link's oldest frame is discarded instead and counted in
//! its bus stats.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use event_listener::Event;
use parking_lot::{Condvar, Mutex};

/// Holds at most `capacity` frames; pushing onto a full queue discards the
/// front one.
pub struct BoundedQueue<T> {
    data: Mutex<VecDeque<T>>,
    /// `recv` and `recv_timeout`
    not_empty: Condvar,
    /// `recv_async`
    event: Event,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// `queue_size` 0 still buffers the latest frame.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            not_empty: Condvar::new(),
            event: Event::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `item`. `true` means the link lost its oldest frame to make
    /// room.
    pub fn push(&self, item: T) -> bool {
        let mut data = self.data.lock();
        let dropped = if data.len() >= self.capacity {
            data.pop_front();
            true
        } else {
            false
        };
        data.push_back(item);
        drop(data);
        self.not_empty.notify_one();
        self.event.notify(1);
        dropped
    }

    /// Parks the calling thread while the queue is empty.
    pub fn recv(&self) -> T {
        let mut data = self.data.lock();
        loop {
            if let Some(item) = data.pop_front() {
                return item;
            }
            self.not_empty.wait(&mut data);
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut data = self.data.lock();
        loop {
            if let Some(item) = data.pop_front() {
                return Some(item);
            }
            if self.not_empty.wait_until(&mut data, deadline).timed_out() {
                return data.pop_front();
            }
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.data.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Async counterpart of [`recv`](Self::recv). A frame is only taken
    /// once the future completes, so a timed out or aborted wait leaves the
    /// queue untouched.
    pub async fn recv_async(&self) -> T {
        loop {
            // Listen first; a push landing between the check and the await
            // still wakes us.
            let listener = self.event.listen();
            if let Some(item) = self.try_recv() {
                return item;
            }
            listener.await;
        }
    }
}
