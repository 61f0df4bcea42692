//! A fixed-capacity blocking FIFO shared by any number of producer and
//! consumer threads.

use crate::lock::{Condvar, Mutex};

/// Ring storage. `read` is the oldest item, `write` the next free slot.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    write: usize,
    read: usize,
    count: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            write: 0,
            read: 0,
            count: 0,
        }
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    fn put(&mut self, item: T) {
        debug_assert!(!self.is_full());

        self.slots[self.write] = Some(item);
        self.write = (self.write + 1) % self.slots.len();
        self.count += 1;
    }

    fn take(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }

        let item = self.slots[self.read].take();
        self.read = (self.read + 1) % self.slots.len();
        self.count -= 1;
        item
    }
}

/// A bounded blocking queue backed by a ring buffer.
///
/// [`push`](BoundedQueue::push) blocks while the queue is full and
/// [`pop`](BoundedQueue::pop) blocks while it is empty. Items come out in the
/// order they went in, across all threads. There is no shutdown: to stop a
/// consumer, push an item it recognizes as the end of the stream.
///
/// # Examples
///
/// ```
/// use lapse::BoundedQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(BoundedQueue::new(2));
///
/// let producer = {
///     let queue = queue.clone();
///     thread::spawn(move || {
///         for i in 0..10 {
///             queue.push(Some(i));
///         }
///         queue.push(None);
///     })
/// };
///
/// let mut received = Vec::new();
/// while let Some(i) = queue.pop() {
///     received.push(i);
/// }
/// producer.join().unwrap();
///
/// assert_eq!(received, (0..10).collect::<Vec<_>>());
/// ```
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");

        Self {
            ring: Mutex::new("bounded_queue.ring", Ring::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Appends `item`, waiting for a free slot if the queue is full.
    pub fn push(&self, item: T) {
        let mut ring = self.ring.lock();
        while ring.is_full() {
            self.not_full.wait(&mut ring);
        }
        ring.put(item);
        drop(ring);

        self.not_empty.notify_one();
    }

    /// Appends `item` if there is room, handing it back otherwise.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut ring = self.ring.lock();
        if ring.is_full() {
            return Err(item);
        }
        ring.put(item);
        drop(ring);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, waiting for one if the queue is empty.
    pub fn pop(&self) -> T {
        let mut ring = self.ring.lock();
        let item = loop {
            match ring.take() {
                Some(item) => break item,
                None => self.not_empty.wait(&mut ring),
            }
        };
        drop(ring);

        self.not_full.notify_one();
        item
    }

    pub fn try_pop(&self) -> Option<T> {
        let item = self.ring.lock().take()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }
}
