use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Unbounded FIFO shared between the accept loop and the workers
///
/// `push` never blocks. `pop` blocks until an item is available or the queue
/// is closed; which waiting consumer wakes first is unspecified.
#[derive(Debug, Default)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            closed: false,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item and wake one waiting consumer
    ///
    /// After [`close`](Self::close) the item is handed back instead.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Remove the head of the queue, waiting while it is empty
    ///
    /// Returns `None` once the queue has been closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Stop accepting items, wake every consumer, and return the items that
    /// were never claimed
    pub fn close(&self) -> Vec<T> {
        let mut state = self.lock();
        state.closed = true;
        let pending = state.items.drain(..).collect();
        drop(state);

        self.available.notify_all();
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items waiting for a consumer
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let popped: Vec<_> = (0..5).filter_map(|_| queue.pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(WorkQueue::new());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        queue.push("client").unwrap();
        assert_eq!(consumer.join().unwrap(), Some("client"));
    }

    #[test]
    fn test_close_wakes_all_consumers() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert!(queue.close().is_empty());

        for consumer in consumers {
            assert_eq!(consumer.join().unwrap(), None);
        }
        assert!(queue.is_closed());
    }

    #[test]
    fn test_push_after_close_returns_item() {
        let queue = WorkQueue::new();
        queue.push(1).unwrap();
        assert_eq!(queue.close(), vec![1]);
        assert_eq!(queue.push(2), Err(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_every_item_delivered_once_across_consumers() {
        let queue = Arc::new(WorkQueue::new());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop() {
                        if item == u32::MAX {
                            break;
                        }
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        for i in 0..1000 {
            queue.push(i).unwrap();
        }
        for _ in 0..4 {
            queue.push(u32::MAX).unwrap();
        }

        let mut all: Vec<_> = consumers
            .into_iter()
            .flat_map(|consumer| consumer.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
