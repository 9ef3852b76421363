//! Four-lane priority queue feeding the worker threads.
//!
//! Strict lane precedence on dequeue (Critical > High > Normal > Low), FIFO
//! within a lane. One mutex guards the lane array; a condvar parks idle
//! workers instead of busy-spinning. No fairness protection is provided for
//! the Low lane under sustained higher-priority load; that is a documented
//! property, not a bug.

use crate::error::{Error, Result};
use crate::work::WorkItem;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Dispatch priority of a unit of work. Higher lanes strictly preempt lower
/// lanes at every dequeue decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub(crate) const COUNT: usize = 4;

    pub(crate) fn lane(self) -> usize {
        self as usize
    }
}

struct Lanes {
    lanes: [VecDeque<Arc<WorkItem>>; Priority::COUNT],
    len: usize,
    paused: bool,
    shutdown: bool,
}

impl Lanes {
    fn pop_highest(&mut self) -> Option<Arc<WorkItem>> {
        for lane in &mut self.lanes {
            if let Some(item) = lane.pop_front() {
                self.len -= 1;
                return Some(item);
            }
        }
        None
    }
}

/// Bounded, thread-safe priority queue.
pub(crate) struct PriorityQueue {
    lanes: Mutex<Lanes>,
    available: Condvar,
    capacity: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize, start_paused: bool) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                lanes: Default::default(),
                len: 0,
                paused: start_paused,
                shutdown: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends to the lane matching the item's priority. Fails with
    /// [`Error::QueueFull`] when the pending depth is at the configured
    /// limit; that is the caller-visible backpressure condition.
    pub fn push(&self, item: Arc<WorkItem>) -> Result<()> {
        let mut lanes = self.lanes.lock();
        if lanes.len >= self.capacity {
            return Err(Error::QueueFull {
                limit: self.capacity,
            });
        }
        self.push_locked(&mut lanes, item);
        Ok(())
    }

    /// Internal append for retries and scheduler firings; already-admitted
    /// work is never dropped at the backpressure gate.
    pub fn push_internal(&self, item: Arc<WorkItem>) {
        let mut lanes = self.lanes.lock();
        self.push_locked(&mut lanes, item);
    }

    fn push_locked(&self, lanes: &mut Lanes, item: Arc<WorkItem>) {
        let lane = item.options.priority().lane();
        lanes.lanes[lane].push_back(item);
        lanes.len += 1;
        self.available.notify_one();
    }

    /// Removes and returns the head of the highest non-empty lane.
    pub fn pop(&self) -> Option<Arc<WorkItem>> {
        self.lanes.lock().pop_highest()
    }

    /// Mirrors `pop` without removal.
    pub fn peek(&self) -> Option<Arc<WorkItem>> {
        let lanes = self.lanes.lock();
        lanes
            .lanes
            .iter()
            .find_map(|lane| lane.front().cloned())
    }

    /// Blocking dequeue for worker threads. Parks until an item is available
    /// and dispatch is not suspended; returns `None` on shutdown.
    pub fn pop_wait(&self) -> Option<Arc<WorkItem>> {
        let mut lanes = self.lanes.lock();
        loop {
            if lanes.shutdown {
                return None;
            }
            if !lanes.paused {
                if let Some(item) = lanes.pop_highest() {
                    return Some(item);
                }
            }
            self.available.wait(&mut lanes);
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lane_len(&self, priority: Priority) -> usize {
        self.lanes.lock().lanes[priority.lane()].len()
    }

    /// Consistent snapshot of pending work in lane-then-FIFO order.
    pub fn snapshot(&self) -> Vec<Arc<WorkItem>> {
        let lanes = self.lanes.lock();
        lanes
            .lanes
            .iter()
            .flat_map(|lane| lane.iter().cloned())
            .collect()
    }

    /// Removes every pending item, preserving snapshot order.
    pub fn drain(&self) -> Vec<Arc<WorkItem>> {
        let mut lanes = self.lanes.lock();
        let mut drained = Vec::with_capacity(lanes.len);
        for lane in &mut lanes.lanes {
            drained.extend(lane.drain(..));
        }
        lanes.len = 0;
        drained
    }

    /// Releases a suspended queue; workers start dequeuing.
    pub fn resume(&self) {
        let mut lanes = self.lanes.lock();
        lanes.paused = false;
        drop(lanes);
        self.available.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lanes.lock().paused
    }

    pub fn shutdown(&self) {
        let mut lanes = self.lanes.lock();
        lanes.shutdown = true;
        drop(lanes);
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{WorkId, WorkItem, WorkOptions};

    fn item(priority: Priority) -> Arc<WorkItem> {
        let options = WorkOptions::builder().priority(priority).build().unwrap();
        Arc::new(WorkItem::new(
            WorkId::next(),
            Box::new(|| Ok(Box::new(()) as _)),
            options,
        ))
    }

    #[test]
    fn test_lane_precedence() {
        let queue = PriorityQueue::new(16, false);
        queue.push(item(Priority::Low)).unwrap();
        queue.push(item(Priority::Critical)).unwrap();
        queue.push(item(Priority::Normal)).unwrap();
        queue.push(item(Priority::High)).unwrap();

        let order: Vec<Priority> = std::iter::from_fn(|| queue.pop())
            .map(|i| i.options.priority())
            .collect();
        assert_eq!(
            order,
            vec![
                Priority::Critical,
                Priority::High,
                Priority::Normal,
                Priority::Low
            ]
        );
    }

    #[test]
    fn test_fifo_within_lane() {
        let queue = PriorityQueue::new(16, false);
        let a = item(Priority::Normal);
        let b = item(Priority::Normal);
        let first = a.id;

        queue.push(a).unwrap();
        queue.push(b).unwrap();

        assert_eq!(queue.pop().unwrap().id, first);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = PriorityQueue::new(16, false);
        queue.push(item(Priority::High)).unwrap();

        assert_eq!(queue.peek().unwrap().options.priority(), Priority::High);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop().is_some());
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_backpressure() {
        let queue = PriorityQueue::new(2, false);
        queue.push(item(Priority::Normal)).unwrap();
        queue.push(item(Priority::Normal)).unwrap();

        assert!(matches!(
            queue.push(item(Priority::Normal)),
            Err(Error::QueueFull { limit: 2 })
        ));

        // internal pushes bypass the gate
        queue.push_internal(item(Priority::Normal));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_snapshot_order() {
        let queue = PriorityQueue::new(16, false);
        queue.push(item(Priority::Low)).unwrap();
        queue.push(item(Priority::Critical)).unwrap();
        queue.push(item(Priority::Low)).unwrap();

        let priorities: Vec<Priority> = queue
            .snapshot()
            .iter()
            .map(|i| i.options.priority())
            .collect();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::Low, Priority::Low]
        );
        // snapshot has no side effects
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_lane_counts() {
        let queue = PriorityQueue::new(16, false);
        queue.push(item(Priority::Low)).unwrap();
        queue.push(item(Priority::Low)).unwrap();
        queue.push(item(Priority::High)).unwrap();

        assert_eq!(queue.lane_len(Priority::Low), 2);
        assert_eq!(queue.lane_len(Priority::High), 1);
        assert_eq!(queue.lane_len(Priority::Critical), 0);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_pop_wait_shutdown() {
        let queue = Arc::new(PriorityQueue::new(16, false));
        let waiter = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop_wait())
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        queue.shutdown();
        assert!(waiter.join().unwrap().is_none());
    }
}
