use crate::debugger::event::Event;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Unbounded FIFO of session events, safe for concurrent producers and consumers.
///
/// Every event is delivered to exactly one consumer.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    available: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        log::trace!(target: "debugger", "emit event: {event}");
        self.events.lock().unwrap().push_back(event);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<Event> {
        self.events.lock().unwrap().pop_front()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Timeout too large to be represented as a deadline means waiting without limit.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now().checked_add(timeout);
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(event) = events.pop_front() {
                return Some(event);
            }
            let Some(deadline) = deadline else {
                events = self.available.wait(events).unwrap();
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            events = self
                .available
                .wait_timeout(events, deadline - now)
                .unwrap()
                .0;
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unbounded_timeout() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(Event::Started);
            })
        };
        assert_eq!(queue.pop_timeout(Duration::MAX), Some(Event::Started));
        producer.join().unwrap();
    }

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(Event::Started);
        queue.push(Event::Paused);
        queue.push(Event::Resumed);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(Event::Started));
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)),
            Some(Event::Paused)
        );
        assert_eq!(queue.try_pop(), Some(Event::Resumed));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue = EventQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(Event::Started);
            })
        };
        assert_eq!(
            queue.pop_timeout(Duration::from_secs(5)),
            Some(Event::Started)
        );
        producer.join().unwrap();
    }
}
