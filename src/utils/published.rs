use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

type Generation<T> = (u64, Arc<Vec<T>>);

/// The latest result list shared between a single producer and any number of readers
///
/// The list is never updated in place: [publish](PublishedResult::publish) swaps the whole list
/// under the mutex and bumps the generation counter. Readers copy (or share) the list under the
/// same mutex, so a reader observes either the old or the new list, never a mix. The lock is
/// held only for the swap or the `Arc` clone; copying the items happens after it is released.
///
/// A reader may miss generations when the producer publishes faster than it polls.
///
#[derive(Debug)]
pub struct PublishedResult<T> {
    current: Mutex<Generation<T>>,
    changed: Condvar,
}

impl<T> Default for PublishedResult<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new((0, Arc::new(Vec::new()))),
            changed: Condvar::new(),
        }
    }
}

impl<T: Clone> PublishedResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list wholesale and wakes up the waiting readers
    ///
    /// Returns the generation of the published list.
    ///
    pub fn publish(&self, items: Vec<T>) -> u64 {
        let items = Arc::new(items);
        let generation = {
            let mut current = self
                .current
                .lock()
                .expect("Access to published result must always succeed");
            current.0 += 1;
            current.1 = items;
            current.0
        };
        self.changed.notify_all();
        generation
    }

    /// The current generation and the list without copying the items
    ///
    pub fn shared(&self) -> (u64, Arc<Vec<T>>) {
        let current = self
            .current
            .lock()
            .expect("Access to published result must always succeed");
        (current.0, current.1.clone())
    }

    /// The number of lists published so far
    ///
    pub fn generation(&self) -> u64 {
        self.shared().0
    }

    /// A copy of the current list
    ///
    pub fn snapshot(&self) -> Vec<T> {
        let (_, items) = self.shared();
        items.as_ref().clone()
    }

    /// A copy of at most `limit` first items of the current list
    ///
    pub fn snapshot_limited(&self, limit: usize) -> Vec<T> {
        let (_, items) = self.shared();
        items.iter().take(limit).cloned().collect()
    }

    /// Blocks until a list newer than `generation` is published or the timeout elapses
    ///
    /// Returns `None` on timeout.
    ///
    pub fn wait_newer(&self, generation: u64, timeout: Duration) -> Option<(u64, Arc<Vec<T>>)> {
        let current = self
            .current
            .lock()
            .expect("Access to published result must always succeed");
        let (current, _) = self
            .changed
            .wait_timeout_while(current, timeout, |(g, _)| *g <= generation)
            .expect("Access to published result must always succeed");
        if current.0 > generation {
            Some((current.0, current.1.clone()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::published::PublishedResult;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn publish_and_snapshot() {
        let store = PublishedResult::<u32>::new();
        assert_eq!(store.generation(), 0);
        assert!(store.snapshot().is_empty());

        assert_eq!(store.publish(vec![1, 2, 3]), 1);
        let old = store.snapshot();
        let (_, old_shared) = store.shared();

        assert_eq!(store.publish(vec![4]), 2);
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(old_shared.as_ref(), &vec![1, 2, 3]);
        assert_eq!(store.snapshot(), vec![4]);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn limited() {
        let store = PublishedResult::<u32>::new();
        store.publish((0..10).collect());
        assert_eq!(store.snapshot_limited(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(store.snapshot_limited(50).len(), 10);
    }

    #[test]
    fn wait_newer() {
        let store = Arc::new(PublishedResult::<u32>::new());
        assert!(store.wait_newer(0, Duration::from_millis(10)).is_none());

        let producer = {
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.publish(vec![7]);
            })
        };

        let (generation, items) = store.wait_newer(0, Duration::from_secs(10)).unwrap();
        assert_eq!(generation, 1);
        assert_eq!(items.as_ref(), &vec![7]);
        producer.join().unwrap();
    }

    #[test]
    fn readers_see_whole_lists() {
        let store = Arc::new(PublishedResult::<u64>::new());
        let producer = {
            let store = store.clone();
            thread::spawn(move || {
                for n in 1..=500_u64 {
                    store.publish(vec![n; (n % 17 + 1) as usize]);
                }
            })
        };

        let readers = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.snapshot();
                        if let Some(first) = snapshot.first() {
                            assert_eq!(snapshot.len() as u64, first % 17 + 1);
                            assert!(snapshot.iter().all(|v| v == first));
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        producer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.generation(), 500);
    }
}
