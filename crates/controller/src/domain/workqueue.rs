//! Deduplicating, rate-limited work queue of reconcile keys.
//!
//! The queue follows the classic controller work queue contract:
//! - a key that is already pending is never queued twice
//! - a key that is being processed is never handed to a second worker; if it
//!   is re-added meanwhile it is marked dirty and re-queued on [`WorkQueue::done`]
//! - delayed keys wait in a deadline-ordered heap until they are due
//! - [`WorkQueue::shutdown`] rejects new keys and releases every waiter

use std::cmp::Reverse;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use priority_queue::PriorityQueue;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Per-key exponential backoff used by [`WorkQueue::add_rate_limited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl ExponentialBackoff {
    /// Delay applied after `failures` previous failures of the same key.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

struct QueueState<K: Hash + Eq> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    waiting: PriorityQueue<K, Reverse<Instant>>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K: Clone + Hash + Eq> QueueState<K> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            waiting: PriorityQueue::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }

    /// Returns true when the key became ready for a worker.
    fn insert(&mut self, key: K) -> bool {
        if self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some((_, Reverse(deadline))) = self.waiting.peek() {
            if *deadline > now {
                break;
            }
            match self.waiting.pop() {
                Some((key, _)) => {
                    self.insert(key);
                }
                None => break,
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting.peek().map(|(_, Reverse(deadline))| *deadline)
    }
}

/// Work queue shared between event producers and reconcile workers.
pub struct WorkQueue<K: Hash + Eq> {
    name: String,
    backoff: ExponentialBackoff,
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> WorkQueue<K>
where
    K: Clone + Hash + Eq + Send,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_backoff(name, ExponentialBackoff::default())
    }

    pub fn with_backoff(name: impl Into<String>, backoff: ExponentialBackoff) -> Self {
        Self {
            name: name.into(),
            backoff,
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `key`; a no-op if it is already pending.
    pub fn add(&self, key: K) {
        let ready = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.insert(key)
        };
        if ready {
            self.notify.notify_one();
        }
    }

    /// Queues `key` once `delay` has elapsed. An earlier pending deadline for
    /// the same key wins.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let deadline = Instant::now() + delay;
            state.waiting.push_increase(key, Reverse(deadline));
        }
        // Wake a waiter so it re-arms its timer against the new deadline.
        self.notify.notify_one();
    }

    /// Queues `key` after its per-key exponential backoff delay.
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
    }

    /// Clears the backoff history of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    /// Number of rate-limited requeues recorded for `key` since the last forget.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Marks processing of `key` finished; re-queues it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Waits for the next ready key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Keys ready for a worker right now.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops accepting keys, drops pending ones and releases all waiters.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.queue.clear();
            state.waiting.clear();
        }
        self.notify.notify_waiters();
        tracing::debug!(queue = %self.name, "work queue shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(5));
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(3), Duration::from_millis(40));
        assert_eq!(backoff.delay(30), Duration::from_secs(1000));
        assert_eq!(backoff.delay(64), Duration::from_secs(1000));
    }

    #[test(tokio::test)]
    async fn add_coalesces_pending_keys() {
        let queue = WorkQueue::new("test");
        queue.add("a");
        queue.add("a");
        queue.add("b");

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some("a"));
        assert_eq!(queue.get().await, Some("b"));
        assert!(queue.is_empty());
    }

    #[test(tokio::test)]
    async fn key_in_flight_is_requeued_on_done() {
        let queue = WorkQueue::new("test");
        queue.add("a");
        let key = queue.get().await.expect("should get key");

        // re-added while processing: must not be handed out twice
        queue.add("a");
        assert!(queue.is_empty());

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("a"));
    }

    #[test(tokio::test)]
    async fn done_without_readd_does_not_requeue() {
        let queue = WorkQueue::new("test");
        queue.add("a");
        let key = queue.get().await.expect("should get key");
        queue.done(&key);
        assert!(queue.is_empty());
    }

    #[test(tokio::test(start_paused = true))]
    async fn add_after_waits_for_deadline() {
        let queue = WorkQueue::new("test");
        let start = Instant::now();
        queue.add_after("late", Duration::from_secs(5));
        assert!(queue.is_empty());

        assert_eq!(queue.get().await, Some("late"));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[test(tokio::test(start_paused = true))]
    async fn earlier_deadline_wins() {
        let queue = WorkQueue::new("test");
        let start = Instant::now();
        queue.add_after("k", Duration::from_secs(60));
        queue.add_after("k", Duration::from_secs(1));

        assert_eq!(queue.get().await, Some("k"));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test(tokio::test(start_paused = true))]
    async fn rate_limited_requeue_backs_off_until_forget() {
        let queue = WorkQueue::with_backoff(
            "test",
            ExponentialBackoff {
                base: Duration::from_secs(1),
                max: Duration::from_secs(10),
            },
        );

        queue.add_rate_limited("k");
        queue.add_rate_limited("k");
        assert_eq!(queue.num_requeues(&"k"), 2);

        let start = Instant::now();
        assert_eq!(queue.get().await, Some("k"));
        assert!(start.elapsed() >= Duration::from_secs(1));

        queue.forget(&"k");
        assert_eq!(queue.num_requeues(&"k"), 0);
    }

    #[test(tokio::test)]
    async fn shutdown_releases_waiters() {
        let queue = Arc::new(WorkQueue::<String>::new("test"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::task::yield_now().await;
        queue.shutdown();

        let result = waiter.await.expect("waiter should not panic");
        assert_eq!(result, None);
        assert!(queue.is_shutting_down());
    }

    #[test(tokio::test)]
    async fn add_after_shutdown_is_ignored() {
        let queue = WorkQueue::new("test");
        queue.shutdown();
        queue.add("a");
        assert!(queue.is_empty());
        assert_eq!(queue.get().await, None);
    }

    #[test(tokio::test)]
    async fn waiting_worker_wakes_on_add() {
        let queue = Arc::new(WorkQueue::new("test"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::task::yield_now().await;
        queue.add(7u32);

        let result = waiter.await.expect("waiter should not panic");
        assert_eq!(result, Some(7));
    }
}
