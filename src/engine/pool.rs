//! Bounded pool of virtual users.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<u32>,
    allocated: u32,
    next_id: u32,
    peak_in_use: u32,
    peak_allocated: u32,
}

impl PoolState {
    fn in_use(&self) -> u32 {
        self.allocated - self.idle.len() as u32
    }

    fn note_lease(&mut self) {
        self.peak_in_use = self.peak_in_use.max(self.in_use());
        self.peak_allocated = self.peak_allocated.max(self.allocated);
    }
}

/// Pool statistics reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: u32,
    pub in_use: u32,
    pub peak_in_use: u32,
    pub peak_allocated: u32,
}

/// VUs between `pre_allocated` and `max`.
///
/// `pre_allocated` VUs exist from the start. The pool allocates more on
/// demand up to `max`, and retires a released VU whenever `pre_allocated`
/// are already idle.
#[derive(Debug)]
pub struct VuPool {
    state: Mutex<PoolState>,
    released: Notify,
    pre_allocated: u32,
    max: u32,
    grew: AtomicBool,
}

impl VuPool {
    pub fn new(pre_allocated: u32, max: u32) -> Arc<Self> {
        let max = max.max(pre_allocated).max(1);
        Arc::new(Self {
            state: Mutex::new(PoolState {
                idle: (0..pre_allocated).rev().collect(),
                allocated: pre_allocated,
                next_id: pre_allocated,
                peak_in_use: 0,
                peak_allocated: pre_allocated,
            }),
            released: Notify::new(),
            pre_allocated,
            max,
            grew: AtomicBool::new(false),
        })
    }

    /// Leases an idle VU, allocating one if the pool is below `max`.
    pub fn try_lease(self: &Arc<Self>) -> Option<VuLease> {
        let id = {
            let mut state = self.state.lock();
            let id = match state.idle.pop() {
                Some(id) => id,
                None if state.allocated < self.max => {
                    state.allocated += 1;
                    let id = state.next_id;
                    state.next_id += 1;
                    if state.allocated > self.pre_allocated && !self.grew.swap(true, Ordering::Relaxed)
                    {
                        tracing::warn!(
                            pre_allocated = self.pre_allocated,
                            max = self.max,
                            "all pre-allocated VUs are busy, allocating more"
                        );
                    }
                    id
                }
                None => return None,
            };
            state.note_lease();
            id
        };

        Some(VuLease {
            pool: Arc::clone(self),
            id,
        })
    }

    /// Like [`try_lease`](Self::try_lease), waiting up to `wait` for a VU to be released.
    pub async fn lease_within(self: &Arc<Self>, wait: Duration) -> Option<VuLease> {
        let deadline = Instant::now() + wait;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(lease) = self.try_lease() {
                return Some(lease);
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return self.try_lease();
            }
        }
    }

    fn release(&self, id: u32) {
        {
            let mut state = self.state.lock();
            if state.idle.len() as u32 >= self.pre_allocated {
                state.allocated -= 1;
            } else {
                state.idle.push(id);
            }
        }
        self.released.notify_one();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            allocated: state.allocated,
            in_use: state.in_use(),
            peak_in_use: state.peak_in_use,
            peak_allocated: state.peak_allocated,
        }
    }
}

/// A leased VU; returned to the pool on drop.
#[derive(Debug)]
pub struct VuLease {
    pool: Arc<VuPool>,
    id: u32,
}

impl VuLease {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for VuLease {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_grows_to_max_then_refuses() {
        let pool = VuPool::new(2, 3);
        let a = pool.try_lease().unwrap();
        let b = pool.try_lease().unwrap();
        let c = pool.try_lease().unwrap();
        assert!(pool.try_lease().is_none());
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());

        let stats = pool.stats();
        assert_eq!(stats.allocated, 3);
        assert_eq!(stats.in_use, 3);
        assert_eq!(stats.peak_allocated, 3);
    }

    #[test]
    fn test_shrinks_back_to_pre_allocated() {
        let pool = VuPool::new(2, 4);
        let leases: Vec<_> = (0..4).map(|_| pool.try_lease().unwrap()).collect();
        assert_eq!(pool.stats().allocated, 4);
        drop(leases);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.peak_in_use, 4);
    }

    #[test]
    #[traced_test]
    fn test_growth_warns_once() {
        let pool = VuPool::new(1, 3);
        let _a = pool.try_lease().unwrap();
        let _b = pool.try_lease().unwrap();
        let _c = pool.try_lease().unwrap();
        assert!(logs_contain("allocating more"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("allocating more")).count() {
                1 => Ok(()),
                n => Err(format!("expected one growth warning, saw {}", n)),
            }
        });
    }

    #[test]
    fn test_zero_pre_allocated_allocates_on_demand() {
        let pool = VuPool::new(0, 1);
        assert_eq!(pool.stats().allocated, 0);
        let lease = pool.try_lease().unwrap();
        assert_eq!(pool.stats().allocated, 1);
        drop(lease);
        assert_eq!(pool.stats().allocated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_within_waits_for_release() {
        let pool = VuPool::new(1, 1);
        let held = pool.try_lease().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.lease_within(Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(held);

        let lease = waiter.await.unwrap();
        assert!(lease.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_within_times_out() {
        let pool = VuPool::new(1, 1);
        let _held = pool.try_lease().unwrap();
        let start = Instant::now();
        assert!(pool.lease_within(Duration::from_millis(500)).await.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
