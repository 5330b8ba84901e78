/*!
 * Exclusive resource locks.
 *
 * One lock exists per resource name and is shared by every session opened on
 * that name. It is a plain binary lock: the holder is recorded for
 * diagnostics only, so a second acquire from the same session blocks like any
 * other.
 */
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{Result, VisaError};
use crate::timeout::Timeout;

/// Lock modes of `viLock`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// One holder at a time
    Exclusive,
    /// Key-based sharing, not simulated
    Shared,
}

/// Exclusive lock over one resource
#[derive(Debug)]
pub struct ResourceLock {
    resource: String,
    holder: Mutex<Option<String>>,
    released: Condvar,
}

impl ResourceLock {
    /// A free lock for `resource`
    pub fn new<S: Into<String>>(resource: S) -> Self {
        Self {
            resource: resource.into(),
            holder: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    /// The resource this lock protects
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Take the lock, blocking up to `timeout`
    pub fn acquire(&self, holder: &str, timeout: Timeout) -> Result<()> {
        let deadline = timeout.deadline();
        let mut current = self.holder.lock();

        while current.is_some() {
            match (timeout, deadline) {
                (Timeout::Immediate, _) => return Err(self.timed_out(holder, timeout)),
                (_, Some(deadline)) => {
                    if self.released.wait_until(&mut current, deadline).timed_out()
                        && current.is_some()
                    {
                        return Err(self.timed_out(holder, timeout));
                    }
                }
                (_, None) => self.released.wait(&mut current),
            }
        }

        *current = Some(holder.to_string());
        debug!(resource = %self.resource, holder, "Acquired lock");
        Ok(())
    }

    /// Take the lock in the given mode.
    ///
    /// Only exclusive locks without a requested key are supported.
    pub fn acquire_with(
        &self,
        kind: LockKind,
        requested_key: Option<&str>,
        holder: &str,
        timeout: Timeout,
    ) -> Result<()> {
        if kind != LockKind::Exclusive {
            return Err(VisaError::not_implemented(format!(
                "only exclusive locks are supported ({:?})",
                kind
            )));
        }
        if let Some(key) = requested_key {
            return Err(VisaError::not_implemented(format!(
                "requested lock keys are not supported ({})",
                key
            )));
        }
        self.acquire(holder, timeout)
    }

    /// Give the lock back
    pub fn release(&self) -> Result<()> {
        let mut current = self.holder.lock();
        match current.take() {
            Some(holder) => {
                debug!(resource = %self.resource, holder = %holder, "Released lock");
                self.released.notify_one();
                Ok(())
            }
            None => Err(VisaError::NotLocked(self.resource.clone())),
        }
    }

    /// Who holds the lock
    pub fn holder(&self) -> Option<String> {
        self.holder.lock().clone()
    }

    /// Whether anyone holds the lock
    pub fn is_locked(&self) -> bool {
        self.holder.lock().is_some()
    }

    /// Take the lock and release it when the guard drops
    pub fn guard(self: &Arc<Self>, holder: &str, timeout: Timeout) -> Result<LockGuard> {
        self.acquire(holder, timeout)?;
        Ok(LockGuard { lock: self.clone() })
    }

    fn timed_out(&self, holder: &str, timeout: Timeout) -> VisaError {
        warn!(resource = %self.resource, holder, %timeout, "Timed out waiting for lock");
        VisaError::timeout(format!("locking {} ({})", self.resource, timeout))
    }
}

/// Holds a [`ResourceLock`] until dropped
#[derive(Debug)]
pub struct LockGuard {
    lock: Arc<ResourceLock>,
}

impl LockGuard {
    /// The guarded lock
    pub fn lock(&self) -> &ResourceLock {
        &self.lock
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            warn!(resource = %self.lock.resource, "Failed to release lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_acquire_release() {
        let lock = ResourceLock::new("MOCK0::mock1::INSTR");
        lock.acquire("session 1", Timeout::Immediate).unwrap();
        assert_eq!(lock.holder().as_deref(), Some("session 1"));
        lock.release().unwrap();
        assert!(!lock.is_locked());
        assert!(matches!(lock.release(), Err(VisaError::NotLocked(_))));
    }

    #[test]
    fn test_second_acquire_times_out() {
        let lock = ResourceLock::new("MOCK0::mock1::INSTR");
        lock.acquire("session 1", Timeout::Immediate).unwrap();

        assert!(lock.acquire("session 2", Timeout::Immediate).unwrap_err().is_timeout());

        let start = Instant::now();
        let err = lock
            .acquire("session 2", Timeout::After(Duration::from_millis(60)))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let lock = Arc::new(ResourceLock::new("MOCK0::mock1::INSTR"));
        let (held_tx, held_rx) = mpsc::channel();

        let holder = {
            let lock = lock.clone();
            thread::spawn(move || {
                let _guard = lock.guard("worker", Timeout::Immediate).unwrap();
                held_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            })
        };

        held_rx.recv().unwrap();
        lock.acquire("main", Timeout::After(Duration::from_secs(5))).unwrap();
        assert_eq!(lock.holder().as_deref(), Some("main"));
        holder.join().unwrap();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = Arc::new(ResourceLock::new("MOCK0::mock1::INSTR"));
        {
            let guard = lock.guard("session 1", Timeout::Infinite).unwrap();
            assert!(guard.lock().is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_shared_and_keyed_locks_not_implemented() {
        let lock = ResourceLock::new("MOCK0::mock1::INSTR");
        assert!(matches!(
            lock.acquire_with(LockKind::Shared, None, "s", Timeout::Immediate),
            Err(VisaError::NotImplemented(_))
        ));
        assert!(matches!(
            lock.acquire_with(LockKind::Exclusive, Some("key"), "s", Timeout::Immediate),
            Err(VisaError::NotImplemented(_))
        ));
        lock.acquire_with(LockKind::Exclusive, None, "s", Timeout::Immediate)
            .unwrap();
    }
}
