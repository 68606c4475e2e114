// Run lock: at most one similarity run per entity kind at a time.
//
// Full recomputes delete the existing edge table before rebuilding it, so
// two overlapping runs of the same kind could interleave deletes and
// writes. The lock is per kind; a user run and a business run may overlap.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::db::models::EntityKind;

/// Per-kind mutual exclusion for similarity runs. Shared across tasks as
/// `Arc<RunLock>`.
#[derive(Default)]
pub struct RunLock {
    user: AtomicBool,
    business: AtomicBool,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, kind: EntityKind) -> &AtomicBool {
        match kind {
            EntityKind::User => &self.user,
            EntityKind::Business => &self.business,
        }
    }

    /// Acquire the lock for `kind`, failing immediately if a run of the
    /// same kind is already active. The returned guard releases on drop.
    pub fn try_acquire(&self, kind: EntityKind) -> Result<RunGuard<'_>> {
        let flag = self.flag(kind);
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            anyhow::bail!("A {kind} similarity run is already active");
        }
        Ok(RunGuard { flag })
    }
}

/// RAII guard for an acquired run slot.
#[derive(Debug)]
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_of_same_kind_fails() {
        let lock = RunLock::new();
        let _guard = lock.try_acquire(EntityKind::User).unwrap();

        let err = lock.try_acquire(EntityKind::User).unwrap_err();
        assert!(err.to_string().contains("already active"));
    }

    #[test]
    fn test_kinds_lock_independently() {
        let lock = RunLock::new();
        let _user = lock.try_acquire(EntityKind::User).unwrap();
        assert!(lock.try_acquire(EntityKind::Business).is_ok());
    }

    #[test]
    fn test_drop_releases_the_slot() {
        let lock = RunLock::new();
        {
            let _guard = lock.try_acquire(EntityKind::Business).unwrap();
            assert!(lock.try_acquire(EntityKind::Business).is_err());
        }
        assert!(lock.try_acquire(EntityKind::Business).is_ok());
    }
}
