use crate::db::SubjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-subject async locks. Entries are dropped once no guard or waiter holds them.
#[derive(Default)]
pub struct SubjectLocks {
    inner: Mutex<HashMap<SubjectId, Weak<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subject_id`.
    pub async fn acquire(&self, subject_id: SubjectId) -> OwnedMutexGuard<()> {
        self.slot(subject_id).lock_owned().await
    }

    /// Exclusive access if nobody else holds it right now.
    pub fn try_acquire(&self, subject_id: SubjectId) -> Option<OwnedMutexGuard<()>> {
        self.slot(subject_id).try_lock_owned().ok()
    }

    fn slot(&self, subject_id: SubjectId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = map.get(&subject_id).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        map.insert(subject_id, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, weak| weak.strong_count() > 0);
        map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_subject_is_exclusive() {
        let locks = SubjectLocks::new();
        let guard = locks.acquire(1).await;
        assert!(locks.try_acquire(1).is_none());
        assert!(locks.try_acquire(2).is_some());
        drop(guard);
        assert!(locks.try_acquire(1).is_some());
    }

    #[tokio::test]
    async fn released_slots_are_forgotten() {
        let locks = SubjectLocks::new();
        {
            let _a = locks.acquire(1).await;
            let _b = locks.acquire(2).await;
            assert_eq!(locks.tracked(), 2);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
