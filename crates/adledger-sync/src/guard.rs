//! Process-local duplicate-scrape guard.

use crate::error::{Result, SyncError};
use adledger_core::RankPlatform;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Identifies one scrape: a client's keyword on one surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrapeKey {
    /// Client the keyword is tracked for
    pub client_id: String,
    /// Surface being scraped
    pub platform: RankPlatform,
    /// Search phrase
    pub keyword: String,
}

impl ScrapeKey {
    pub fn new(client_id: &str, platform: RankPlatform, keyword: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            platform,
            keyword: keyword.to_string(),
        }
    }
}

/// Set of scrapes currently running. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<ScrapeKey>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or fail immediately when another scrape holds it.
    pub fn try_acquire(&self, key: ScrapeKey) -> Result<InFlightPermit> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(SyncError::AlreadyInFlight {
                client_id: key.client_id,
                platform: key.platform,
                keyword: key.keyword,
            });
        }
        Ok(InFlightPermit {
            active: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_active(&self, key: &ScrapeKey) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct InFlightPermit {
    active: Arc<Mutex<HashSet<ScrapeKey>>>,
    key: ScrapeKey,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let guard = InFlightGuard::new();
        let key = ScrapeKey::new("client-1", RankPlatform::Place, "임플란트");

        let permit = guard.try_acquire(key.clone()).expect("first acquire");
        assert!(matches!(
            guard.try_acquire(key.clone()),
            Err(SyncError::AlreadyInFlight { .. })
        ));
        assert!(guard.is_active(&key));

        drop(permit);
        assert!(!guard.is_active(&key));
        assert!(guard.try_acquire(key).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let guard = InFlightGuard::new();
        let _place = guard
            .try_acquire(ScrapeKey::new("client-1", RankPlatform::Place, "임플란트"))
            .expect("place");

        assert!(guard
            .try_acquire(ScrapeKey::new("client-1", RankPlatform::View, "임플란트"))
            .is_ok());
        assert!(guard
            .try_acquire(ScrapeKey::new("client-2", RankPlatform::Place, "임플란트"))
            .is_ok());
    }
}
