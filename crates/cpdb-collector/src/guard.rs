//! Single-flight guard: at most one collection cycle runs at a time.
//!
//! The slot is claimed in two steps. The in-process mutex rejects a second
//! caller in the same process without touching the store. The store lease
//! ([`AccountStore::try_claim_cycle`]) then rejects callers in other processes
//! sharing the same database, such as the CLI racing the cron job.

use std::fmt;
use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::CollectorError;
use crate::store::AccountStore;

/// A store-level claim on the cycle slot, held until released or dropped.
#[async_trait]
pub trait CycleLease: Send {
    async fn release(self: Box<Self>);
}

#[derive(Debug, Default)]
pub struct CycleGuard {
    lock: Mutex<()>,
}

/// Proof that the holder owns the cycle slot.
///
/// Dropping it frees the slot; [`CycleTicket::release`] does the same but
/// waits for the store lease to be given back.
pub struct CycleTicket<'a> {
    local: MutexGuard<'a, ()>,
    shared: StdMutex<Option<Box<dyn CycleLease>>>,
}

impl fmt::Debug for CycleTicket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleTicket")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl CycleTicket<'_> {
    /// Gives back the store lease, then the in-process slot.
    pub async fn release(self) {
        let Self { local, shared } = self;
        let lease = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(lease) = lease {
            lease.release().await;
        }
        drop(local);
    }
}

impl CycleGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the in-process slot without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::CycleInProgress`] if another holder has it.
    pub fn try_acquire(&self) -> Result<CycleTicket<'_>, CollectorError> {
        self.lock
            .try_lock()
            .map(|held| CycleTicket {
                local: held,
                shared: StdMutex::new(None),
            })
            .map_err(|_| CollectorError::CycleInProgress)
    }

    /// Claims the in-process slot, then the store-wide lease, without waiting
    /// on either.
    ///
    /// # Errors
    ///
    /// - [`CollectorError::CycleInProgress`] if either claim is held elsewhere.
    /// - [`CollectorError::Store`] if the lease cannot be requested.
    pub async fn try_acquire_shared(
        &self,
        store: &dyn AccountStore,
    ) -> Result<CycleTicket<'_>, CollectorError> {
        let ticket = self.try_acquire()?;
        let Some(lease) = store.try_claim_cycle().await? else {
            tracing::debug!("cycle slot held by another process");
            return Err(CollectorError::CycleInProgress);
        };

        Ok(CycleTicket {
            local: ticket.local,
            shared: StdMutex::new(Some(lease)),
        })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    struct FlagLease(Arc<AtomicBool>);

    #[async_trait]
    impl CycleLease for FlagLease {
        async fn release(self: Box<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let guard = CycleGuard::new();
        let ticket = guard.try_acquire().expect("first acquire");
        assert!(guard.is_busy());
        assert!(matches!(
            guard.try_acquire(),
            Err(CollectorError::CycleInProgress)
        ));
        drop(ticket);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn release_returns_the_lease_and_frees_the_slot() {
        let guard = CycleGuard::new();
        let released = Arc::new(AtomicBool::new(false));
        let lease: Box<dyn CycleLease> = Box::new(FlagLease(Arc::clone(&released)));
        let local = guard.try_acquire().expect("acquire");
        let ticket = CycleTicket {
            local: local.local,
            shared: StdMutex::new(Some(lease)),
        };

        ticket.release().await;

        assert!(released.load(Ordering::SeqCst));
        assert!(!guard.is_busy());
    }
}
