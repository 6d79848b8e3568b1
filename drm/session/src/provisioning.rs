use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/**
    Ensures only one provisioning round-trip is in flight per manager.

    Every session that needs provisioning enlists as a waiter. The first to
    enlist wins the flag and issues the request. Whoever completes the
    round-trip calls [`ProvisioningGuard::finish`], which clears the flag and
    hands back every live waiter to be notified.
*/
pub(crate) struct ProvisioningGuard<W> {
    in_flight: AtomicBool,
    waiters: Mutex<Vec<Weak<W>>>,
}

impl<W> ProvisioningGuard<W> {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /**
        Enlist `waiter` for the next completion. Returns `true` when the
        caller must issue the provisioning request itself.
    */
    pub(crate) fn enlist(&self, waiter: &Arc<W>) -> bool {
        {
            let mut waiters = self.waiters.lock();
            let weak = Arc::downgrade(waiter);
            if !waiters.iter().any(|w| Weak::ptr_eq(w, &weak)) {
                waiters.push(weak);
            }
        }
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /**
        Clear the in-flight flag and take every waiter that is still alive.
    */
    pub(crate) fn finish(&self) -> Vec<Arc<W>> {
        self.in_flight.store(false, Ordering::Release);
        self.waiters
            .lock()
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
