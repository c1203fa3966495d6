use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// In-process single-writer lease per learner.
///
/// Held for a whole load -> mutate -> commit span. Cross-process writers are
/// caught by the version check at commit instead. An entry only lives while
/// some caller holds or waits on it, so the table is bounded by the number of
/// learners with an operation in flight.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the learner's lease
    pub fn with_lease<T>(&self, learner_id: &str, f: impl FnOnce() -> T) -> T {
        let lease = self.lease(learner_id);
        let result = {
            let _guard = lease.lock();
            f()
        };
        drop(lease);
        self.release(learner_id);
        result
    }

    fn lease(&self, learner_id: &str) -> Arc<Mutex<()>> {
        let mut leases = self.leases.lock();
        Arc::clone(
            leases
                .entry(learner_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // Clones are only handed out under the table lock, so a count of 1 here
    // means no other caller holds or waits on this lease.
    fn release(&self, learner_id: &str) {
        let mut leases = self.leases.lock();
        if leases
            .get(learner_id)
            .is_some_and(|lease| Arc::strong_count(lease) == 1)
        {
            leases.remove(learner_id);
        }
    }

    pub fn len(&self) -> usize {
        self.leases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.lock().is_empty()
    }
}
