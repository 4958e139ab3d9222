use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation identifier used to match outbound calls with inbound replies.
///
/// Carried in-band as the `idm` field of every call, reply and error
/// envelope. Ids are positive and only meaningful within the session that
/// issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// The raw integer value sent on the wire.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing correlation ids for one session.
///
/// Allocation is a single atomic increment, so concurrent callers never
/// observe the same id. The counter starts at 1.
#[derive(Debug)]
pub(crate) struct IdGenerator {
    // ---
    next: AtomicU64,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> CorrelationId {
        // ---
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_generate_unique() {
        // ---
        let ids = IdGenerator::new();
        let id1 = ids.next_id();
        let id2 = ids.next_id();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id1.get(), 1);
    }

    #[test]
    fn test_concurrent_allocation_is_distinct_and_ordered_per_caller() {
        // ---
        let ids = Arc::new(IdGenerator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let issued = handle.join().unwrap();
            assert!(issued.windows(2).all(|w| w[0] < w[1]));
            for id in issued {
                assert!(all.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(all.len(), 8 * 500);
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        // ---
        let id = CorrelationId::from(42);
        assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(42));
    }
}
