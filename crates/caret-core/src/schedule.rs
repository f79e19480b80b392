use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Identity of one image insertion, from `add_image` to its deferred check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsertionId(pub(crate) u64);

impl InsertionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InsertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ins-{}", self.0)
    }
}

/// Pending visibility checks, at most one per insertion.
///
/// Nothing here runs on its own: the host asks for [`next_deadline`] to arm
/// a timer and the editor drains due entries with [`take_due`].
///
/// [`next_deadline`]: DeferredChecks::next_deadline
/// [`take_due`]: DeferredChecks::take_due
#[derive(Debug, Default)]
pub struct DeferredChecks {
    pending: HashMap<InsertionId, Instant>,
}

impl DeferredChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a check for `insertion` at `deadline`, replacing any check
    /// already pending for it. Returns true when one was replaced.
    pub fn schedule(&mut self, insertion: InsertionId, deadline: Instant) -> bool {
        let replaced = self.pending.insert(insertion, deadline).is_some();
        if replaced {
            tracing::debug!(insertion = %insertion, "cancelled earlier visibility check");
        }
        replaced
    }

    pub fn cancel(&mut self, insertion: InsertionId) -> bool {
        self.pending.remove(&insertion).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Removes and returns every check due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<InsertionId> {
        let mut due: Vec<(Instant, InsertionId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
