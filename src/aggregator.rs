//! Change aggregation across provider passes.
//!
//! Between two passes every requested change is folded into one pending
//! aggregate (last write wins per key). A pass flushes the aggregate together
//! with the previous and current snapshots, then starts over.

use crate::types::{PassLog, State, StateChange};

/// Pending changes of one store since its last provider pass.
#[derive(Clone, Debug)]
pub struct ChangeAggregator {
    /// State as of the previous provider pass.
    last_committed: State,
    /// Union of changes since then.
    pending: StateChange,
    /// Number of passes flushed so far.
    passes: u64,
}

impl ChangeAggregator {
    /// Start aggregating from the store's initial snapshot.
    pub fn new(initial: State) -> Self {
        Self {
            last_committed: initial,
            pending: StateChange::new(),
            passes: 0,
        }
    }

    /// Fold a partial change into the pending aggregate.
    pub fn merge(&mut self, partial: &StateChange) {
        self.pending.extend(partial);
    }

    /// Base snapshot merged with the pending aggregate.
    pub fn projected(&self) -> State {
        self.last_committed.merged(&self.pending)
    }

    /// Close the current pass against the live state.
    pub fn flush(&mut self, current: State) -> PassLog {
        self.passes += 1;
        let state_change = std::mem::take(&mut self.pending);
        let old_state = std::mem::replace(&mut self.last_committed, current.clone());

        PassLog {
            old_state,
            new_state: current,
            state_change,
            pass: self.passes,
        }
    }

    pub fn last_committed(&self) -> &State {
        &self.last_committed
    }

    pub fn pending(&self) -> &StateChange {
        &self.pending
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> State {
        State::new().with("count", 0).with("name", "c")
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut agg = ChangeAggregator::new(counter());
        agg.merge(&StateChange::single("count", 1));
        agg.merge(&StateChange::single("count", 2));

        assert_eq!(agg.pending(), &StateChange::single("count", 2));
        assert_eq!(agg.projected().get("count"), Some(&json!(2)));
        assert_eq!(agg.projected().get("name"), Some(&json!("c")));
    }

    #[test]
    fn test_flush_resets_pending_and_base() {
        let mut agg = ChangeAggregator::new(counter());
        agg.merge(&StateChange::single("count", 2));

        let live = agg.projected();
        let log = agg.flush(live.clone());

        assert_eq!(log.pass, 1);
        assert_eq!(log.old_state, counter());
        assert_eq!(log.new_state, live);
        assert_eq!(log.state_change, StateChange::single("count", 2));

        assert!(agg.pending().is_empty());
        assert_eq!(agg.last_committed(), &live);
        assert_eq!(agg.passes(), 1);
    }

    #[test]
    fn test_empty_pass() {
        let mut agg = ChangeAggregator::new(counter());
        let log = agg.flush(counter());

        assert!(log.state_change.is_empty());
        assert_eq!(log.old_state, log.new_state);
    }
}
