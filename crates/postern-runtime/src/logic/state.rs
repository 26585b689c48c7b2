//! Session Owner State
//!
//! Everything the session owner mutates, plus counters for its activity.

use std::sync::Arc;

use postern_core::{AppEvent, MessageQueue, PosternConfig, SessionState, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Owner State
// ----------------------------------------------------------------------------

/// State owned by the session-owner task
///
/// The queue is shared with the network actor; every other field is touched
/// only from the owner's event loop.
pub struct OwnerState {
    pub session: SessionState,
    pub queue: MessageQueue,
    pub config: PosternConfig,
    pub time_source: Arc<dyn TimeSource>,
    pub stats: OwnerStats,
}

impl OwnerState {
    pub fn new(
        session: SessionState,
        queue: MessageQueue,
        config: PosternConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            session,
            queue,
            config,
            time_source,
            stats: OwnerStats::default(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.time_source.now()
    }
}

/// Counters reported when the owner stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerStats {
    pub commands_processed: u64,
    pub deliveries_absorbed: u64,
    pub records_absorbed: u64,
    pub sent_confirmations: u64,
    pub saves_requested: u64,
    pub operations_failed: u64,
}

// ----------------------------------------------------------------------------
// Handler Outcome
// ----------------------------------------------------------------------------

/// Result of one handled request
///
/// A mutating outcome is saved before its events reach the front end.
#[derive(Debug, Default)]
pub struct Outcome {
    pub mutated: bool,
    pub events: Vec<AppEvent>,
}

impl Outcome {
    /// Read-only answer
    pub fn query(events: Vec<AppEvent>) -> Self {
        Self {
            mutated: false,
            events,
        }
    }

    /// State changed; persist before reporting
    pub fn mutation(events: Vec<AppEvent>) -> Self {
        Self {
            mutated: true,
            events,
        }
    }

    /// Request rejected before anything changed
    pub fn failed<T: Into<String>>(reason: T) -> Self {
        Self::query(vec![AppEvent::OperationFailed {
            reason: reason.into(),
        }])
    }
}
