//! Transaction registry: correlation id to pending handler
//!
//! Replaces listener-per-message dispatch with an explicit map so that
//! "exactly one terminal settlement per id" is an enforceable invariant:
//! settling removes the entry, a second settlement attempt finds nothing,
//! and a restart can drain every outstanding id in one pass.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Terminal outcome delivered to a pending handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The operation succeeded; payload is the compiled artifact or the
    /// final program output
    Success(String),
    /// The operation failed; payload is the error description
    Failure(String),
    /// The worker was restarted while the operation was pending
    Cancelled,
}

/// Invoked exactly once with the terminal outcome of an operation
pub type TerminalHandler = Box<dyn FnOnce(Settlement) + Send + 'static>;

/// Invoked for each streamed interim byte of a run
pub type StreamHandler = Box<dyn Fn(u8) + Send + Sync + 'static>;

struct Pending {
    terminal: TerminalHandler,
    stream: Option<StreamHandler>,
}

/// Maps pending correlation ids to their structured handlers (terminal
/// plus optional streaming), removed deterministically on settlement.
#[derive(Default)]
pub struct TransactionRegistry {
    pending: Mutex<HashMap<Uuid, Pending>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handlers for a freshly minted id.
    ///
    /// Ids are minted per operation and never reused while pending; a
    /// collision indicates a caller bug; the displaced handler settles as
    /// cancelled rather than leaking.
    pub fn register(&self, id: Uuid, terminal: TerminalHandler, stream: Option<StreamHandler>) {
        let previous = self.pending.lock().insert(id, Pending { terminal, stream });
        if let Some(previous) = previous {
            warn!(%id, "correlation id re-registered while still pending");
            (previous.terminal)(Settlement::Cancelled);
        }
    }

    /// Settle an operation exactly once.
    ///
    /// Removes the entry and invokes its terminal handler. Returns false if
    /// the id is unknown (already settled, never registered, or minted by a
    /// worker that has since been discarded).
    pub fn settle(&self, id: Uuid, settlement: Settlement) -> bool {
        let Some(pending) = self.pending.lock().remove(&id) else {
            warn!(%id, "terminal response for unknown correlation id");
            return false;
        };
        debug!(%id, success = matches!(settlement, Settlement::Success(_)), "settling transaction");
        (pending.terminal)(settlement);
        true
    }

    /// Deliver a streamed interim byte without ending the operation.
    ///
    /// Returns false if the id is unknown or has no streaming handler.
    pub fn stream(&self, id: Uuid, byte: u8) -> bool {
        let guard = self.pending.lock();
        match guard.get(&id).and_then(|p| p.stream.as_ref()) {
            Some(handler) => {
                handler(byte);
                true
            }
            None => false,
        }
    }

    /// Settle every outstanding id as cancelled.
    ///
    /// This is the restart contract: no caller may be left hanging after
    /// the worker is torn down. Returns how many ids were settled.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<(Uuid, Pending)> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            debug!(%id, "aborting pending transaction");
            (pending.terminal)(Settlement::Cancelled);
        }
        count
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
