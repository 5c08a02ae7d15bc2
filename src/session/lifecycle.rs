//! Request lifecycle: at most one live request per concern.
//!
//! Every issued request captures a generation from one session-wide counter
//! and a cancellation token stored in its concern's slot. Issuing again for
//! the same slot cancels the previous token; a cancelled request resolves as
//! [`FetchOutcome::Aborted`]. A response is merged only while its generation
//! is still the one recorded in the slot.
//!
//! Value fetches also hold a session-wide busy guard. The guard travels with
//! the [`PendingFetch`] and is released when the fetch is merged, cancelled
//! or dropped unmerged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{GraphError, NodeId, Row};
use crate::runner::{parse_results, StatementBatch, StatementRunner};

/// What a request is for. Each concern has its own cancelable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    /// Counts of every countable node
    Count,
    /// Candidate values of auto-load nodes
    AutoLoad,
    /// Rows of the result query
    Results,
    /// Candidate values of a clicked node
    Value,
    /// Outgoing relations of one node; one slot per node
    Relations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Parsed rows, one list per statement of the batch
    Completed(Vec<Vec<Row>>),
    /// Transport failure; merged as empty/zero
    Failed(String),
    /// Superseded or cancelled; never merged
    Aborted,
}

/// A finished request with the context it was issued with.
#[derive(Debug, Clone)]
pub struct FetchResponse<T> {
    pub concern: Concern,
    pub generation: u64,
    pub context: T,
    pub outcome: FetchOutcome,
}

/// Claim on the value-fetch guard, released on drop.
///
/// Dropping the claim also cancels its request, so an abandoned fetch can
/// neither keep the guard nor merge later.
struct ValueGuard {
    owner: Arc<AtomicU64>,
    generation: u64,
    token: CancellationToken,
}

impl Drop for ValueGuard {
    fn drop(&mut self) {
        self.token.cancel();
        // a newer fetch may own the guard after a reset
        let _ = self
            .owner
            .compare_exchange(self.generation, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Handle to an in-flight request.
pub struct PendingFetch<T> {
    concern: Concern,
    generation: u64,
    context: T,
    handle: JoinHandle<FetchOutcome>,
    guard: Option<ValueGuard>,
}

impl<T> PendingFetch<T> {
    pub fn concern(&self) -> Concern {
        self.concern
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn context(&self) -> &T {
        &self.context
    }

    /// Wait for the request to finish, be cancelled or fail.
    pub async fn wait(self) -> FetchResponse<T> {
        let outcome = match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => FetchOutcome::Aborted,
            Err(e) => FetchOutcome::Failed(e.to_string()),
        };
        drop(self.guard);
        FetchResponse {
            concern: self.concern,
            generation: self.generation,
            context: self.context,
            outcome,
        }
    }
}

struct Slot {
    generation: u64,
    token: CancellationToken,
}

pub struct RequestLifecycle {
    runner: Arc<dyn StatementRunner>,
    generation: u64,
    slots: HashMap<Concern, Slot>,
    discoveries: HashMap<NodeId, Slot>,
    /// Generation of the value fetch holding the guard; 0 when free
    value_owner: Arc<AtomicU64>,
}

impl RequestLifecycle {
    pub fn new(runner: Arc<dyn StatementRunner>) -> Self {
        Self {
            runner,
            generation: 0,
            slots: HashMap::new(),
            discoveries: HashMap::new(),
            value_owner: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn runner(&self) -> &Arc<dyn StatementRunner> {
        &self.runner
    }

    fn next_slot(&mut self) -> Slot {
        self.generation += 1;
        Slot {
            generation: self.generation,
            token: CancellationToken::new(),
        }
    }

    fn spawn(&self, batch: StatementBatch, token: CancellationToken) -> JoinHandle<FetchOutcome> {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let expected = batch.len();
            tokio::select! {
                biased;
                _ = token.cancelled() => FetchOutcome::Aborted,
                result = runner.run(batch) => match result {
                    Ok(response) => FetchOutcome::Completed(parse_results(&response, expected)),
                    Err(e) => FetchOutcome::Failed(format!("{:#}", e)),
                },
            }
        })
    }

    /// Issue `batch` for `concern`, cancelling the slot's previous request.
    pub fn issue<T>(&mut self, concern: Concern, batch: StatementBatch, context: T) -> PendingFetch<T> {
        let slot = self.next_slot();
        if let Some(previous) = self.slots.remove(&concern) {
            debug!(
                "Superseding {:?} request #{} with #{}",
                concern, previous.generation, slot.generation
            );
            previous.token.cancel();
        }

        let generation = slot.generation;
        let handle = self.spawn(batch, slot.token.clone());
        self.slots.insert(concern, slot);
        PendingFetch {
            concern,
            generation,
            context,
            handle,
            guard: None,
        }
    }

    /// Whether `generation` is the live request of `concern`.
    pub fn is_current(&self, concern: Concern, generation: u64) -> bool {
        self.slots
            .get(&concern)
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Decide whether a response may be merged, releasing its slot if so.
    ///
    /// Aborted and superseded responses are rejected. A current `Value`
    /// response also clears the busy guard, whether it completed or failed.
    pub fn accept<T>(&mut self, response: &FetchResponse<T>) -> bool {
        if response.outcome == FetchOutcome::Aborted {
            debug!(
                "Ignoring aborted {:?} request #{}",
                response.concern, response.generation
            );
            return false;
        }
        if !self.is_current(response.concern, response.generation) {
            debug!(
                "Ignoring superseded {:?} request #{}",
                response.concern, response.generation
            );
            return false;
        }

        self.slots.remove(&response.concern);
        if response.concern == Concern::Value {
            let _ = self.value_owner.compare_exchange(
                response.generation,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        true
    }

    // ========================================================================
    // Value fetch guard
    // ========================================================================

    /// Issue a value fetch under the busy guard, refusing while another
    /// one is pending.
    ///
    /// The guard is released when the response is accepted, when the
    /// returned fetch finishes waiting, or when it is dropped.
    pub fn issue_value_fetch<T>(
        &mut self,
        batch: StatementBatch,
        context: T,
    ) -> Result<PendingFetch<T>, GraphError> {
        if self.is_value_busy() {
            return Err(GraphError::ValueFetchInProgress);
        }

        let mut pending = self.issue(Concern::Value, batch, context);
        let token = self
            .slots
            .get(&Concern::Value)
            .map(|slot| slot.token.clone())
            .unwrap_or_default();
        self.value_owner.store(pending.generation, Ordering::Release);
        pending.guard = Some(ValueGuard {
            owner: self.value_owner.clone(),
            generation: pending.generation,
            token,
        });
        Ok(pending)
    }

    pub fn is_value_busy(&self) -> bool {
        self.value_owner.load(Ordering::Acquire) != 0
    }

    // ========================================================================
    // Relation discovery
    // ========================================================================

    /// Issue relation discovery for `node`. Other nodes' discoveries stay live.
    pub fn issue_discovery(&mut self, node: NodeId, batch: StatementBatch) -> PendingFetch<NodeId> {
        let slot = self.next_slot();
        if let Some(previous) = self.discoveries.remove(&node) {
            previous.token.cancel();
        }

        let generation = slot.generation;
        let handle = self.spawn(batch, slot.token.clone());
        self.discoveries.insert(node, slot);
        PendingFetch {
            concern: Concern::Relations,
            generation,
            context: node,
            handle,
            guard: None,
        }
    }

    pub fn accept_discovery(&mut self, response: &FetchResponse<NodeId>) -> bool {
        if response.outcome == FetchOutcome::Aborted {
            debug!("Ignoring aborted discovery for {}", response.context);
            return false;
        }
        let current = self
            .discoveries
            .get(&response.context)
            .is_some_and(|slot| slot.generation == response.generation);
        if !current {
            debug!("Ignoring superseded discovery for {}", response.context);
            return false;
        }
        self.discoveries.remove(&response.context);
        true
    }

    pub fn pending_discoveries(&self) -> usize {
        self.discoveries.len()
    }

    /// Cancel everything in flight and release the value guard.
    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.token.cancel();
        }
        for (_, slot) in self.discoveries.drain() {
            slot.token.cancel();
        }
        self.value_owner.store(0, Ordering::Release);
    }
}
