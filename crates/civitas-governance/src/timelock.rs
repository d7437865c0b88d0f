//! Delayed execution of approved actions.
//!
//! Operations are scheduled with a delay of at least `min_delay` and become
//! executable once it has passed. The delay itself can only change through a
//! self-call scheduled on this executor, so shortening it takes at least the
//! current delay. A self-expiring emergency pause blocks execution.

use std::collections::{HashMap, HashSet};

use borsh::{BorshDeserialize, BorshSerialize};
use civitas_crypto::IncrementalHasher;
use civitas_types::{Address, Amount, Hash, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{validate_delay, TimelockConfig};
use crate::error::{GovernanceError, Result};
use crate::events::{EventLog, GovernanceEvent};
use crate::guard::{Guarded, ReentrancyGuard};
use crate::pause::PauseState;
use crate::roles::{AccessControlled, Role, RoleStore};

/// Shortest allowed minimum delay (1 hour).
pub const MIN_DELAY: u64 = 3_600;
/// Longest allowed minimum delay (30 days).
pub const MAX_DELAY: u64 = 30 * 86_400;
/// Most calls in one batch.
pub const MAX_BATCH_SIZE: usize = 100;

const OPERATION_DOMAIN: &str = "civitas/timelock/operation";
const BATCH_DOMAIN: &str = "civitas/timelock/batch";
const SALT_DOMAIN: &str = "civitas/timelock/salt";

/// One action: a target, a value and an opaque payload.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Call {
    pub target: Address,
    pub value: Amount,
    pub payload: Vec<u8>,
}

impl Call {
    pub fn new(target: Address, value: Amount, payload: Vec<u8>) -> Self {
        Self {
            target,
            value,
            payload,
        }
    }

    /// Operation id: `blake3(target, value, payload, salt)`.
    pub fn operation_id(&self, salt: &Hash) -> Hash {
        let mut hasher = IncrementalHasher::with_domain(OPERATION_DOMAIN);
        self.hash_into(&mut hasher);
        hasher.update(salt.as_bytes());
        hasher.finalize()
    }

    fn hash_into(&self, hasher: &mut IncrementalHasher) {
        hasher
            .update(self.target.as_bytes())
            .update_u128(self.value)
            .update_u64(self.payload.len() as u64)
            .update(&self.payload);
    }
}

/// Payloads the executor understands when it is the call target.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TimelockCall {
    /// Replace the minimum delay.
    UpdateDelay { new_delay: u64 },
}

impl TimelockCall {
    pub fn encode(&self) -> Result<Vec<u8>> {
        borsh::to_vec(self).map_err(|e| GovernanceError::MalformedPayload(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Self::try_from_slice(payload).map_err(|e| GovernanceError::MalformedPayload(e.to_string()))
    }
}

/// Runs calls whose target is not the executor itself.
pub trait ActionRunner {
    fn run(&mut self, call: &Call) -> anyhow::Result<()>;
}

/// Runner that records every call it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    pub calls: Vec<Call>,
    /// Calls to this target fail
    pub fail_target: Option<Address>,
}

impl ActionRunner for RecordingRunner {
    fn run(&mut self, call: &Call) -> anyhow::Result<()> {
        if self.fail_target == Some(call.target) {
            anyhow::bail!("call to {} reverted", call.target);
        }
        self.calls.push(call.clone());
        Ok(())
    }
}

/// Lifecycle of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Never scheduled, or cancelled
    Unset,
    /// Waiting for its delay
    Waiting,
    /// Executable
    Ready,
    /// Executed
    Done,
}

/// A scheduled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub call: Call,
    pub ready_at: Timestamp,
    pub done: bool,
}

/// Operations scheduled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: Hash,
    pub operations: Vec<Hash>,
    pub delay: u64,
    pub scheduled_at: Timestamp,
    pub ready_at: Timestamp,
    pub executed: bool,
}

/// Delayed-execution controller.
#[derive(Debug)]
pub struct TimelockExecutor {
    address: Address,
    min_delay: u64,
    pause: PauseState,
    operations: HashMap<Hash, Operation>,
    batches: HashMap<Hash, Batch>,
    roles: RoleStore,
    guard: ReentrancyGuard,
    events: EventLog,
}

impl Guarded for TimelockExecutor {
    fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl AccessControlled for TimelockExecutor {
    fn role_store(&self) -> &RoleStore {
        &self.roles
    }

    fn role_store_mut(&mut self) -> &mut RoleStore {
        &mut self.roles
    }

    fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }
}

impl TimelockExecutor {
    /// Create an executor administered by `admin`.
    pub fn new(admin: Address, config: &TimelockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address: Address::for_module("timelock"),
            min_delay: config.min_delay,
            pause: PauseState::self_expiring(config.pause_duration),
            operations: HashMap::new(),
            batches: HashMap::new(),
            roles: RoleStore::with_admin(admin),
            guard: ReentrancyGuard::new(),
            events: EventLog::new("timelock"),
        })
    }

    /// Schedule a single call.
    pub fn schedule(
        &mut self,
        caller: Address,
        call: Call,
        salt: Hash,
        delay: u64,
        now: Timestamp,
    ) -> Result<Hash> {
        self.roles.require(Role::Proposer, &caller)?;
        self.schedule_operation(call, salt, delay, now)
    }

    /// Schedule up to [`MAX_BATCH_SIZE`] calls as one unit.
    ///
    /// Each call becomes its own operation with a salt derived from `salt`
    /// and its index. The returned batch id is
    /// `blake3(calls, delay, now)`.
    pub fn schedule_batch(
        &mut self,
        caller: Address,
        calls: Vec<Call>,
        salt: Hash,
        delay: u64,
        now: Timestamp,
    ) -> Result<Hash> {
        self.roles.require(Role::Proposer, &caller)?;
        self.insert_batch(calls, salt, delay, now)
    }

    fn insert_batch(
        &mut self,
        calls: Vec<Call>,
        salt: Hash,
        delay: u64,
        now: Timestamp,
    ) -> Result<Hash> {
        if calls.is_empty() || calls.len() > MAX_BATCH_SIZE {
            return Err(GovernanceError::InvalidBatchSize {
                size: calls.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        let ready_at = self.ready_time(delay, now)?;

        let batch_id = batch_id(&calls, delay, now);
        if self.batches.contains_key(&batch_id) {
            return Err(GovernanceError::OperationAlreadyScheduled(batch_id));
        }

        // Check every operation before recording any of them.
        let mut ids = Vec::with_capacity(calls.len());
        let mut seen = HashSet::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            let id = call.operation_id(&derive_salt(&salt, index));
            if self.operations.contains_key(&id) || !seen.insert(id) {
                return Err(GovernanceError::OperationAlreadyScheduled(id));
            }
            ids.push(id);
        }

        for (id, call) in ids.iter().zip(calls) {
            self.insert_operation(*id, call, ready_at);
        }

        let operations = ids.len();
        self.batches.insert(
            batch_id,
            Batch {
                id: batch_id,
                operations: ids,
                delay,
                scheduled_at: now,
                ready_at,
                executed: false,
            },
        );
        info!(batch = %batch_id.short(), operations, ready_at, "Batch scheduled");
        self.events.emit(GovernanceEvent::BatchScheduled {
            batch_id,
            operations,
            ready_at,
        });
        Ok(batch_id)
    }

    /// Execute a ready operation.
    pub fn execute<R: ActionRunner>(
        &mut self,
        caller: Address,
        operation_id: Hash,
        runner: &mut R,
        now: Timestamp,
    ) -> Result<()> {
        self.roles.require(Role::Executor, &caller)?;
        self.guarded("execute", |this| {
            this.ensure_executable(now)?;
            this.check_ready(&operation_id, now)?;
            this.dispatch(&[operation_id], runner)
        })
    }

    /// Execute the pending operations of a batch.
    ///
    /// Each external call is marked done as soon as it succeeds, so a call is
    /// never delivered twice. After a failure, a retry resumes with the calls
    /// still pending. Self-calls are applied only once every external call of
    /// the batch has succeeded.
    pub fn execute_batch<R: ActionRunner>(
        &mut self,
        caller: Address,
        batch_id: Hash,
        runner: &mut R,
        now: Timestamp,
    ) -> Result<()> {
        self.roles.require(Role::Executor, &caller)?;
        self.guarded("execute_batch", |this| {
            this.ensure_executable(now)?;
            let batch = this
                .batches
                .get(&batch_id)
                .ok_or(GovernanceError::BatchNotFound(batch_id))?;
            if batch.executed {
                return Err(GovernanceError::OperationAlreadyDone(batch_id));
            }
            let total = batch.operations.len();
            let pending: Vec<Hash> = batch
                .operations
                .iter()
                .filter(|id| !this.is_operation_done(id))
                .copied()
                .collect();
            for id in &pending {
                this.check_ready(id, now)?;
            }
            if pending.len() < total {
                debug!(batch = %batch_id.short(), pending = pending.len(), total, "Resuming batch");
            }
            this.dispatch(&pending, runner)?;

            if let Some(batch) = this.batches.get_mut(&batch_id) {
                batch.executed = true;
            }
            info!(batch = %batch_id.short(), operations = total, "Batch executed");
            this.events.emit(GovernanceEvent::BatchExecuted {
                batch_id,
                operations: total,
            });
            Ok(())
        })
    }

    /// Drop a pending operation.
    pub fn cancel(&mut self, caller: Address, operation_id: Hash) -> Result<()> {
        self.roles.require(Role::Canceller, &caller)?;
        match self.operations.get(&operation_id) {
            None => return Err(GovernanceError::OperationNotFound(operation_id)),
            Some(op) if op.done => return Err(GovernanceError::OperationAlreadyDone(operation_id)),
            Some(_) => {}
        }
        self.operations.remove(&operation_id);
        info!(operation = %operation_id.short(), "Operation cancelled");
        self.events.emit(GovernanceEvent::OperationCancelled { operation_id });
        Ok(())
    }

    /// Schedule a self-call that replaces the minimum delay once executed.
    pub fn request_delay_update(
        &mut self,
        caller: Address,
        new_delay: u64,
        now: Timestamp,
    ) -> Result<Hash> {
        self.roles.require(Role::Admin, &caller)?;
        validate_delay(new_delay)?;

        let payload = TimelockCall::UpdateDelay { new_delay }.encode()?;
        let call = Call::new(self.address, 0, payload);
        let mut salt = IncrementalHasher::with_domain(SALT_DOMAIN);
        salt.update(b"delay").update_u64(now).update_u64(new_delay);
        let id = self.schedule_operation(call, salt.finalize(), self.min_delay, now)?;

        info!(operation = %id.short(), current = self.min_delay, requested = new_delay, "Delay update requested");
        Ok(id)
    }

    /// Pause execution until `now + pause_duration` or an explicit unpause.
    pub fn emergency_pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.pause(now)?;
        warn!(by = %caller, at = now, expires_at = ?self.pause.expires_at(), "Timelock paused");
        self.events.emit(GovernanceEvent::Paused { by: caller, at: now });
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.unpause()?;
        info!(by = %caller, at = now, "Timelock unpaused");
        self.events.emit(GovernanceEvent::Unpaused {
            by: Some(caller),
            at: now,
        });
        Ok(())
    }

    /// Clear an expired pause. Anyone may call this.
    pub fn auto_unpause(&mut self, now: Timestamp) -> Result<()> {
        self.pause.auto_unpause(now)?;
        info!(at = now, "Expired timelock pause cleared");
        self.events.emit(GovernanceEvent::Unpaused { by: None, at: now });
        Ok(())
    }

    pub fn operation_state(&self, operation_id: &Hash, now: Timestamp) -> OperationState {
        match self.operations.get(operation_id) {
            None => OperationState::Unset,
            Some(op) if op.done => OperationState::Done,
            Some(op) if now >= op.ready_at => OperationState::Ready,
            Some(_) => OperationState::Waiting,
        }
    }

    pub fn is_operation_ready(&self, operation_id: &Hash, now: Timestamp) -> bool {
        self.operation_state(operation_id, now) == OperationState::Ready
    }

    pub fn is_operation_done(&self, operation_id: &Hash) -> bool {
        self.operations.get(operation_id).is_some_and(|op| op.done)
    }

    pub fn operation(&self, operation_id: &Hash) -> Option<&Operation> {
        self.operations.get(operation_id)
    }

    pub fn batch(&self, batch_id: &Hash) -> Option<&Batch> {
        self.batches.get(batch_id)
    }

    pub fn min_delay(&self) -> u64 {
        self.min_delay
    }

    /// Whether execution is currently blocked by the emergency pause.
    pub fn is_paused(&self, now: Timestamp) -> bool {
        self.pause.is_active(now)
    }

    pub fn pause_state(&self) -> &PauseState {
        &self.pause
    }

    /// Own address; calls targeting it are applied internally.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<GovernanceEvent> {
        self.events.drain()
    }

    fn ready_time(&self, delay: u64, now: Timestamp) -> Result<Timestamp> {
        if delay < self.min_delay {
            return Err(GovernanceError::DelayBelowMinimum {
                delay,
                min: self.min_delay,
            });
        }
        now.checked_add(delay)
            .ok_or_else(|| GovernanceError::InvalidParameter(format!("delay {} overflows", delay)))
    }

    fn schedule_operation(
        &mut self,
        call: Call,
        salt: Hash,
        delay: u64,
        now: Timestamp,
    ) -> Result<Hash> {
        let ready_at = self.ready_time(delay, now)?;
        let id = call.operation_id(&salt);
        if self.operations.contains_key(&id) {
            return Err(GovernanceError::OperationAlreadyScheduled(id));
        }
        self.insert_operation(id, call, ready_at);
        Ok(id)
    }

    fn insert_operation(&mut self, id: Hash, call: Call, ready_at: Timestamp) {
        debug!(operation = %id.short(), to = %call.target, ready_at, "Operation scheduled");
        self.events.emit(GovernanceEvent::CallScheduled {
            operation_id: id,
            target: call.target,
            value: call.value,
            ready_at,
        });
        self.operations.insert(
            id,
            Operation {
                call,
                ready_at,
                done: false,
            },
        );
    }

    /// Lazily drop a lapsed pause, then refuse if one is still active.
    fn ensure_executable(&mut self, now: Timestamp) -> Result<()> {
        if self.pause.clear_if_expired(now) {
            info!(at = now, "Expired timelock pause cleared");
            self.events.emit(GovernanceEvent::Unpaused { by: None, at: now });
        }
        self.pause.ensure_not_paused(now)
    }

    fn check_ready(&self, operation_id: &Hash, now: Timestamp) -> Result<()> {
        let op = self
            .operations
            .get(operation_id)
            .ok_or(GovernanceError::OperationNotFound(*operation_id))?;
        if op.done {
            return Err(GovernanceError::OperationAlreadyDone(*operation_id));
        }
        if now < op.ready_at {
            return Err(GovernanceError::OperationNotReady {
                ready_at: op.ready_at,
            });
        }
        Ok(())
    }

    /// Run external calls in order, marking each done as it succeeds, then
    /// apply self-calls. Self-call payloads are checked before anything runs.
    fn dispatch<R: ActionRunner>(&mut self, ids: &[Hash], runner: &mut R) -> Result<()> {
        let mut external = Vec::with_capacity(ids.len());
        let mut internal = Vec::new();
        for id in ids {
            let op = self
                .operations
                .get(id)
                .ok_or(GovernanceError::OperationNotFound(*id))?;
            if op.call.target == self.address {
                let decoded = TimelockCall::decode(&op.call.payload)?;
                match &decoded {
                    TimelockCall::UpdateDelay { new_delay } => validate_delay(*new_delay)?,
                }
                internal.push((*id, decoded));
            } else {
                external.push((*id, op.call.clone()));
            }
        }

        for (id, call) in external {
            runner.run(&call).map_err(|e| {
                warn!(operation = %id.short(), error = %e, "Call failed");
                GovernanceError::ExecutionFailed(e.to_string())
            })?;
            self.mark_done(&id);
        }

        for (id, call) in internal {
            match call {
                TimelockCall::UpdateDelay { new_delay } => {
                    let old = self.min_delay;
                    self.min_delay = new_delay;
                    info!(old, new = new_delay, "Minimum delay updated");
                    self.events.emit(GovernanceEvent::DelayUpdated {
                        old,
                        new: new_delay,
                    });
                }
            }
            self.mark_done(&id);
        }
        Ok(())
    }

    fn mark_done(&mut self, id: &Hash) {
        if let Some(op) = self.operations.get_mut(id) {
            op.done = true;
            let (target, value) = (op.call.target, op.call.value);
            self.events.emit(GovernanceEvent::CallExecuted {
                operation_id: *id,
                target,
                value,
            });
        }
    }
}

/// Per-operation salt for the `index`th call of a batch.
fn derive_salt(salt: &Hash, index: usize) -> Hash {
    let mut hasher = IncrementalHasher::with_domain(SALT_DOMAIN);
    hasher.update(salt.as_bytes()).update_u64(index as u64);
    hasher.finalize()
}

fn batch_id(calls: &[Call], delay: u64, now: Timestamp) -> Hash {
    let mut hasher = IncrementalHasher::with_domain(BATCH_DOMAIN);
    hasher.update_u64(calls.len() as u64);
    for call in calls {
        call.hash_into(&mut hasher);
    }
    hasher.update_u64(delay).update_u64(now);
    hasher.finalize()
}
