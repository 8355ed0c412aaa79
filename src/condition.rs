//! Condition store: the authoritative set of conditions.
//!
//! Condition ids live in one flat namespace shared by every agreement.
//! Only the identity wired in through [`ConditionStoreManager::initialize`]
//! (the agreement store) may create conditions. State changes come from the
//! handler authorized for the condition's type reference and only ever
//! move forward:
//!
//! ```text
//! Unfulfilled ──► Fulfilled
//!      │
//!      └───────► Aborted
//! ```

use crate::access::{AccessControl, Action, HandlerRegistry};
use crate::epoch::{self, Epoch};
use crate::errors::{log_rejection, Entity, StoreError, StoreResult};
use crate::events::{EventLog, StoreEvent};
use crate::types::{Address, BlockNumber, CallContext, Id};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Condition lifecycle. `Fulfilled` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    /// Not created yet. Never stored.
    Uninitialized,
    Unfulfilled,
    Fulfilled,
    Aborted,
}

impl ConditionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Aborted)
    }

    /// Only `Unfulfilled -> Fulfilled` and `Unfulfilled -> Aborted` are allowed.
    pub fn can_transition_to(&self, next: ConditionState) -> bool {
        matches!(
            (self, next),
            (Self::Unfulfilled, Self::Fulfilled) | (Self::Unfulfilled, Self::Aborted)
        )
    }
}

impl std::fmt::Display for ConditionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Unfulfilled => write!(f, "unfulfilled"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A single time-windowed gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Id,

    /// Handler type governing fulfilment. Opaque to the store.
    pub type_ref: Address,

    pub state: ConditionState,

    /// Offset from `block_number_created` before which the condition is locked.
    pub time_lock: u64,

    /// Offset from `block_number_created` at which it times out; `0` for never.
    pub time_out: u64,

    pub block_number_created: BlockNumber,

    pub last_updated_by: Address,

    pub block_number_updated: BlockNumber,
}

impl Condition {
    pub fn epoch(&self) -> Epoch {
        Epoch::new(self.time_lock, self.time_out, self.block_number_created)
    }
}

/// Arguments for one condition creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCondition {
    pub id: Id,
    pub type_ref: Address,
    pub time_lock: u64,
    pub time_out: u64,
}

impl NewCondition {
    pub fn new(id: Id, type_ref: Address, time_lock: u64, time_out: u64) -> Self {
        Self {
            id,
            type_ref,
            time_lock,
            time_out,
        }
    }
}

fn default_access() -> Arc<dyn AccessControl> {
    Arc::new(HandlerRegistry::default())
}

/// Owns every condition known to the ledger.
#[derive(Serialize, Deserialize)]
pub struct ConditionStoreManager {
    address: Address,

    /// Deploying identity; the only one allowed to initialize.
    owner: Address,

    /// Sole identity allowed to create conditions, once initialized.
    create_role: Option<Address>,

    conditions: HashMap<Id, Condition>,

    /// Creation order.
    condition_ids: Vec<Id>,

    #[serde(skip)]
    events: Arc<EventLog>,

    #[serde(skip, default = "default_access")]
    access: Arc<dyn AccessControl>,
}

impl std::fmt::Debug for ConditionStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionStoreManager")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("create_role", &self.create_role)
            .field("conditions", &self.conditions.len())
            .finish_non_exhaustive()
    }
}

impl ConditionStoreManager {
    pub fn new(
        address: Address,
        owner: Address,
        events: Arc<EventLog>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            address,
            owner,
            create_role: None,
            conditions: HashMap::new(),
            condition_ids: Vec::new(),
            events,
            access,
        }
    }

    pub(crate) fn attach(&mut self, events: Arc<EventLog>, access: Arc<dyn AccessControl>) {
        self.events = events;
        self.access = access;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn create_role(&self) -> Option<Address> {
        self.create_role
    }

    /// One-time wiring of the identity allowed to create conditions.
    pub fn initialize(&mut self, ctx: CallContext, create_role: Address) -> StoreResult<()> {
        let result = if self.create_role.is_some() {
            Err(StoreError::AlreadyInitialized)
        } else if ctx.sender != self.owner {
            Err(StoreError::unauthorized(ctx.sender, "initialize condition store"))
        } else {
            self.create_role = Some(create_role);
            tracing::debug!(store = %self.address, create_role = %create_role, "condition store initialized");
            Ok(())
        };
        result.inspect_err(|e| log_rejection("initialize_condition_store", &ctx.sender, e))
    }

    /// Create one condition in the `Unfulfilled` state.
    pub fn create_condition(&mut self, ctx: CallContext, condition: NewCondition) -> StoreResult<()> {
        self.create_conditions(ctx, vec![condition])
    }

    /// Create a batch of conditions: either all of them or none.
    pub fn create_conditions(
        &mut self,
        ctx: CallContext,
        batch: Vec<NewCondition>,
    ) -> StoreResult<()> {
        self.validate_conditions(ctx, &batch)
            .inspect_err(|e| log_rejection("create_conditions", &ctx.sender, e))?;
        self.commit_conditions(ctx, batch);
        Ok(())
    }

    /// Check that `create_conditions(ctx, batch)` would succeed, without
    /// changing anything.
    pub fn validate_conditions(&self, ctx: CallContext, batch: &[NewCondition]) -> StoreResult<()> {
        match self.create_role {
            None => return Err(StoreError::NotInitialized),
            Some(role) if role != ctx.sender => {
                return Err(StoreError::unauthorized(ctx.sender, "create conditions"));
            }
            Some(_) => {}
        }

        let mut seen = HashSet::with_capacity(batch.len());
        for c in batch {
            if self.exists(&c.id) || !seen.insert(c.id) {
                return Err(StoreError::already_exists(Entity::Condition, c.id));
            }
            if !epoch::has_valid_margin(c.time_lock, c.time_out) {
                return Err(StoreError::InvalidTimeMargin {
                    id: c.id,
                    time_lock: c.time_lock,
                    time_out: c.time_out,
                });
            }
        }
        Ok(())
    }

    // Callers validate first; nothing in here can fail.
    fn commit_conditions(&mut self, ctx: CallContext, batch: Vec<NewCondition>) {
        for c in batch {
            let condition = Condition {
                id: c.id,
                type_ref: c.type_ref,
                state: ConditionState::Unfulfilled,
                time_lock: c.time_lock,
                time_out: c.time_out,
                block_number_created: ctx.block_number,
                last_updated_by: ctx.sender,
                block_number_updated: ctx.block_number,
            };
            tracing::debug!(
                condition = %c.id,
                type_ref = %c.type_ref,
                time_lock = c.time_lock,
                time_out = c.time_out,
                block = ctx.block_number,
                "condition created"
            );
            self.events
                .emit(StoreEvent::condition_created(condition.clone(), ctx.sender, ctx.block_number));
            self.conditions.insert(c.id, condition);
            self.condition_ids.push(c.id);
        }
    }

    /// Move a condition to `new_state`, acting as `ctx.sender`.
    ///
    /// Returns the state the condition was in before the call. Checks run in
    /// order: an id that was never created is `NotFound` (not
    /// `InvalidTransition`, even though it reads as `Uninitialized`), then the
    /// transition is checked, then the caller's authority.
    pub fn update_condition_state(
        &mut self,
        ctx: CallContext,
        id: Id,
        new_state: ConditionState,
    ) -> StoreResult<ConditionState> {
        self.try_update_condition_state(ctx, id, new_state)
            .inspect_err(|e| log_rejection("update_condition_state", &ctx.sender, e))
    }

    fn try_update_condition_state(
        &mut self,
        ctx: CallContext,
        id: Id,
        new_state: ConditionState,
    ) -> StoreResult<ConditionState> {
        let condition = self
            .conditions
            .get_mut(&id)
            .ok_or(StoreError::not_found(Entity::Condition, id))?;

        let previous = condition.state;
        if !previous.can_transition_to(new_state) {
            return Err(StoreError::InvalidTransition {
                id,
                from: previous,
                to: new_state,
            });
        }
        if !self
            .access
            .can(&ctx.sender, Action::UpdateConditionState, &condition.type_ref)
        {
            return Err(StoreError::unauthorized(
                ctx.sender,
                format!("{} {}", Action::UpdateConditionState, id),
            ));
        }

        condition.state = new_state;
        condition.last_updated_by = ctx.sender;
        condition.block_number_updated = ctx.block_number;

        tracing::debug!(
            condition = %id,
            from = %previous,
            to = %new_state,
            by = %ctx.sender,
            block = ctx.block_number,
            "condition state updated"
        );
        self.events
            .emit(StoreEvent::condition_updated(condition.clone(), ctx.sender, ctx.block_number));
        Ok(previous)
    }

    pub fn get_condition(&self, id: &Id) -> StoreResult<&Condition> {
        self.conditions
            .get(id)
            .ok_or(StoreError::not_found(Entity::Condition, *id))
    }

    pub fn exists(&self, id: &Id) -> bool {
        self.conditions.contains_key(id)
    }

    /// State of a condition; `Uninitialized` if it was never created.
    pub fn condition_state(&self, id: &Id) -> ConditionState {
        self.conditions
            .get(id)
            .map_or(ConditionState::Uninitialized, |c| c.state)
    }

    pub fn condition_type_ref(&self, id: &Id) -> StoreResult<Address> {
        self.get_condition(id).map(|c| c.type_ref)
    }

    pub fn condition_count(&self) -> usize {
        self.condition_ids.len()
    }

    /// Latest block at which any condition was created or updated.
    pub(crate) fn latest_block(&self) -> BlockNumber {
        self.conditions
            .values()
            .map(|c| c.block_number_created.max(c.block_number_updated))
            .max()
            .unwrap_or(0)
    }

    /// Condition ids in creation order.
    pub fn condition_ids(&self) -> &[Id] {
        &self.condition_ids
    }

    pub fn is_condition_time_locked(&self, id: &Id, now: BlockNumber) -> StoreResult<bool> {
        self.get_condition(id).map(|c| c.epoch().is_time_locked_at(now))
    }

    pub fn is_condition_timed_out(&self, id: &Id, now: BlockNumber) -> StoreResult<bool> {
        self.get_condition(id).map(|c| c.epoch().is_timed_out_at(now))
    }

    /// Whether the condition's time window is open at `now`.
    pub fn is_condition_actionable(&self, id: &Id, now: BlockNumber) -> StoreResult<bool> {
        self.get_condition(id).map(|c| c.epoch().is_valid_at(now))
    }
}
