//! Agreement store: instantiates templates into agreements.
//!
//! Creating an agreement also creates each of its conditions in the
//! condition store, as one all-or-nothing unit. Every precondition (active
//! template, matching lengths, no identifier collisions, a valid time
//! margin for every condition) is checked before anything is written, so
//! the commit step cannot fail halfway.
//!
//! Condition ids are reserved in the condition store's global namespace.
//! A collision with any earlier agreement's condition rejects the whole
//! agreement. The store never reuses an existing condition.

use crate::condition::{ConditionStoreManager, NewCondition};
use crate::config::StoreConfig;
use crate::errors::{log_rejection, Entity, LengthField, StoreError, StoreResult};
use crate::events::{EventLog, StoreEvent};
use crate::template::TemplateStoreManager;
use crate::types::{Address, BlockNumber, CallContext, Did, Id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// An instantiated template, bound to a concrete list of conditions.
///
/// Never updated after creation; its conditions change state independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Id,
    pub did: Did,
    pub template_id: Id,

    /// `condition_ids[i]` is bound to the template's `condition_types[i]`.
    pub condition_ids: Vec<Id>,
    pub time_locks: Vec<u64>,
    pub time_outs: Vec<u64>,

    pub creator: Address,
    pub block_number_created: BlockNumber,
}

/// Arguments for [`AgreementStoreManager::create_agreement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgreement {
    pub id: Id,
    pub did: Did,
    pub template_id: Id,
    pub condition_ids: Vec<Id>,
    pub time_locks: Vec<u64>,
    pub time_outs: Vec<u64>,
}

impl NewAgreement {
    pub fn new(
        id: Id,
        did: impl Into<Did>,
        template_id: Id,
        condition_ids: Vec<Id>,
        time_locks: Vec<u64>,
        time_outs: Vec<u64>,
    ) -> Self {
        Self {
            id,
            did: did.into(),
            template_id,
            condition_ids,
            time_locks,
            time_outs,
        }
    }
}

/// Addresses of the stores an agreement store was wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreWiring {
    pub condition_store: Address,
    pub template_store: Address,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    strict_template_length: bool,
    max_conditions: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for Limits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            strict_template_length: config.strict_template_length,
            max_conditions: config.max_conditions_per_agreement,
        }
    }
}

/// Owns every agreement known to the ledger.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgreementStoreManager {
    address: Address,

    owner: Address,

    wiring: Option<StoreWiring>,

    agreements: HashMap<Id, Agreement>,

    /// Creation order.
    agreement_ids: Vec<Id>,

    #[serde(skip)]
    limits: Limits,

    #[serde(skip)]
    events: Arc<EventLog>,
}

impl AgreementStoreManager {
    pub fn new(address: Address, owner: Address, events: Arc<EventLog>, config: &StoreConfig) -> Self {
        Self {
            address,
            owner,
            wiring: None,
            agreements: HashMap::new(),
            agreement_ids: Vec::new(),
            limits: Limits::from(config),
            events,
        }
    }

    pub(crate) fn attach(&mut self, events: Arc<EventLog>, config: &StoreConfig) {
        self.events = events;
        self.limits = Limits::from(config);
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn wiring(&self) -> Option<StoreWiring> {
        self.wiring
    }

    /// One-time wiring of the condition and template stores.
    pub fn initialize(
        &mut self,
        ctx: CallContext,
        condition_store: Address,
        template_store: Address,
    ) -> StoreResult<()> {
        let result = if self.wiring.is_some() {
            Err(StoreError::AlreadyInitialized)
        } else if ctx.sender != self.owner {
            Err(StoreError::unauthorized(ctx.sender, "initialize agreement store"))
        } else {
            self.wiring = Some(StoreWiring {
                condition_store,
                template_store,
            });
            tracing::debug!(
                store = %self.address,
                condition_store = %condition_store,
                template_store = %template_store,
                "agreement store initialized"
            );
            Ok(())
        };
        result.inspect_err(|e| log_rejection("initialize_agreement_store", &ctx.sender, e))
    }

    /// Create an agreement and all of its conditions, or nothing at all.
    ///
    /// `ctx.sender` becomes the agreement's creator. The conditions are
    /// created by this store on its own behalf.
    pub fn create_agreement(
        &mut self,
        ctx: CallContext,
        templates: &TemplateStoreManager,
        conditions: &mut ConditionStoreManager,
        request: NewAgreement,
    ) -> StoreResult<()> {
        let store_ctx = ctx.as_sender(self.address);
        let batch = self
            .validate_agreement(store_ctx, templates, conditions, &request)
            .inspect_err(|e| log_rejection("create_agreement", &ctx.sender, e))?;

        conditions.create_conditions(store_ctx, batch)?;

        let agreement = Agreement {
            id: request.id,
            did: request.did,
            template_id: request.template_id,
            condition_ids: request.condition_ids,
            time_locks: request.time_locks,
            time_outs: request.time_outs,
            creator: ctx.sender,
            block_number_created: ctx.block_number,
        };

        tracing::debug!(
            agreement = %agreement.id,
            did = %agreement.did,
            template = %agreement.template_id,
            conditions = agreement.condition_ids.len(),
            creator = %ctx.sender,
            block = ctx.block_number,
            "agreement created"
        );
        self.events
            .emit(StoreEvent::agreement_created(agreement.clone(), ctx.sender, ctx.block_number));
        self.agreement_ids.push(agreement.id);
        self.agreements.insert(agreement.id, agreement);
        Ok(())
    }

    /// Check every precondition and build the condition batch.
    fn validate_agreement(
        &self,
        store_ctx: CallContext,
        templates: &TemplateStoreManager,
        conditions: &ConditionStoreManager,
        request: &NewAgreement,
    ) -> StoreResult<Vec<NewCondition>> {
        let wiring = self.wiring.ok_or(StoreError::NotInitialized)?;
        if templates.address() != wiring.template_store {
            return Err(StoreError::unauthorized(
                templates.address(),
                "serve as template store",
            ));
        }
        if conditions.address() != wiring.condition_store {
            return Err(StoreError::unauthorized(
                conditions.address(),
                "serve as condition store",
            ));
        }

        if self.exists(&request.id) {
            return Err(StoreError::already_exists(Entity::Agreement, request.id));
        }

        let template = templates.active_template(&request.template_id)?;

        let n = request.condition_ids.len();
        if request.time_locks.len() != n {
            return Err(StoreError::length_mismatch(
                LengthField::TimeLocks,
                n,
                request.time_locks.len(),
            ));
        }
        if request.time_outs.len() != n {
            return Err(StoreError::length_mismatch(
                LengthField::TimeOuts,
                n,
                request.time_outs.len(),
            ));
        }
        // Every condition needs a type; lenient mode only allows binding a prefix.
        let type_mismatch = if self.limits.strict_template_length {
            template.len() != n
        } else {
            template.len() < n
        };
        if type_mismatch {
            return Err(StoreError::length_mismatch(
                LengthField::ConditionTypes,
                n,
                template.len(),
            ));
        }
        if self.limits.max_conditions != 0 && n > self.limits.max_conditions {
            return Err(StoreError::length_mismatch(
                LengthField::MaxConditions,
                n,
                self.limits.max_conditions,
            ));
        }

        let batch: Vec<NewCondition> = request
            .condition_ids
            .iter()
            .zip(&template.condition_types)
            .zip(request.time_locks.iter().zip(&request.time_outs))
            .map(|((id, type_ref), (lock, out))| NewCondition::new(*id, *type_ref, *lock, *out))
            .collect();

        conditions.validate_conditions(store_ctx, &batch)?;
        Ok(batch)
    }

    pub fn get_agreement(&self, id: &Id) -> StoreResult<&Agreement> {
        self.agreements
            .get(id)
            .ok_or(StoreError::not_found(Entity::Agreement, *id))
    }

    pub fn exists(&self, id: &Id) -> bool {
        self.agreements.contains_key(id)
    }

    pub fn agreement_count(&self) -> usize {
        self.agreement_ids.len()
    }

    pub(crate) fn latest_block(&self) -> BlockNumber {
        self.agreements
            .values()
            .map(|a| a.block_number_created)
            .max()
            .unwrap_or(0)
    }

    /// Agreement ids in creation order.
    pub fn agreement_ids(&self) -> &[Id] {
        &self.agreement_ids
    }

    /// Agreements concerning `did`, in creation order.
    pub fn agreement_ids_for_did(&self, did: &Did) -> Vec<Id> {
        self.ids_where(|a| a.did == *did)
    }

    /// Agreements instantiated from `template_id`, in creation order.
    pub fn agreement_ids_for_template(&self, template_id: &Id) -> Vec<Id> {
        self.ids_where(|a| a.template_id == *template_id)
    }

    fn ids_where(&self, pred: impl Fn(&Agreement) -> bool) -> Vec<Id> {
        self.agreement_ids
            .iter()
            .filter(|id| self.agreements.get(*id).is_some_and(&pred))
            .copied()
            .collect()
    }
}
