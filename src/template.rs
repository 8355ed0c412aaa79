//! Template store: reusable, ordered lists of condition types.
//!
//! Templates are never deleted. Revocation only stops new agreements
//! from being created against a template; existing ones are untouched.

use crate::errors::{log_rejection, Entity, StoreError, StoreResult};
use crate::events::{EventLog, StoreEvent};
use crate::types::{Address, BlockNumber, CallContext, Id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Template lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateState {
    Uninitialized,
    Active,
    Revoked,
}

impl std::fmt::Display for TemplateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// A reusable agreement shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: Id,

    /// Handler type for each condition slot, in order. Never empty, and
    /// fixed once the template exists.
    pub condition_types: Vec<Address>,

    pub state: TemplateState,

    pub creator: Address,

    pub block_number_updated: BlockNumber,

    pub last_updated_by: Address,
}

impl Template {
    /// Content-addressed id for a list of condition types.
    pub fn derive_id(condition_types: &[Address]) -> Id {
        Id::hash_of(condition_types.iter().map(Address::as_bytes))
    }

    pub fn is_active(&self) -> bool {
        self.state == TemplateState::Active
    }

    /// Number of conditions an agreement on this template binds.
    pub fn len(&self) -> usize {
        self.condition_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.condition_types.is_empty()
    }
}

/// Owns every template known to the ledger.
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateStoreManager {
    address: Address,

    /// Deploying identity; may revoke any template.
    owner: Address,

    templates: HashMap<Id, Template>,

    /// Creation order.
    template_ids: Vec<Id>,

    #[serde(skip)]
    events: Arc<EventLog>,
}

impl TemplateStoreManager {
    pub fn new(address: Address, owner: Address, events: Arc<EventLog>) -> Self {
        Self {
            address,
            owner,
            templates: HashMap::new(),
            template_ids: Vec::new(),
            events,
        }
    }

    pub(crate) fn attach_events(&mut self, events: Arc<EventLog>) {
        self.events = events;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Register a new template in the `Active` state, created by `ctx.sender`.
    pub fn create_template(
        &mut self,
        ctx: CallContext,
        id: Id,
        condition_types: Vec<Address>,
    ) -> StoreResult<()> {
        self.try_create_template(ctx, id, condition_types)
            .inspect_err(|e| log_rejection("create_template", &ctx.sender, e))
    }

    fn try_create_template(
        &mut self,
        ctx: CallContext,
        id: Id,
        condition_types: Vec<Address>,
    ) -> StoreResult<()> {
        if self.exists(&id) {
            return Err(StoreError::already_exists(Entity::Template, id));
        }
        if condition_types.is_empty() {
            return Err(StoreError::EmptyConditionTypes);
        }

        let template = Template {
            id,
            condition_types,
            state: TemplateState::Active,
            creator: ctx.sender,
            block_number_updated: ctx.block_number,
            last_updated_by: ctx.sender,
        };

        tracing::debug!(
            template = %id,
            condition_types = template.condition_types.len(),
            creator = %ctx.sender,
            block = ctx.block_number,
            "template created"
        );
        self.events
            .emit(StoreEvent::template_created(template.clone(), ctx.sender, ctx.block_number));
        self.templates.insert(id, template);
        self.template_ids.push(id);
        Ok(())
    }

    /// Revoke a template. Only its creator or the store owner may do this.
    pub fn revoke_template(&mut self, ctx: CallContext, id: Id) -> StoreResult<()> {
        self.try_revoke_template(ctx, id)
            .inspect_err(|e| log_rejection("revoke_template", &ctx.sender, e))
    }

    fn try_revoke_template(&mut self, ctx: CallContext, id: Id) -> StoreResult<()> {
        let owner = self.owner;
        let template = self
            .templates
            .get_mut(&id)
            .ok_or(StoreError::not_found(Entity::Template, id))?;

        if ctx.sender != template.creator && ctx.sender != owner {
            return Err(StoreError::unauthorized(
                ctx.sender,
                format!("revoke template {}", id),
            ));
        }
        if template.state == TemplateState::Revoked {
            return Err(StoreError::AlreadyRevoked(id));
        }

        template.state = TemplateState::Revoked;
        template.block_number_updated = ctx.block_number;
        template.last_updated_by = ctx.sender;

        tracing::debug!(template = %id, by = %ctx.sender, block = ctx.block_number, "template revoked");
        self.events
            .emit(StoreEvent::template_revoked(template.clone(), ctx.sender, ctx.block_number));
        Ok(())
    }

    pub fn get_template(&self, id: &Id) -> StoreResult<&Template> {
        self.templates
            .get(id)
            .ok_or(StoreError::not_found(Entity::Template, *id))
    }

    /// The template, provided it exists and is active.
    pub fn active_template(&self, id: &Id) -> StoreResult<&Template> {
        self.templates
            .get(id)
            .filter(|t| t.is_active())
            .ok_or(StoreError::TemplateMustExist(*id))
    }

    pub fn exists(&self, id: &Id) -> bool {
        self.templates.contains_key(id)
    }

    pub fn is_template_active(&self, id: &Id) -> bool {
        self.templates.get(id).is_some_and(Template::is_active)
    }

    pub fn template_count(&self) -> usize {
        self.template_ids.len()
    }

    /// Latest block at which any template was written.
    pub(crate) fn latest_block(&self) -> BlockNumber {
        self.templates
            .values()
            .map(|t| t.block_number_updated)
            .max()
            .unwrap_or(0)
    }

    /// Template ids in creation order.
    pub fn template_ids(&self) -> &[Id] {
        &self.template_ids
    }
}
