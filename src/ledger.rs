//! The host that owns the stores and serializes every call.
//!
//! Each mutating method takes `&mut self`, so calls are applied one at a
//! time in a single total order. A call commits in the current block;
//! the clock only moves when [`Ledger::advance`] is called.
//!
//! ```rust
//! use agreement_store::prelude::*;
//!
//! let owner = Address::derive("owner");
//! let mut ledger = Ledger::with_owner(owner).unwrap();
//!
//! let escrow = Address::derive("escrow-condition");
//! let template = Id::from_u64(1);
//! ledger.create_template(owner, template, vec![escrow]).unwrap();
//!
//! let agreement = NewAgreement::new(
//!     Id::from_u64(7),
//!     "did:example:asset",
//!     template,
//!     vec![Id::from_u64(70)],
//!     vec![0],
//!     vec![0],
//! );
//! ledger.create_agreement(owner, agreement).unwrap();
//!
//! ledger.fulfill_condition(escrow, Id::from_u64(70)).unwrap();
//! assert_eq!(
//!     ledger.conditions().condition_state(&Id::from_u64(70)),
//!     ConditionState::Fulfilled
//! );
//! ```

use crate::access::{AccessControl, HandlerRegistry};
use crate::agreement::{AgreementStoreManager, NewAgreement};
use crate::condition::{ConditionState, ConditionStoreManager};
use crate::config::StoreConfig;
use crate::errors::{StoreError, StoreResult};
use crate::events::{EventLog, EventReceiver};
use crate::snapshot::{LedgerSnapshot, SNAPSHOT_VERSION};
use crate::template::TemplateStoreManager;
use crate::types::{Address, BlockNumber, CallContext, Id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct LedgerStateRef<'a> {
    owner: Address,
    templates: &'a TemplateStoreManager,
    conditions: &'a ConditionStoreManager,
    agreements: &'a AgreementStoreManager,
}

#[derive(Deserialize)]
struct LedgerState {
    owner: Address,
    templates: TemplateStoreManager,
    conditions: ConditionStoreManager,
    agreements: AgreementStoreManager,
}

pub struct Ledger {
    owner: Address,
    block_number: BlockNumber,
    config: StoreConfig,
    events: Arc<EventLog>,
    templates: TemplateStoreManager,
    conditions: ConditionStoreManager,
    agreements: AgreementStoreManager,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("owner", &self.owner)
            .field("block_number", &self.block_number)
            .field("templates", &self.templates.template_count())
            .field("conditions", &self.conditions.condition_count())
            .field("agreements", &self.agreements.agreement_count())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Deploy the three stores at block 0 and wire them together.
    pub fn deploy(
        owner: Address,
        config: StoreConfig,
        access: Arc<dyn AccessControl>,
    ) -> StoreResult<Self> {
        let events = Arc::new(EventLog::new(config.event_capacity));
        let templates =
            TemplateStoreManager::new(store_address(&owner, "templates"), owner, events.clone());
        let mut conditions = ConditionStoreManager::new(
            store_address(&owner, "conditions"),
            owner,
            events.clone(),
            access,
        );
        let mut agreements = AgreementStoreManager::new(
            store_address(&owner, "agreements"),
            owner,
            events.clone(),
            &config,
        );

        let ctx = CallContext::new(owner, 0);
        agreements.initialize(ctx, conditions.address(), templates.address())?;
        conditions.initialize(ctx, agreements.address())?;

        tracing::info!(
            owner = %owner,
            templates = %templates.address(),
            conditions = %conditions.address(),
            agreements = %agreements.address(),
            "ledger deployed"
        );

        Ok(Self {
            owner,
            block_number: 0,
            config,
            events,
            templates,
            conditions,
            agreements,
        })
    }

    /// Deploy with the default config and a [`HandlerRegistry`] where each
    /// condition type handles itself.
    pub fn with_owner(owner: Address) -> StoreResult<Self> {
        Self::deploy(
            owner,
            StoreConfig::default(),
            Arc::new(HandlerRegistry::default()),
        )
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Move the clock forward by `blocks`. Returns the new block number.
    pub fn advance(&mut self, blocks: u64) -> BlockNumber {
        self.block_number = self.block_number.saturating_add(blocks);
        self.block_number
    }

    /// Move the clock to `block`; never moves it backwards.
    pub fn advance_to(&mut self, block: BlockNumber) -> BlockNumber {
        self.block_number = self.block_number.max(block);
        self.block_number
    }

    fn ctx(&self, sender: Address) -> CallContext {
        CallContext::new(sender, self.block_number)
    }

    pub fn create_template(
        &mut self,
        sender: Address,
        id: Id,
        condition_types: Vec<Address>,
    ) -> StoreResult<()> {
        let ctx = self.ctx(sender);
        self.templates.create_template(ctx, id, condition_types)
    }

    pub fn revoke_template(&mut self, sender: Address, id: Id) -> StoreResult<()> {
        let ctx = self.ctx(sender);
        self.templates.revoke_template(ctx, id)
    }

    pub fn create_agreement(&mut self, sender: Address, request: NewAgreement) -> StoreResult<()> {
        let ctx = self.ctx(sender);
        self.agreements
            .create_agreement(ctx, &self.templates, &mut self.conditions, request)
    }

    /// Returns the condition's previous state.
    pub fn update_condition_state(
        &mut self,
        sender: Address,
        id: Id,
        new_state: ConditionState,
    ) -> StoreResult<ConditionState> {
        let ctx = self.ctx(sender);
        self.conditions.update_condition_state(ctx, id, new_state)
    }

    pub fn fulfill_condition(&mut self, sender: Address, id: Id) -> StoreResult<ConditionState> {
        self.update_condition_state(sender, id, ConditionState::Fulfilled)
    }

    pub fn abort_condition(&mut self, sender: Address, id: Id) -> StoreResult<ConditionState> {
        self.update_condition_state(sender, id, ConditionState::Aborted)
    }

    /// Whether a condition's time window is open at the current block.
    pub fn is_condition_actionable(&self, id: &Id) -> StoreResult<bool> {
        self.conditions.is_condition_actionable(id, self.block_number)
    }

    pub fn templates(&self) -> &TemplateStoreManager {
        &self.templates
    }

    pub fn conditions(&self) -> &ConditionStoreManager {
        &self.conditions
    }

    pub fn agreements(&self) -> &AgreementStoreManager {
        &self.agreements
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Capture all store state at the current block.
    pub fn snapshot(&self) -> StoreResult<LedgerSnapshot> {
        let state = LedgerStateRef {
            owner: self.owner,
            templates: &self.templates,
            conditions: &self.conditions,
            agreements: &self.agreements,
        };
        let data = serde_json::to_vec(&state)?;
        tracing::debug!(block = self.block_number, bytes = data.len(), "ledger snapshot taken");
        Ok(LedgerSnapshot::seal(self.block_number, data))
    }

    /// Rebuild a ledger from a snapshot. The event log starts empty.
    pub fn restore(
        snapshot: &LedgerSnapshot,
        config: StoreConfig,
        access: Arc<dyn AccessControl>,
    ) -> StoreResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::SnapshotCorrupted(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        if !snapshot.verify() {
            return Err(StoreError::SnapshotCorrupted(
                "checksum verification failed".into(),
            ));
        }

        let LedgerState {
            owner,
            mut templates,
            mut conditions,
            mut agreements,
        } = serde_json::from_slice(&snapshot.data)?;

        let latest = templates
            .latest_block()
            .max(conditions.latest_block())
            .max(agreements.latest_block());
        if snapshot.block_number < latest {
            return Err(StoreError::SnapshotCorrupted(format!(
                "snapshot block {} precedes recorded block {}",
                snapshot.block_number, latest
            )));
        }

        let events = Arc::new(EventLog::new(config.event_capacity));
        templates.attach_events(events.clone());
        conditions.attach(events.clone(), access);
        agreements.attach(events.clone(), &config);

        tracing::info!(
            owner = %owner,
            block = snapshot.block_number,
            agreements = agreements.agreement_count(),
            "ledger restored from snapshot"
        );

        Ok(Self {
            owner,
            block_number: snapshot.block_number,
            config,
            events,
            templates,
            conditions,
            agreements,
        })
    }
}

fn store_address(owner: &Address, label: &str) -> Address {
    Address::derive(&format!("{}/{}", owner, label))
}
