//! Append-only event log for external indexers.
//!
//! Every committed mutation writes exactly one [`StoreEvent`] carrying the
//! full post-state of the record it touched, the acting identity and the
//! block number. The stores write to the log and never read it back.

use crate::agreement::Agreement;
use crate::condition::Condition;
use crate::template::Template;
use crate::types::{Address, BlockNumber, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

/// What happened, with the post-state of the affected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    TemplateCreated { template: Template },

    TemplateRevoked { template: Template },

    ConditionCreated { condition: Condition },

    ConditionUpdated { condition: Condition },

    AgreementCreated { agreement: Agreement },
}

impl EventKind {
    /// Snake-case name, as used in the serialized `event_type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TemplateCreated { .. } => "template_created",
            Self::TemplateRevoked { .. } => "template_revoked",
            Self::ConditionCreated { .. } => "condition_created",
            Self::ConditionUpdated { .. } => "condition_updated",
            Self::AgreementCreated { .. } => "agreement_created",
        }
    }

    /// Id of the record this event is about.
    pub fn subject(&self) -> Id {
        match self {
            Self::TemplateCreated { template } | Self::TemplateRevoked { template } => template.id,
            Self::ConditionCreated { condition } | Self::ConditionUpdated { condition } => {
                condition.id
            }
            Self::AgreementCreated { agreement } => agreement.id,
        }
    }
}

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub id: EventId,

    #[serde(flatten)]
    pub kind: EventKind,

    /// Identity that performed the mutation.
    pub actor: Address,

    /// Ledger position of the mutation.
    pub block_number: BlockNumber,

    pub timestamp: DateTime<Utc>,
}

impl StoreEvent {
    pub fn new(kind: EventKind, actor: Address, block_number: BlockNumber) -> Self {
        Self {
            id: EventId::new(),
            kind,
            actor,
            block_number,
            timestamp: Utc::now(),
        }
    }

    pub fn template_created(template: Template, actor: Address, block: BlockNumber) -> Self {
        Self::new(EventKind::TemplateCreated { template }, actor, block)
    }

    pub fn template_revoked(template: Template, actor: Address, block: BlockNumber) -> Self {
        Self::new(EventKind::TemplateRevoked { template }, actor, block)
    }

    pub fn condition_created(condition: Condition, actor: Address, block: BlockNumber) -> Self {
        Self::new(EventKind::ConditionCreated { condition }, actor, block)
    }

    pub fn condition_updated(condition: Condition, actor: Address, block: BlockNumber) -> Self {
        Self::new(EventKind::ConditionUpdated { condition }, actor, block)
    }

    pub fn agreement_created(agreement: Agreement, actor: Address, block: BlockNumber) -> Self {
        Self::new(EventKind::AgreementCreated { agreement }, actor, block)
    }
}

/// Filter for reading events back out of the log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event type names.
    pub event_types: Option<Vec<String>>,

    /// Filter by the id of the affected record.
    pub subject: Option<Id>,

    /// Filter by acting identity.
    pub actor: Option<Address>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, name: impl Into<String>) -> Self {
        self.event_types.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn about(mut self, subject: Id) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn by(mut self, actor: Address) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &StoreEvent) -> bool {
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == event.kind.name()) {
                return false;
            }
        }

        if let Some(subject) = &self.subject {
            if event.kind.subject() != *subject {
                return false;
            }
        }

        if let Some(actor) = &self.actor {
            if event.actor != *actor {
                return false;
            }
        }

        true
    }
}

/// Event receiver (broadcast channel).
pub type EventReceiver = broadcast::Receiver<StoreEvent>;

/// Event sender (broadcast channel).
pub type EventSender = broadcast::Sender<StoreEvent>;

/// Append-only event stream shared by all stores of one ledger.
pub struct EventLog {
    sender: EventSender,
    history: Mutex<Vec<StoreEvent>>,
}

impl EventLog {
    /// Create a log whose live subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            history: Mutex::new(Vec::new()),
        }
    }

    fn history(&self) -> MutexGuard<'_, Vec<StoreEvent>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and broadcast it.
    pub fn emit(&self, event: StoreEvent) {
        tracing::trace!(
            event_type = event.kind.name(),
            subject = %event.kind.subject(),
            block = event.block_number,
            "event emitted"
        );
        self.history().push(event.clone());

        // No subscribers is fine: the history keeps the record.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn len(&self) -> usize {
        self.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history().is_empty()
    }

    /// Full history, oldest first.
    pub fn entries(&self) -> Vec<StoreEvent> {
        self.history().clone()
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<StoreEvent> {
        self.history().iter().rev().take(limit).cloned().collect()
    }

    /// History entries matching `filter`, oldest first.
    pub fn matching(&self, filter: &EventFilter) -> Vec<StoreEvent> {
        self.history()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
