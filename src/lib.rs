//! # Agreement Store
//!
//! Store layer for multi-party conditional agreements.
//!
//! A caller instantiates an agreement from a reusable template. The
//! agreement binds a fixed, ordered list of conditions, each with a time
//! lock (earliest activation) and a time out (deadline). This crate is the
//! invariant-enforcing layer underneath:
//!
//! - **TemplateStoreManager**: reusable ordered lists of condition types
//! - **ConditionStoreManager**: globally unique conditions with forward-only state
//! - **AgreementStoreManager**: atomic creation of an agreement and its conditions
//! - **epoch**: time-window checks for conditions
//! - **Ledger**: the host that owns the stores, orders calls and supplies the clock
//!
//! ## Guarantees
//!
//! - Condition ids are unique across all agreements; the first committer wins.
//! - Creating an agreement commits the agreement and all N conditions, or nothing.
//! - Conditions only move `Unfulfilled -> Fulfilled` or `Unfulfilled -> Aborted`.
//! - Every committed mutation writes one event with the record's post-state.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! agreement-store = "0.1"
//! ```
//!
//! ```rust
//! use agreement_store::prelude::*;
//!
//! let owner = Address::derive("owner");
//! let mut ledger = Ledger::with_owner(owner).unwrap();
//! ledger
//!     .create_template(owner, Id::from_u64(1), vec![Address::derive("access-condition")])
//!     .unwrap();
//! assert!(ledger.templates().is_template_active(&Id::from_u64(1)));
//! ```

pub mod access;
pub mod agreement;
pub mod condition;
pub mod config;
pub mod epoch;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod snapshot;
pub mod template;
pub mod types;

// Re-export everything in prelude for convenience
pub mod prelude {
    pub use crate::access::*;
    pub use crate::agreement::*;
    pub use crate::condition::*;
    pub use crate::config::*;
    pub use crate::epoch::Epoch;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::ledger::*;
    pub use crate::snapshot::*;
    pub use crate::template::*;
    pub use crate::types::*;
}

// Also re-export at crate root
pub use prelude::*;
