//! Spindeck spin-state engine.
//!
//! This crate owns the persisted state machine behind the live prize-pool
//! spinner: the item universe and remaining pool, fair single and bulk draws,
//! auction provenance, the buyer's-giveaway sub-draw, and the reconciliation
//! that repairs the pool whenever the item catalog changes underneath it.
//!
//! ## Operation shape
//! Every operation is a short read-modify-write sequence: reconcile against
//! the catalog, validate inputs, mutate the aggregate, persist the whole blob
//! once, return the new state. Validation always happens before the first
//! write, so a rejected call leaves no partial effect.
//!
//! ## Concurrency
//! The store contract is whole-blob last-writer-wins with no transactions.
//! Two concurrent mutations can both read the same pool and the second write
//! clobbers the first. This is accepted under the single-operator deployment
//! assumption; hardening requires a version-conditioned write at the store
//! layer (see DESIGN.md).
//!
//! The primary entrypoint is [`SpinEngine`].

pub mod catalog;
pub mod engine;
pub mod error;
pub mod hash;
pub mod store;

pub use catalog::{expand_entries, CatalogEntry, CatalogError, CatalogReader, FileCatalog, StaticCatalog};
pub use engine::{is_pool_valid_for_items, BulkSpinOutcome, SpinEngine, BULK_SPIN_MAX};
pub use error::EngineError;
pub use hash::hash_items;
pub use store::{FileStore, MemoryStore, RedisStore, StateStore, StoreBackend, StoreError};
