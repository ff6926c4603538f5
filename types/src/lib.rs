//! Common types used throughout spindeck.
//!
//! The durable aggregate ([`PersistedSpinState`]) and its provenance records
//! live in [`spin`]; the client-facing projections and request payloads live
//! in [`api`].

pub mod api;
pub mod spin;

pub use api::{
    BulkSpinRequest, GiveawayItemRequest, RunGiveawayRequest, SetFlagRequest, SpinRequest,
    SpinStateView,
};
pub use spin::{BuyersGiveawayState, PersistedSpinState, SpinRecord, HISTORY_LIMIT};
