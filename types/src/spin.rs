//! Durable spin state.
//!
//! [`PersistedSpinState`] is the single durable aggregate behind the live
//! prize-pool spinner. It is persisted as one JSON blob and read/written in
//! full on every operation. Field names in the serialized form are fixed:
//! existing stored blobs must continue to parse, so every field carries a
//! serde default and renames are explicit.

use serde::{Deserialize, Serialize};

/// Maximum number of spin records retained in [`PersistedSpinState::history`].
///
/// Older records fall off the end; the history is a bounded ring, not an
/// audit-proof ledger.
pub const HISTORY_LIMIT: usize = 200;

/// Provenance record for a single draw.
///
/// Immutable once created. `version` is the state version produced by the
/// draw, letting polling clients correlate a record with the state snapshot
/// that contained it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpinRecord {
    pub auction_number: String,
    pub username: String,
    pub item: String,
    /// Epoch milliseconds.
    pub spun_at: u64,
    pub version: u64,
}

/// Snapshot of one buyer's-giveaway outcome.
///
/// The winner is drawn from the usernames in `history` at draw time, entry
/// per spin (repeat spinners get proportionally more entries).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuyersGiveawayState {
    pub item_name: String,
    pub winner_username: String,
    /// Number of history entries the winner was drawn from.
    pub source_entry_count: u64,
    /// Epoch milliseconds.
    pub ran_at: u64,
    pub version: u64,
}

/// The sole durable aggregate: the item universe, the remaining pool, and
/// all draw bookkeeping.
///
/// Invariants maintained by the engine:
/// - `pool` is always a sub-multiset of `items` (no entry may appear more
///   times in `pool` than in `items`);
/// - `version` strictly increases by one per mutating operation;
/// - `history` is newest-first and never longer than [`HISTORY_LIMIT`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSpinState {
    /// Canonical expanded pool as of the last reconciliation. Duplicates are
    /// distinct drawable units sharing a display name.
    pub items: Vec<String>,
    /// Remaining drawable units.
    pub pool: Vec<String>,
    /// Last item drawn, across single and bulk draws.
    pub selected_item: Option<String>,
    pub version: u64,
    /// Epoch milliseconds of the last mutation.
    pub updated_at: u64,
    /// Content hash of `items` at last reconciliation; detects catalog drift.
    pub config_hash: String,
    /// Staff-controlled flag hiding the public view.
    pub is_offline: bool,
    /// Suspends the auction-number-uniqueness constraint (rehearsal mode).
    pub is_testing_mode: bool,
    /// Most recent single draw.
    pub last_spin: Option<SpinRecord>,
    /// Past draws, newest-first, bounded by [`HISTORY_LIMIT`].
    pub history: Vec<SpinRecord>,
    /// The most recent bulk-draw batch, replaced wholesale per bulk draw.
    pub recent_bulk_results: Vec<SpinRecord>,
    /// Result of the last giveaway sub-draw.
    pub buyers_giveaway: Option<BuyersGiveawayState>,
    /// Staff-set prize name awaiting a giveaway draw.
    pub current_buyers_giveaway_item: Option<String>,
}

impl PersistedSpinState {
    /// Fresh state seeded from an expanded catalog list.
    pub fn initial(items: Vec<String>, config_hash: String, now_ms: u64) -> Self {
        Self {
            pool: items.clone(),
            items,
            version: 1,
            updated_at: now_ms,
            config_hash,
            ..Self::default()
        }
    }

    /// Prepend a record and truncate to the bounded length.
    pub fn push_history(&mut self, record: SpinRecord) {
        self.history.insert(0, record);
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Auction numbers are compared case-insensitively.
    pub fn history_contains_auction(&self, auction_number: &str) -> bool {
        let needle = auction_number.trim().to_ascii_lowercase();
        self.history
            .iter()
            .any(|record| record.auction_number.to_ascii_lowercase() == needle)
    }
}
