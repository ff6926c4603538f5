//! The spin-state engine.
//!
//! [`SpinEngine`] owns the persisted aggregate for one state key: it
//! reconciles the stored pool against the catalog before every operation,
//! performs uniform draws without replacement, records auction provenance,
//! and runs the buyer's-giveaway sub-draw over accumulated history.
//!
//! State only changes in response to an invoked operation; there is no
//! background scheduler. Each operation validates fully before its first
//! write, so rejections never leave partial effects.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::Rng;
use tracing::{info, warn};

use spindeck_types::{BuyersGiveawayState, PersistedSpinState, SpinRecord};

use crate::catalog::CatalogReader;
use crate::error::EngineError;
use crate::hash::hash_items;
use crate::store::StateStore;

/// Upper bound on draws per bulk spin.
pub const BULK_SPIN_MAX: u32 = 10;

/// Result of a bulk draw: the new state plus the per-draw records, so a
/// caller can render every result rather than just the last. The results
/// list is shorter than the requested count when the pool ran short.
#[derive(Clone, Debug)]
pub struct BulkSpinOutcome {
    pub state: PersistedSpinState,
    pub results: Vec<SpinRecord>,
}

/// Check that `pool` is a valid sub-multiset of `items`: no entry may occur
/// more times in the pool than in the universe.
pub fn is_pool_valid_for_items(pool: &[String], items: &[String]) -> bool {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for item in items {
        *counts.entry(item.as_str()).or_insert(0) += 1;
    }
    for entry in pool {
        match counts.get_mut(entry.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }
    true
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Uniform random index over `[0, len)`.
///
/// `OsRng` is a `CryptoRng`: every remaining entry has exactly equal
/// probability `1/len`. No weighting by rarity or value is applied; callers
/// rely on this for provenance.
fn draw_index(len: usize) -> usize {
    OsRng.gen_range(0..len)
}

/// The persisted spin-state machine for one state key.
///
/// Generic over its two collaborator seams: the catalog reader (the
/// authoritative item list) and the blob store (durability). The state key
/// is injected so multiple aggregates can coexist in one store.
pub struct SpinEngine<C, S> {
    catalog: C,
    store: S,
    state_key: String,
}

impl<C: CatalogReader, S: StateStore> SpinEngine<C, S> {
    pub fn new(catalog: C, store: S, state_key: impl Into<String>) -> Self {
        Self {
            catalog,
            store,
            state_key: state_key.into(),
        }
    }

    /// Read the stored blob, tolerating absence and corruption.
    ///
    /// A blob that fails to parse is reported as absent: reconciliation then
    /// rebuilds from the catalog, which is the same repair path used for a
    /// pool that diverged from the universe.
    async fn load_stored(&self) -> Result<Option<PersistedSpinState>, EngineError> {
        let Some(blob) = self.store.read(&self.state_key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<PersistedSpinState>(&blob) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(key = %self.state_key, %err, "stored spin state unparseable; rebuilding");
                Ok(None)
            }
        }
    }

    async fn persist(&self, state: &PersistedSpinState) -> Result<(), EngineError> {
        let blob = serde_json::to_string(state)?;
        self.store.write(&self.state_key, &blob).await?;
        Ok(())
    }

    /// Reconcile the stored state against the catalog.
    ///
    /// Called before every read and mutation. Synthesizes an initial state
    /// when none is stored; rebuilds the pool when the catalog hash drifted
    /// or the pool stopped being a sub-multiset of the universe. A rebuild
    /// preserves mode flags and all historical bookkeeping so catalog edits
    /// never erase the audit trail.
    pub async fn ensure_state(&self) -> Result<PersistedSpinState, EngineError> {
        let items = self.catalog.read_expanded_items()?;
        let config_hash = hash_items(&items);

        let Some(stored) = self.load_stored().await? else {
            let state = PersistedSpinState::initial(items, config_hash, now_ms());
            self.persist(&state).await?;
            info!(key = %self.state_key, items = state.items.len(), "seeded initial spin state");
            return Ok(state);
        };

        let hash_drifted = stored.config_hash != config_hash;
        let pool_invalid = !is_pool_valid_for_items(&stored.pool, &items);
        if !hash_drifted && !pool_invalid {
            return Ok(stored);
        }

        warn!(
            key = %self.state_key,
            hash_drifted,
            pool_invalid,
            "catalog drift detected; rebuilding pool"
        );
        let mut state = PersistedSpinState::initial(items, config_hash, now_ms());
        state.version = stored.version + 1;
        state.is_offline = stored.is_offline;
        state.is_testing_mode = stored.is_testing_mode;
        state.last_spin = stored.last_spin;
        state.history = stored.history;
        state.recent_bulk_results = stored.recent_bulk_results;
        state.buyers_giveaway = stored.buyers_giveaway;
        state.current_buyers_giveaway_item = stored.current_buyers_giveaway_item;
        self.persist(&state).await?;
        Ok(state)
    }

    /// Draw one item for an auction.
    ///
    /// An empty pool is a no-op success, not an error: the unchanged state
    /// comes back so callers can tell "nothing left" from a hard failure.
    pub async fn spin_once(
        &self,
        auction_number: &str,
        username: &str,
    ) -> Result<PersistedSpinState, EngineError> {
        let auction_number = auction_number.trim();
        if auction_number.is_empty() {
            return Err(EngineError::MissingAuctionNumber);
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::MissingUsername);
        }

        let mut state = self.ensure_state().await?;
        if !state.is_testing_mode && state.history_contains_auction(auction_number) {
            return Err(EngineError::DuplicateAuction {
                auction_number: auction_number.to_string(),
            });
        }
        if state.pool.is_empty() {
            return Ok(state);
        }

        let index = draw_index(state.pool.len());
        let item = state.pool.swap_remove(index);
        state.version += 1;
        state.updated_at = now_ms();
        let record = SpinRecord {
            auction_number: auction_number.to_string(),
            username: username.to_string(),
            item: item.clone(),
            spun_at: state.updated_at,
            version: state.version,
        };
        state.selected_item = Some(item);
        state.last_spin = Some(record.clone());
        state.push_history(record);
        self.persist(&state).await?;
        Ok(state)
    }

    /// Draw up to `count` items for sequential auction numbers.
    ///
    /// The duplicate check runs over the whole sequence before any draw, so
    /// the uniqueness constraint is all-or-nothing. The draw count clamps
    /// silently to the remaining pool; the returned results length signals
    /// the shortfall.
    pub async fn spin_bulk(
        &self,
        auction_number_start: &str,
        username: &str,
        count: u32,
    ) -> Result<BulkSpinOutcome, EngineError> {
        let start_raw = auction_number_start.trim();
        if start_raw.is_empty() {
            return Err(EngineError::MissingAuctionNumber);
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::MissingUsername);
        }
        let start = match start_raw.parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                return Err(EngineError::InvalidAuctionStart {
                    value: start_raw.to_string(),
                })
            }
        };
        if count < 1 || count > BULK_SPIN_MAX {
            return Err(EngineError::InvalidBulkCount {
                count,
                max: BULK_SPIN_MAX,
            });
        }

        let mut auction_numbers = Vec::with_capacity(count as usize);
        for offset in 0..count as u64 {
            let number = start.checked_add(offset).ok_or_else(|| {
                EngineError::InvalidAuctionStart {
                    value: start_raw.to_string(),
                }
            })?;
            auction_numbers.push(number.to_string());
        }

        let mut state = self.ensure_state().await?;
        if !state.is_testing_mode {
            for auction_number in &auction_numbers {
                if state.history_contains_auction(auction_number) {
                    return Err(EngineError::DuplicateAuction {
                        auction_number: auction_number.clone(),
                    });
                }
            }
        }
        if state.pool.is_empty() {
            return Ok(BulkSpinOutcome {
                state,
                results: Vec::new(),
            });
        }

        let draws = (count as usize).min(state.pool.len());
        let now = now_ms();
        let mut results = Vec::with_capacity(draws);
        for auction_number in auction_numbers.into_iter().take(draws) {
            let index = draw_index(state.pool.len());
            let item = state.pool.swap_remove(index);
            state.version += 1;
            let record = SpinRecord {
                auction_number,
                username: username.to_string(),
                item,
                spun_at: now,
                version: state.version,
            };
            state.push_history(record.clone());
            results.push(record);
        }
        state.updated_at = now;
        state.recent_bulk_results = results.clone();
        if let Some(last) = results.last() {
            state.selected_item = Some(last.item.clone());
            state.last_spin = Some(last.clone());
        }
        self.persist(&state).await?;
        Ok(BulkSpinOutcome { state, results })
    }

    /// Restore the full pool for a fresh round with the same catalog.
    /// History, flags, and giveaway state are untouched.
    pub async fn reset_spin_state(&self) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        state.pool = state.items.clone();
        state.selected_item = None;
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Rebuild from a caller-supplied item list after a catalog edit.
    ///
    /// Reads the stored blob directly, bypassing reconciliation: the catalog
    /// itself has just changed, and the caller's list is the new truth.
    /// Flags and historical bookkeeping carry over like any rebuild.
    pub async fn reset_spin_state_from_items(
        &self,
        new_items: Vec<String>,
    ) -> Result<PersistedSpinState, EngineError> {
        let stored = self.load_stored().await?.unwrap_or_default();
        let config_hash = hash_items(&new_items);
        let mut state = PersistedSpinState::initial(new_items, config_hash, now_ms());
        state.version = stored.version + 1;
        state.is_offline = stored.is_offline;
        state.is_testing_mode = stored.is_testing_mode;
        state.last_spin = stored.last_spin;
        state.history = stored.history;
        state.recent_bulk_results = stored.recent_bulk_results;
        state.buyers_giveaway = stored.buyers_giveaway;
        state.current_buyers_giveaway_item = stored.current_buyers_giveaway_item;
        self.persist(&state).await?;
        Ok(state)
    }

    /// Hard reset: restore the pool and wipe all historical bookkeeping.
    /// Irreversible; the UI layer gates this behind explicit confirmation.
    pub async fn reset_pool_and_clear_history(&self) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        state.pool = state.items.clone();
        state.selected_item = None;
        state.last_spin = None;
        state.history.clear();
        state.recent_bulk_results.clear();
        state.buyers_giveaway = None;
        state.current_buyers_giveaway_item = None;
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Mid-round audit wipe: clear history and draw bookkeeping but leave
    /// the pool where it is. The pending giveaway prize survives; it is
    /// staff intent, not history.
    pub async fn clear_spin_history(&self) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        state.selected_item = None;
        state.last_spin = None;
        state.history.clear();
        state.recent_bulk_results.clear();
        state.buyers_giveaway = None;
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Hide or show the public view.
    pub async fn set_public_offline(&self, value: bool) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        state.is_offline = value;
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Toggle testing mode, which suspends the auction-number-uniqueness
    /// constraint everywhere it is checked. Operators must surface this
    /// prominently; it exists for rehearsal and dry runs.
    pub async fn set_testing_mode(&self, value: bool) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        state.is_testing_mode = value;
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Announce the next giveaway prize. Does not touch the previous draw's
    /// result, so the last winner can stay on screen while the next prize is
    /// queued.
    pub async fn set_current_buyers_giveaway_item(
        &self,
        name: &str,
    ) -> Result<PersistedSpinState, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::BlankGiveawayItem);
        }
        let mut state = self.ensure_state().await?;
        state.current_buyers_giveaway_item = Some(name.to_string());
        state.version += 1;
        state.updated_at = now_ms();
        self.persist(&state).await?;
        Ok(state)
    }

    /// Run the buyer's giveaway over accumulated spin history.
    ///
    /// Entrants are the usernames of every history record, with multiplicity:
    /// repeat spinners get proportionally more entries, mirroring the
    /// per-spin entry model of the live auction. The pending prize is cleared
    /// on success so the next draw needs an explicit new prize.
    pub async fn run_buyers_giveaway(
        &self,
        item_name_override: Option<&str>,
    ) -> Result<PersistedSpinState, EngineError> {
        let mut state = self.ensure_state().await?;
        let override_name = item_name_override
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let item_name = match override_name {
            Some(name) => name.to_string(),
            None => state
                .current_buyers_giveaway_item
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or(EngineError::NoGiveawayItem)?
                .to_string(),
        };
        if state.history.is_empty() {
            return Err(EngineError::EmptyGiveawayHistory);
        }

        let entrants: Vec<&str> = state
            .history
            .iter()
            .map(|record| record.username.as_str())
            .collect();
        let winner = entrants[draw_index(entrants.len())].to_string();

        state.version += 1;
        state.updated_at = now_ms();
        state.buyers_giveaway = Some(BuyersGiveawayState {
            item_name,
            winner_username: winner,
            source_entry_count: entrants.len() as u64,
            ran_at: state.updated_at,
            version: state.version,
        });
        state.current_buyers_giveaway_item = None;
        self.persist(&state).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const KEY: &str = "spin-state";

    fn engine_with(
        items: Vec<&str>,
    ) -> (SpinEngine<Arc<StaticCatalog>, Arc<MemoryStore>>, Arc<StaticCatalog>, Arc<MemoryStore>)
    {
        let catalog = Arc::new(StaticCatalog::new(
            items.into_iter().map(String::from).collect(),
        ));
        let store = Arc::new(MemoryStore::new());
        let engine = SpinEngine::new(catalog.clone(), store.clone(), KEY);
        (engine, catalog, store)
    }

    #[test]
    fn test_sub_multiset_check() {
        let items: Vec<String> = ["Pack", "Pack", "Box"].map(String::from).to_vec();
        let ok: Vec<String> = ["Pack", "Box"].map(String::from).to_vec();
        let too_many: Vec<String> = ["Pack", "Pack", "Pack"].map(String::from).to_vec();
        let unknown: Vec<String> = ["Slab"].map(String::from).to_vec();
        assert!(is_pool_valid_for_items(&ok, &items));
        assert!(is_pool_valid_for_items(&items, &items));
        assert!(is_pool_valid_for_items(&[], &items));
        assert!(!is_pool_valid_for_items(&too_many, &items));
        assert!(!is_pool_valid_for_items(&unknown, &items));
    }

    #[tokio::test]
    async fn test_initial_state_seeds_from_catalog() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        let state = engine.ensure_state().await.unwrap();
        assert_eq!(state.items.len(), 3);
        assert_eq!(state.pool, state.items);
        assert_eq!(state.version, 1);
        assert!(state.history.is_empty());
        assert!(state.selected_item.is_none());

        // A second reconcile with nothing changed returns the stored state
        // without bumping the version.
        let again = engine.ensure_state().await.unwrap();
        assert_eq!(again.version, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_single_spin() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        let state = engine.spin_once("1", "alice").await.unwrap();
        assert_eq!(state.pool.len(), 2);
        assert_eq!(state.version, 2);
        assert_eq!(state.history.len(), 1);
        let selected = state.selected_item.clone().unwrap();
        assert!(selected == "Pack" || selected == "Box");
        assert_eq!(state.last_spin.as_ref().unwrap().auction_number, "1");
        assert_eq!(state.last_spin.as_ref().unwrap().version, 2);
        assert!(is_pool_valid_for_items(&state.pool, &state.items));

        // Reusing the auction number is rejected with no mutation.
        let err = engine.spin_once("1", "bob").await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAuction { .. }));
        let state = engine.ensure_state().await.unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.pool.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_check_is_case_insensitive_and_testing_mode_bypasses() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        engine.spin_once("A42", "alice").await.unwrap();
        let err = engine.spin_once("a42", "bob").await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAuction { .. }));

        engine.set_testing_mode(true).await.unwrap();
        let state = engine.spin_once("a42", "bob").await.unwrap();
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_spin_validation_rejects_blank_inputs() {
        let (engine, _, _) = engine_with(vec!["Pack"]);
        assert!(matches!(
            engine.spin_once("  ", "alice").await.unwrap_err(),
            EngineError::MissingAuctionNumber
        ));
        assert!(matches!(
            engine.spin_once("1", "  ").await.unwrap_err(),
            EngineError::MissingUsername
        ));
        // No mutation happened.
        assert_eq!(engine.ensure_state().await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_is_a_noop_success() {
        let (engine, _, _) = engine_with(vec!["Pack"]);
        engine.spin_once("1", "alice").await.unwrap();
        let drained = engine.ensure_state().await.unwrap();
        assert!(drained.pool.is_empty());

        let state = engine.spin_once("2", "bob").await.unwrap();
        assert_eq!(state.version, drained.version);
        assert_eq!(state.selected_item, drained.selected_item);
        assert_eq!(state.history.len(), 1);

        let outcome = engine.spin_bulk("10", "bob", 3).await.unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.state.version, drained.version);
    }

    #[tokio::test]
    async fn test_bulk_spin_draws_sequentially() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box", "Box", "Slab"]);
        let outcome = engine.spin_bulk("10", "carol", 3).await.unwrap();
        assert_eq!(outcome.results.len(), 3);
        let numbers: Vec<_> = outcome
            .results
            .iter()
            .map(|r| r.auction_number.clone())
            .collect();
        assert_eq!(numbers, vec!["10", "11", "12"]);
        assert_eq!(outcome.state.pool.len(), 2);
        assert_eq!(outcome.state.version, 4); // 1 + three draws
        assert_eq!(outcome.state.recent_bulk_results.len(), 3);
        assert_eq!(
            outcome.state.last_spin.as_ref().unwrap().auction_number,
            "12"
        );
        assert_eq!(
            outcome.state.selected_item.as_deref(),
            Some(outcome.results[2].item.as_str())
        );
        assert!(is_pool_valid_for_items(
            &outcome.state.pool,
            &outcome.state.items
        ));
    }

    #[tokio::test]
    async fn test_bulk_validation_is_all_or_nothing() {
        let (engine, _, _) = engine_with(vec!["Pack"; 8]);
        engine.spin_once("12", "alice").await.unwrap();
        let before = engine.ensure_state().await.unwrap();

        // 10..15 collides with existing auction 12: zero draws happen.
        let err = engine.spin_bulk("10", "bob", 5).await.unwrap_err();
        match err {
            EngineError::DuplicateAuction { auction_number } => {
                assert_eq!(auction_number, "12")
            }
            other => panic!("unexpected error: {other}"),
        }
        let after = engine.ensure_state().await.unwrap();
        assert_eq!(after.pool.len(), before.pool.len());
        assert_eq!(after.version, before.version);

        // Testing mode suspends the pre-check entirely.
        engine.set_testing_mode(true).await.unwrap();
        let outcome = engine.spin_bulk("10", "bob", 5).await.unwrap();
        assert_eq!(outcome.results.len(), 5);
    }

    #[tokio::test]
    async fn test_bulk_clamps_to_remaining_pool() {
        let (engine, _, _) = engine_with(vec!["Pack", "Box"]);
        let outcome = engine.spin_bulk("1", "alice", 10).await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.state.pool.is_empty());
        assert_eq!(outcome.state.recent_bulk_results.len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_input_validation() {
        let (engine, _, _) = engine_with(vec!["Pack"]);
        assert!(matches!(
            engine.spin_bulk("abc", "alice", 2).await.unwrap_err(),
            EngineError::InvalidAuctionStart { .. }
        ));
        assert!(matches!(
            engine.spin_bulk("0", "alice", 2).await.unwrap_err(),
            EngineError::InvalidAuctionStart { .. }
        ));
        assert!(matches!(
            engine.spin_bulk("1", "alice", 0).await.unwrap_err(),
            EngineError::InvalidBulkCount { .. }
        ));
        assert!(matches!(
            engine.spin_bulk("1", "alice", 11).await.unwrap_err(),
            EngineError::InvalidBulkCount { .. }
        ));
        assert!(matches!(
            engine.spin_bulk("  ", "alice", 2).await.unwrap_err(),
            EngineError::MissingAuctionNumber
        ));
    }

    #[tokio::test]
    async fn test_reconciliation_rebuilds_on_catalog_change_preserving_bookkeeping() {
        let (engine, catalog, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        engine.set_public_offline(true).await.unwrap();
        engine.spin_once("1", "alice").await.unwrap();
        engine.spin_once("2", "bob").await.unwrap();
        engine.spin_once("3", "carol").await.unwrap();
        let before = engine.ensure_state().await.unwrap();
        assert_eq!(before.history.len(), 3);

        // Staff edits the catalog: new universe, hash drifts.
        catalog.set_items(vec!["Slab".to_string(), "Slab".to_string()]);
        let state = engine.ensure_state().await.unwrap();
        assert_eq!(state.items, vec!["Slab", "Slab"]);
        assert_eq!(state.pool, state.items);
        assert_eq!(state.history.len(), 3);
        assert!(state.is_offline);
        assert!(state.selected_item.is_none());
        assert_eq!(state.version, before.version + 1);
        // Last spin provenance survives the rebuild.
        assert_eq!(state.last_spin.as_ref().unwrap().auction_number, "3");
    }

    #[tokio::test]
    async fn test_reconciliation_repairs_invalid_pool() {
        let (engine, _, store) = engine_with(vec!["Pack", "Box"]);
        let mut state = engine.ensure_state().await.unwrap();
        // Simulate external corruption: pool holds an entry not in the
        // universe.
        state.pool = vec!["Slab".to_string()];
        store
            .write(KEY, &serde_json::to_string(&state).unwrap())
            .await
            .unwrap();

        let repaired = engine.ensure_state().await.unwrap();
        assert_eq!(repaired.pool, repaired.items);
        assert_eq!(repaired.version, state.version + 1);
    }

    #[tokio::test]
    async fn test_reconciliation_rebuilds_unparseable_blob() {
        let (engine, _, store) = engine_with(vec!["Pack"]);
        store.write(KEY, "{not json").await.unwrap();
        let state = engine.ensure_state().await.unwrap();
        assert_eq!(state.pool, vec!["Pack"]);
        assert_eq!(state.version, 1);
    }

    #[tokio::test]
    async fn test_legacy_blob_passes_through_reconciliation() {
        let (engine, catalog, store) = engine_with(vec!["Pack", "Pack"]);
        // A legacy blob with the right hash but missing optional fields.
        let items = vec!["Pack".to_string(), "Pack".to_string()];
        catalog.set_items(items.clone());
        let blob = format!(
            r#"{{"items":["Pack","Pack"],"pool":["Pack"],"version":7,"configHash":"{}"}}"#,
            hash_items(&items)
        );
        store.write(KEY, &blob).await.unwrap();

        let state = engine.ensure_state().await.unwrap();
        assert_eq!(state.version, 7);
        assert_eq!(state.pool.len(), 1);
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_reset_restores_pool_and_keeps_history() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        engine.spin_once("1", "alice").await.unwrap();
        let before = engine.ensure_state().await.unwrap();

        let state = engine.reset_spin_state().await.unwrap();
        assert_eq!(state.pool, state.items);
        assert!(state.selected_item.is_none());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.version, before.version + 1);
    }

    #[tokio::test]
    async fn test_reset_from_items_rebuilds_and_carries_bookkeeping() {
        let (engine, catalog, _) = engine_with(vec!["Pack", "Box"]);
        engine.set_testing_mode(true).await.unwrap();
        engine.spin_once("1", "alice").await.unwrap();
        let before = engine.ensure_state().await.unwrap();

        let new_items = vec!["Slab".to_string(); 3];
        // The catalog collaborator has already been updated by the caller.
        catalog.set_items(new_items.clone());
        let state = engine
            .reset_spin_state_from_items(new_items.clone())
            .await
            .unwrap();
        assert_eq!(state.items, new_items);
        assert_eq!(state.pool, new_items);
        assert!(state.is_testing_mode);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.version, before.version + 1);

        // The stored hash now matches the edited catalog, so the next
        // reconcile is a no-op.
        let again = engine.ensure_state().await.unwrap();
        assert_eq!(again.version, state.version);
    }

    #[tokio::test]
    async fn test_hard_reset_wipes_everything() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack"]);
        engine.spin_once("1", "alice").await.unwrap();
        engine
            .set_current_buyers_giveaway_item("Bonus Pack")
            .await
            .unwrap();
        engine.run_buyers_giveaway(None).await.unwrap();

        let state = engine.reset_pool_and_clear_history().await.unwrap();
        assert_eq!(state.pool, state.items);
        assert!(state.history.is_empty());
        assert!(state.recent_bulk_results.is_empty());
        assert!(state.last_spin.is_none());
        assert!(state.selected_item.is_none());
        assert!(state.buyers_giveaway.is_none());
        assert!(state.current_buyers_giveaway_item.is_none());
    }

    #[tokio::test]
    async fn test_clear_history_leaves_pool_untouched() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack", "Box"]);
        engine.spin_once("1", "alice").await.unwrap();
        engine
            .set_current_buyers_giveaway_item("Bonus Pack")
            .await
            .unwrap();
        let before = engine.ensure_state().await.unwrap();
        assert_eq!(before.pool.len(), 2);

        let state = engine.clear_spin_history().await.unwrap();
        assert_eq!(state.pool.len(), 2);
        assert!(state.history.is_empty());
        assert!(state.last_spin.is_none());
        assert!(state.buyers_giveaway.is_none());
        // The pending prize is staff intent; it survives the wipe.
        assert_eq!(
            state.current_buyers_giveaway_item.as_deref(),
            Some("Bonus Pack")
        );
    }

    #[tokio::test]
    async fn test_toggles_bump_version() {
        let (engine, _, _) = engine_with(vec!["Pack"]);
        let v1 = engine.ensure_state().await.unwrap().version;
        let state = engine.set_public_offline(true).await.unwrap();
        assert!(state.is_offline);
        assert_eq!(state.version, v1 + 1);
        let state = engine.set_testing_mode(true).await.unwrap();
        assert!(state.is_testing_mode);
        assert_eq!(state.version, v1 + 2);
    }

    #[tokio::test]
    async fn test_giveaway_requires_prize_and_history() {
        let (engine, _, _) = engine_with(vec!["Pack"]);
        assert!(matches!(
            engine.run_buyers_giveaway(None).await.unwrap_err(),
            EngineError::NoGiveawayItem
        ));
        assert!(matches!(
            engine.run_buyers_giveaway(Some("  ")).await.unwrap_err(),
            EngineError::NoGiveawayItem
        ));
        // A prize but no history is still rejected.
        assert!(matches!(
            engine
                .run_buyers_giveaway(Some("Bonus Pack"))
                .await
                .unwrap_err(),
            EngineError::EmptyGiveawayHistory
        ));
        assert!(matches!(
            engine
                .set_current_buyers_giveaway_item("  ")
                .await
                .unwrap_err(),
            EngineError::BlankGiveawayItem
        ));
    }

    #[tokio::test]
    async fn test_giveaway_draws_and_clears_pending_prize() {
        let (engine, _, _) = engine_with(vec!["Pack", "Pack"]);
        engine.spin_once("1", "alice").await.unwrap();
        engine.spin_once("2", "bob").await.unwrap();
        engine
            .set_current_buyers_giveaway_item("Bonus Pack")
            .await
            .unwrap();

        let state = engine.run_buyers_giveaway(None).await.unwrap();
        let giveaway = state.buyers_giveaway.clone().unwrap();
        assert_eq!(giveaway.item_name, "Bonus Pack");
        assert!(giveaway.winner_username == "alice" || giveaway.winner_username == "bob");
        assert_eq!(giveaway.source_entry_count, 2);
        assert_eq!(giveaway.version, state.version);
        // Pending prize cleared: the next draw needs an explicit prize.
        assert!(state.current_buyers_giveaway_item.is_none());
        assert!(matches!(
            engine.run_buyers_giveaway(None).await.unwrap_err(),
            EngineError::NoGiveawayItem
        ));

        // An override works without a pending prize and leaves history alone.
        let state = engine.run_buyers_giveaway(Some("Sticker")).await.unwrap();
        assert_eq!(state.buyers_giveaway.unwrap().item_name, "Sticker");
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_draw_uniformity() {
        // Each of three distinct items should be drawn roughly a third of
        // the time; the tolerance is wide enough to be deterministic in
        // practice.
        let (engine, _, _) = engine_with(vec!["A", "B", "C"]);
        let trials = 3_000;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for n in 0..trials {
            let state = engine.spin_once(&format!("t{n}"), "alice").await.unwrap();
            *counts
                .entry(state.selected_item.clone().unwrap())
                .or_insert(0) += 1;
            engine.reset_spin_state().await.unwrap();
        }
        for item in ["A", "B", "C"] {
            let count = *counts.get(item).unwrap_or(&0);
            assert!(
                (800..=1_200).contains(&count),
                "item {item} drawn {count} times out of {trials}"
            );
        }
    }

    #[tokio::test]
    async fn test_giveaway_entrant_weighting() {
        // History [a, a, b]: "a" should win roughly twice as often as "b".
        let (engine, _, _) = engine_with(vec!["Pack"; 3]);
        engine.set_testing_mode(true).await.unwrap();
        engine.spin_once("1", "a").await.unwrap();
        engine.spin_once("2", "a").await.unwrap();
        engine.spin_once("3", "b").await.unwrap();

        let trials = 3_000;
        let mut a_wins = 0u32;
        for _ in 0..trials {
            let state = engine.run_buyers_giveaway(Some("Prize")).await.unwrap();
            if state.buyers_giveaway.unwrap().winner_username == "a" {
                a_wins += 1;
            }
        }
        // Expected ~2/3; accept anything clearly away from uniform.
        assert!(
            (1_800..=2_200).contains(&a_wins),
            "a won {a_wins} of {trials}"
        );
    }

    #[tokio::test]
    async fn test_version_is_monotonic_across_operations() {
        let (engine, _, _) = engine_with(vec!["Pack"; 6]);
        let mut last = engine.ensure_state().await.unwrap().version;
        let states = [
            engine.spin_once("1", "alice").await.unwrap(),
            engine.set_public_offline(true).await.unwrap(),
            engine.reset_spin_state().await.unwrap(),
            engine
                .set_current_buyers_giveaway_item("Prize")
                .await
                .unwrap(),
            engine.run_buyers_giveaway(None).await.unwrap(),
            engine.clear_spin_history().await.unwrap(),
        ];
        for state in states {
            assert_eq!(state.version, last + 1);
            last = state.version;
        }
        // A plain read does not move the version.
        assert_eq!(engine.ensure_state().await.unwrap().version, last);
    }
}
