//! Client-facing projections and request payloads.
//!
//! The engine's consumers (public and admin routes) never see the raw
//! persisted blob: they receive a [`SpinStateView`], which drops the internal
//! `configHash`, optionally truncates the history lists, and adds derived
//! pool counts. Truncation is a presentation concern only; the engine itself
//! retains up to [`crate::HISTORY_LIMIT`] records.

use serde::{Deserialize, Serialize};

use crate::spin::{BuyersGiveawayState, PersistedSpinState, SpinRecord};

/// How many history / bulk-result records the public projection exposes.
pub const VIEW_HISTORY_LIMIT: usize = 20;

/// Projection of [`PersistedSpinState`] served to clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpinStateView {
    pub items: Vec<String>,
    pub pool: Vec<String>,
    pub selected_item: Option<String>,
    pub version: u64,
    pub updated_at: u64,
    pub is_offline: bool,
    pub is_testing_mode: bool,
    pub last_spin: Option<SpinRecord>,
    pub history: Vec<SpinRecord>,
    pub recent_bulk_results: Vec<SpinRecord>,
    pub buyers_giveaway: Option<BuyersGiveawayState>,
    pub current_buyers_giveaway_item: Option<String>,
    /// Derived: `pool.len()`.
    pub remaining_count: u64,
    /// Derived: `items.len()`.
    pub total_count: u64,
    /// Derived: remaining / total, in percent. Zero when the universe is empty.
    pub percent_remaining: f64,
}

impl SpinStateView {
    /// Public projection: history lists truncated to [`VIEW_HISTORY_LIMIT`].
    pub fn public_view(state: &PersistedSpinState) -> Self {
        Self::project(state, Some(VIEW_HISTORY_LIMIT))
    }

    /// Admin projection: full history, still no `configHash`.
    pub fn admin_view(state: &PersistedSpinState) -> Self {
        Self::project(state, None)
    }

    fn project(state: &PersistedSpinState, limit: Option<usize>) -> Self {
        let take = |records: &[SpinRecord]| -> Vec<SpinRecord> {
            match limit {
                Some(n) => records.iter().take(n).cloned().collect(),
                None => records.to_vec(),
            }
        };
        let total = state.items.len() as u64;
        let remaining = state.pool.len() as u64;
        let percent_remaining = if total == 0 {
            0.0
        } else {
            remaining as f64 / total as f64 * 100.0
        };
        Self {
            items: state.items.clone(),
            pool: state.pool.clone(),
            selected_item: state.selected_item.clone(),
            version: state.version,
            updated_at: state.updated_at,
            is_offline: state.is_offline,
            is_testing_mode: state.is_testing_mode,
            last_spin: state.last_spin.clone(),
            history: take(&state.history),
            recent_bulk_results: take(&state.recent_bulk_results),
            buyers_giveaway: state.buyers_giveaway.clone(),
            current_buyers_giveaway_item: state.current_buyers_giveaway_item.clone(),
            remaining_count: remaining,
            total_count: total,
            percent_remaining,
        }
    }
}

/// Body for a single draw.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRequest {
    pub auction_number: String,
    pub username: String,
}

/// Body for a bulk draw.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSpinRequest {
    pub auction_number_start: String,
    pub username: String,
    pub count: u32,
}

/// Body for the offline / testing-mode toggles.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFlagRequest {
    pub value: bool,
}

/// Body for setting the pending giveaway prize.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveawayItemRequest {
    pub name: String,
}

/// Body for running the giveaway; the item name falls back to the pending
/// prize when absent.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunGiveawayRequest {
    pub item_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_history(count: usize) -> PersistedSpinState {
        let mut state = PersistedSpinState::initial(
            vec!["Pack".to_string(); 4],
            "hash".to_string(),
            1,
        );
        for n in 0..count {
            state.push_history(SpinRecord {
                auction_number: n.to_string(),
                username: "alice".to_string(),
                item: "Pack".to_string(),
                spun_at: 1,
                version: n as u64 + 2,
            });
        }
        state
    }

    #[test]
    fn test_public_view_truncates_history() {
        let state = state_with_history(VIEW_HISTORY_LIMIT + 10);
        let view = SpinStateView::public_view(&state);
        assert_eq!(view.history.len(), VIEW_HISTORY_LIMIT);
        // Truncation keeps the newest records.
        assert_eq!(
            view.history[0].auction_number,
            (VIEW_HISTORY_LIMIT + 9).to_string()
        );

        let admin = SpinStateView::admin_view(&state);
        assert_eq!(admin.history.len(), VIEW_HISTORY_LIMIT + 10);
    }

    #[test]
    fn test_view_never_exposes_config_hash() {
        let state = state_with_history(1);
        let value: serde_json::Value = serde_json::from_str(
            &serde_json::to_string(&SpinStateView::public_view(&state)).unwrap(),
        )
        .unwrap();
        assert!(value.get("configHash").is_none());
        assert!(value.get("remainingCount").is_some());
    }

    #[test]
    fn test_percentages_derive_from_pool() {
        let mut state = state_with_history(0);
        state.pool.truncate(1);
        let view = SpinStateView::public_view(&state);
        assert_eq!(view.total_count, 4);
        assert_eq!(view.remaining_count, 1);
        assert!((view.percent_remaining - 25.0).abs() < f64::EPSILON);

        let empty = PersistedSpinState::default();
        assert_eq!(SpinStateView::public_view(&empty).percent_remaining, 0.0);
    }
}
