//! Engine error taxonomy.
//!
//! Validation and constraint errors are raised before any mutation and name
//! the offending value so operators can correct the input and retry. Store
//! and catalog failures wrap the underlying error and propagate; the engine
//! never retries internally.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("auction number is required")]
    MissingAuctionNumber,

    #[error("username is required")]
    MissingUsername,

    #[error("auction number {auction_number} has already been spun; enable testing mode to reuse auction numbers")]
    DuplicateAuction { auction_number: String },

    #[error("starting auction number must be a positive integer, got {value:?}")]
    InvalidAuctionStart { value: String },

    #[error("bulk spin count must be between 1 and {max}, got {count}")]
    InvalidBulkCount { count: u32, max: u32 },

    #[error("giveaway item name must not be blank")]
    BlankGiveawayItem,

    #[error("no giveaway item set; pass an item name or set the current giveaway item first")]
    NoGiveawayItem,

    #[error("no spin history to draw giveaway entries from")]
    EmptyGiveawayHistory,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize spin state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuctionNumber => "MISSING_AUCTION_NUMBER",
            Self::MissingUsername => "MISSING_USERNAME",
            Self::DuplicateAuction { .. } => "DUPLICATE_AUCTION",
            Self::InvalidAuctionStart { .. } => "INVALID_AUCTION_START",
            Self::InvalidBulkCount { .. } => "INVALID_BULK_COUNT",
            Self::BlankGiveawayItem => "BLANK_GIVEAWAY_ITEM",
            Self::NoGiveawayItem => "NO_GIVEAWAY_ITEM",
            Self::EmptyGiveawayHistory => "EMPTY_HISTORY",
            Self::Catalog(_) => "CATALOG_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Serialize(_) => "SERIALIZE_ERROR",
        }
    }

    /// Whether the error is a rejected input (retryable by the operator)
    /// rather than an infrastructure failure.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Catalog(_) | Self::Store(_) | Self::Serialize(_)
        )
    }
}
