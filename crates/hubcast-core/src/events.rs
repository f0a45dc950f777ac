//! Decoded count updates.

use chrono::{DateTime, Utc};

/// One geohash cell and its occupancy count.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellCount {
    /// Opaque geohash cell key.
    pub geohash: String,
    /// Latest count for the cell.
    pub count: u64,
}

impl CellCount {
    /// Build a cell count.
    pub fn new(geohash: impl Into<String>, count: u64) -> Self {
        Self {
            geohash: geohash.into(),
            count,
        }
    }
}

/// A channel message after decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedEvent {
    /// `"<geohash>:<count>"`. Stamped with the receipt time.
    SingleUpdate {
        /// Cell key.
        geohash: String,
        /// Count for the cell.
        count: u64,
        /// When the relay received the message.
        observed_at: DateTime<Utc>,
    },
    /// `"<epochSeconds>,<geohash>:<count>,..."`. Items keep message order.
    BulkUpdate {
        /// Timestamp carried by the message.
        observed_at: DateTime<Utc>,
        /// Cell counts in the order they appeared.
        items: Vec<CellCount>,
    },
}

impl DecodedEvent {
    /// Timestamp the event is stamped with.
    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::SingleUpdate { observed_at, .. } | Self::BulkUpdate { observed_at, .. } => {
                *observed_at
            }
        }
    }

    /// Number of cells the event touches.
    pub fn cell_count(&self) -> usize {
        match self {
            Self::SingleUpdate { .. } => 1,
            Self::BulkUpdate { items, .. } => items.len(),
        }
    }

    /// Envelope type tag used on the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::SingleUpdate { .. } => "hub_count",
            Self::BulkUpdate { .. } => "hub_count_bulk",
        }
    }
}
