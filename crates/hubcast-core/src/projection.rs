//! Client-side merged view of the latest count per geohash.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::events::{CellCount, DecodedEvent};

/// Display format for [`ClientProjection::display_timestamp`].
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Latest known count per cell for one stream connection.
///
/// Built empty when a stream opens and dropped when it closes. Merging is
/// last-write-wins per key in arrival order; event timestamps are not
/// compared, so a stale event applied after a fresher one overwrites it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientProjection {
    cells: HashMap<String, u64>,
    last_observed_at: Option<DateTime<Utc>>,
}

impl ClientProjection {
    /// Empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one event in place.
    pub fn apply(&mut self, event: &DecodedEvent) {
        match event {
            DecodedEvent::SingleUpdate {
                geohash,
                count,
                observed_at,
            } => {
                self.upsert(geohash, *count);
                self.last_observed_at = Some(*observed_at);
            }
            DecodedEvent::BulkUpdate { observed_at, items } => {
                for CellCount { geohash, count } in items {
                    self.upsert(geohash, *count);
                }
                self.last_observed_at = Some(*observed_at);
            }
        }
    }

    fn upsert(&mut self, geohash: &str, count: u64) {
        if let Some(slot) = self.cells.get_mut(geohash) {
            *slot = count;
        } else {
            let _ = self.cells.insert(geohash.to_owned(), count);
        }
    }

    /// Latest count for a cell.
    pub fn get(&self, geohash: &str) -> Option<u64> {
        self.cells.get(geohash).copied()
    }

    /// All cells.
    pub fn cells(&self) -> &HashMap<String, u64> {
        &self.cells
    }

    /// Number of distinct cells seen.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Timestamp of the most recently applied event.
    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    /// `last_observed_at` as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn display_timestamp(&self) -> Option<String> {
        self.last_observed_at
            .map(|ts| ts.format(DISPLAY_FORMAT).to_string())
    }

    /// Cells sorted by key, for stable output.
    pub fn sorted_cells(&self) -> Vec<(&str, u64)> {
        let mut cells: Vec<_> = self.cells.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        cells.sort_unstable_by(|a, b| a.0.cmp(b.0));
        cells
    }
}

/// Functional form of [`ClientProjection::apply`]; moves the projection through.
pub fn apply_event(mut projection: ClientProjection, event: &DecodedEvent) -> ClientProjection {
    projection.apply(event);
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn single(geohash: &str, count: u64, secs: i64) -> DecodedEvent {
        DecodedEvent::SingleUpdate {
            geohash: geohash.into(),
            count,
            observed_at: at(secs),
        }
    }

    fn bulk(secs: i64, items: &[(&str, u64)]) -> DecodedEvent {
        DecodedEvent::BulkUpdate {
            observed_at: at(secs),
            items: items.iter().map(|(g, c)| CellCount::new(*g, *c)).collect(),
        }
    }

    #[test]
    fn starts_empty() {
        let p = ClientProjection::new();
        assert!(p.is_empty());
        assert_eq!(p.last_observed_at(), None);
        assert_eq!(p.display_timestamp(), None);
    }

    #[test]
    fn single_update_upserts_and_stamps() {
        let p = apply_event(ClientProjection::new(), &single("u4pruydqqvj", 42, 100));
        assert_eq!(p.get("u4pruydqqvj"), Some(42));
        assert_eq!(p.len(), 1);
        assert_eq!(p.last_observed_at(), Some(at(100)));
    }

    #[test]
    fn bulk_then_single_merges() {
        let mut p = ClientProjection::new();
        p.apply(&bulk(100, &[("u1", 5), ("u2", 7)]));
        p.apply(&single("u1", 9, 101));
        assert_eq!(p.sorted_cells(), vec![("u1", 9), ("u2", 7)]);
        assert_eq!(p.last_observed_at(), Some(at(101)));
    }

    #[test]
    fn bulk_duplicate_keys_keep_the_last() {
        let p = apply_event(ClientProjection::new(), &bulk(5, &[("a", 1), ("a", 2)]));
        assert_eq!(p.get("a"), Some(2));
        assert_eq!(p.last_observed_at(), Some(at(5)));
    }

    #[test]
    fn empty_bulk_only_moves_the_timestamp() {
        let mut p = apply_event(ClientProjection::new(), &single("a", 1, 1));
        p.apply(&bulk(9, &[]));
        assert_eq!(p.get("a"), Some(1));
        assert_eq!(p.last_observed_at(), Some(at(9)));
    }

    #[test]
    fn repeated_single_update_is_idempotent() {
        let event = single("u4pru", 3, 50);
        let once = apply_event(ClientProjection::new(), &event);
        let twice = apply_event(once.clone(), &event);
        assert_eq!(once, twice);
    }

    #[test]
    fn stale_event_overwrites_fresher_one() {
        let mut p = ClientProjection::new();
        p.apply(&single("u1", 10, 200));
        p.apply(&single("u1", 4, 100));
        assert_eq!(p.get("u1"), Some(4));
        assert_eq!(p.last_observed_at(), Some(at(100)));
    }

    #[test]
    fn display_timestamp_format() {
        let event = decode("1700000000,u4pruydqqvj:3,u4prv:9", at(0)).unwrap();
        let p = apply_event(ClientProjection::new(), &event);
        assert_eq!(p.display_timestamp().as_deref(), Some("2023-11-14 22:13:20"));
        assert_eq!(p.get("u4prv"), Some(9));
    }
}
