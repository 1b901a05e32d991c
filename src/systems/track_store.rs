use indexmap::IndexMap;
use log::debug;

use crate::{Point2D, TrackId};

use super::side_classifier::{BoundaryLine, Side, classify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackState {
    initial_side: Side,
    last_side: Side,
    counted: bool,
    first_frame: u64,
    last_frame: u64,
}

impl TrackState {
    fn new(side: Side, frame_index: u64) -> Self {
        TrackState {
            initial_side: side,
            last_side: side,
            counted: false,
            first_frame: frame_index,
            last_frame: frame_index,
        }
    }

    pub fn initial_side(&self) -> Side {
        self.initial_side
    }

    pub fn last_side(&self) -> Side {
        self.last_side
    }

    pub fn counted(&self) -> bool {
        self.counted
    }

    pub fn first_frame(&self) -> u64 {
        self.first_frame
    }

    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }
}

/// Per-run record of every track id seen so far, in first-seen order.
/// Entries are only ever added, never removed or reindexed.
#[derive(Debug, Default)]
pub struct TrackStateStore {
    tracks: IndexMap<TrackId, TrackState>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        TrackStateStore::default()
    }

    /// Returns the state for `track_id` and whether this call created it.
    /// A new track takes its initial side from the line alone (no margin).
    pub fn get_or_create(
        &mut self,
        track_id: TrackId,
        point: &Point2D,
        line: &BoundaryLine,
        frame_index: u64,
    ) -> (TrackState, bool) {
        if let Some(state) = self.tracks.get_mut(&track_id) {
            state.last_frame = frame_index;
            return (*state, false);
        }

        let side = classify(point, line, false);
        let state = TrackState::new(side, frame_index);
        debug!(
            "New track {} at {:?} starts on {:?} side (frame {})",
            track_id, point, side, frame_index
        );
        self.tracks.insert(track_id, state);
        (state, true)
    }

    pub fn update_last_side(&mut self, track_id: TrackId, side: Side) {
        if let Some(state) = self.tracks.get_mut(&track_id) {
            state.last_side = side;
        }
    }

    pub fn mark_counted(&mut self, track_id: TrackId) {
        if let Some(state) = self.tracks.get_mut(&track_id) {
            state.counted = true;
        }
    }

    pub fn is_counted(&self, track_id: TrackId) -> bool {
        self.tracks.get(&track_id).is_some_and(|s| s.counted)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn counted_len(&self) -> usize {
        self.tracks.values().filter(|s| s.counted).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_uses_no_margin() {
        let line = BoundaryLine::horizontal(300., 5.);
        let mut store = TrackStateStore::new();

        // 297 would be Far with the margin applied
        let (state, created) = store.get_or_create(1, &(0., 297.), &line, 0);
        assert!(created);
        assert_eq!(state.initial_side(), Side::Near);
        assert_eq!(state.last_side(), Side::Near);
        assert!(!state.counted());
    }

    #[test]
    fn test_existing_track_is_not_reclassified() {
        let line = BoundaryLine::horizontal(300., 5.);
        let mut store = TrackStateStore::new();
        store.get_or_create(1, &(0., 250.), &line, 0);

        let (state, created) = store.get_or_create(1, &(0., 400.), &line, 3);
        assert!(!created);
        assert_eq!(state.initial_side(), Side::Near);
        assert_eq!(state.first_frame(), 0);
        assert_eq!(state.last_frame(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_and_mark_counted() {
        let line = BoundaryLine::horizontal(300., 5.);
        let mut store = TrackStateStore::new();
        store.get_or_create(5, &(0., 250.), &line, 0);

        store.update_last_side(5, Side::Far);
        assert_eq!(store.get(5).unwrap().last_side(), Side::Far);
        assert_eq!(store.get(5).unwrap().initial_side(), Side::Near);

        assert!(!store.is_counted(5));
        store.mark_counted(5);
        store.mark_counted(5);
        assert!(store.is_counted(5));
        assert_eq!(store.counted_len(), 1);

        // unknown ids are simply ignored
        store.mark_counted(99);
        assert!(!store.is_counted(99));
        assert_eq!(store.len(), 1);
    }
}
