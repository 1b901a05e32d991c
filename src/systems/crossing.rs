use log::info;
use serde::{Deserialize, Serialize};

use crate::{TrackId, error::CounterError, tracking::Detection};

use super::{
    side_classifier::{BoundaryLine, Side, classify},
    track_store::TrackStateStore,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Near side to Far side
    Inbound,
    /// Far side to Near side
    Outbound,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrossingEvent {
    pub direction: Direction,
    pub track_id: TrackId,
    pub frame_index: u64,
}

/// The crossing rule: a track fires only on the first transition away from
/// the side it was first seen on. Once its previous side differs from its
/// initial side it can never fire, even if it comes back and crosses again.
fn crossing_direction(initial: Side, prev: Side, current: Side) -> Option<Direction> {
    match (initial, prev, current) {
        (Side::Near, Side::Near, Side::Far) => Some(Direction::Inbound),
        (Side::Far, Side::Far, Side::Near) => Some(Direction::Outbound),
        _ => None,
    }
}

/// Feed one detection into the per-track state machine.
///
/// Returns `Ok(None)` for the first sighting of a track, for tracks that were
/// already counted, and for every observation that is not a qualifying
/// transition. A malformed detection is rejected before any state changes.
pub fn process(
    store: &mut TrackStateStore,
    line: &BoundaryLine,
    detection: &Detection,
    frame_index: u64,
) -> Result<Option<CrossingEvent>, CounterError> {
    let (track_id, centroid) =
        detection
            .validate()
            .map_err(|reason| CounterError::MalformedDetection {
                track_id: detection.id,
                frame_index,
                reason,
            })?;

    let (state, first_sighting) = store.get_or_create(track_id, &centroid, line, frame_index);
    if first_sighting {
        return Ok(None);
    }

    let prev = state.last_side();
    let current = classify(&centroid, line, true);

    let event = if state.counted() {
        None
    } else {
        crossing_direction(state.initial_side(), prev, current).map(|direction| {
            store.mark_counted(track_id);
            info!(
                "Track {} crossed {:?} in frame {} (y={:.1})",
                track_id, direction, frame_index, centroid.1
            );
            CrossingEvent {
                direction,
                track_id,
                frame_index,
            }
        })
    };

    store.update_last_side(track_id, current);
    Ok(event)
}
