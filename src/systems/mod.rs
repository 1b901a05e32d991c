pub mod counters;
pub mod crossing;
pub mod side_classifier;
pub mod track_store;

use counters::{CounterAggregator, Counts};
use crossing::CrossingEvent;
use log::info;
use side_classifier::BoundaryLine;
use track_store::TrackStateStore;

use crate::{error::CounterError, tracking::Detection};

/// Everything one counting run owns. Nothing here is shared between runs,
/// so independent runs can happen side by side.
pub struct RunContext {
    line: BoundaryLine,
    track_store: TrackStateStore,
    counters: CounterAggregator,
}

impl RunContext {
    pub fn new(line: BoundaryLine) -> RunContext {
        info!(
            "Counting line {:?} with margin {}px",
            line.segment(),
            line.margin()
        );
        RunContext {
            line,
            track_store: TrackStateStore::new(),
            counters: CounterAggregator::new(),
        }
    }

    /// Run one detection through the crossing rule and, if it fires, the counters.
    pub fn process_detection(
        &mut self,
        detection: &Detection,
        frame_index: u64,
    ) -> Result<Option<CrossingEvent>, CounterError> {
        let event = crossing::process(&mut self.track_store, &self.line, detection, frame_index)?;
        if let Some(e) = &event {
            self.counters.apply(e);
        }
        Ok(event)
    }

    pub fn counts(&self) -> Counts {
        self.counters.snapshot()
    }

    pub fn line(&self) -> &BoundaryLine {
        &self.line
    }

    pub fn tracks(&self) -> &TrackStateStore {
        &self.track_store
    }
}
