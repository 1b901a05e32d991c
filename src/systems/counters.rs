use serde::{Deserialize, Serialize};

use super::crossing::{CrossingEvent, Direction};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub in_count: u64,
    pub out_count: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.in_count + self.out_count
    }
}

/// Two running totals which only ever go up.
#[derive(Debug, Default)]
pub struct CounterAggregator {
    counts: Counts,
}

impl CounterAggregator {
    pub fn new() -> Self {
        CounterAggregator::default()
    }

    pub fn apply(&mut self, event: &CrossingEvent) {
        match event.direction {
            Direction::Inbound => self.counts.in_count += 1,
            Direction::Outbound => self.counts.out_count += 1,
        }
    }

    pub fn snapshot(&self) -> Counts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(direction: Direction, track_id: u64) -> CrossingEvent {
        CrossingEvent {
            direction,
            track_id,
            frame_index: 0,
        }
    }

    #[test]
    fn test_apply_and_snapshot() {
        let mut counters = CounterAggregator::new();
        assert_eq!(counters.snapshot(), Counts::default());

        counters.apply(&event(Direction::Inbound, 1));
        counters.apply(&event(Direction::Inbound, 2));
        counters.apply(&event(Direction::Outbound, 3));

        let counts = counters.snapshot();
        assert_eq!(counts.in_count, 2);
        assert_eq!(counts.out_count, 1);
        assert_eq!(counts.total(), 3);
        // reading does not change anything
        assert_eq!(counters.snapshot(), counts);
    }

    #[test]
    fn test_counts_serialise_camel_case() {
        let json = serde_json::to_string(&Counts {
            in_count: 4,
            out_count: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"inCount":4,"outCount":2}"#);
    }
}
