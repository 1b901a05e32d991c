use serde::{Deserialize, Serialize, de::IgnoredAny};

use crate::{
    Point2D, TrackId,
    error::MalformedReason,
    geometry_utils::{box_centroid, is_finite_box},
};

/// One tracker observation: a bounding box in `[x1, y1, x2, y2]` pixel
/// coordinates, and the track id if the tracker assigned one.
///
/// Decoding never fails on a bad id or box. The detection is kept and
/// [`validate`](Detection::validate) reports what was wrong with it, so one
/// bad record does not cost the rest of its frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "RawDetection")]
pub struct Detection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TrackId>,
    pub bbox: [f32; 4],
    #[serde(skip)]
    unreadable: Option<MalformedReason>,
}

/// A value that is kept even when it is not the expected type
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Read(T),
    Unreadable(IgnoredAny),
}

type RawBox = Lenient<Vec<Option<Lenient<f32>>>>;

/// Detection as it appears on the wire, before any checks
#[derive(Deserialize)]
struct RawDetection {
    #[serde(default)]
    id: Option<Lenient<TrackId>>,
    #[serde(default)]
    bbox: Option<RawBox>,
}

fn read_box(raw: Option<RawBox>) -> Result<[f32; 4], MalformedReason> {
    let Some(Lenient::Read(values)) = raw else {
        return Err(MalformedReason::UnreadableBox);
    };
    let values = values
        .into_iter()
        .map(|v| match v {
            Some(Lenient::Read(v)) => Ok(v),
            // null, which is also what NaN and Infinity literals are read as
            None => Ok(f32::NAN),
            Some(Lenient::Unreadable(_)) => Err(MalformedReason::UnreadableBox),
        })
        .collect::<Result<Vec<f32>, _>>()?;
    <[f32; 4]>::try_from(values).map_err(|_| MalformedReason::UnreadableBox)
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let (id, bad_id) = match raw.id {
            None => (None, None),
            Some(Lenient::Read(id)) => (Some(id), None),
            Some(Lenient::Unreadable(_)) => (None, Some(MalformedReason::UnreadableTrackId)),
        };
        let (bbox, bad_box) = match read_box(raw.bbox) {
            Ok(bbox) => (bbox, None),
            Err(reason) => ([0.; 4], Some(reason)),
        };
        Detection {
            id,
            bbox,
            unreadable: bad_id.or(bad_box),
        }
    }
}

impl Detection {
    pub fn new(id: TrackId, bbox: [f32; 4]) -> Self {
        Detection {
            id: Some(id),
            bbox,
            unreadable: None,
        }
    }

    pub fn untracked(bbox: [f32; 4]) -> Self {
        Detection {
            id: None,
            bbox,
            unreadable: None,
        }
    }

    /// A box of the given size centred on `position`
    #[cfg(test)]
    pub(crate) fn centred(id: TrackId, position: Point2D, width: f32, height: f32) -> Self {
        let (x, y) = position;
        Detection::new(
            id,
            [
                x - width / 2.,
                y - height / 2.,
                x + width / 2.,
                y + height / 2.,
            ],
        )
    }

    pub fn centroid(&self) -> Point2D {
        box_centroid(&self.bbox)
    }

    /// Only detections with an id and sane geometry take part in counting
    pub fn validate(&self) -> Result<(TrackId, Point2D), MalformedReason> {
        if let Some(reason) = self.unreadable {
            return Err(reason);
        }
        let id = self.id.ok_or(MalformedReason::MissingTrackId)?;
        if !is_finite_box(&self.bbox) {
            return Err(MalformedReason::NonFiniteCoordinates);
        }
        let [x1, y1, x2, y2] = self.bbox;
        if x2 < x1 || y2 < y1 {
            return Err(MalformedReason::InvertedBox);
        }
        Ok((id, self.centroid()))
    }
}

/// All detections for one video frame, as produced by the upstream detector/tracker
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, detections: Vec<Detection>) -> Self {
        Frame {
            index,
            width,
            height,
            detections,
        }
    }
}
