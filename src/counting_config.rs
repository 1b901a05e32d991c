use std::fs;

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    systems::side_classifier::{BoundaryLine, LineOrientation},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CountingConfig {
    // -------- LINE SETTINGS
    /// Where to put the counting line, as a fraction of the frame height
    /// (or width, for a vertical line)
    pub line_position: f32,

    pub line_orientation: LineOrientation,

    /// Absolute line position in pixels; overrides linePosition when set
    pub line_absolute: Option<f32>,

    /// Pixel endpoints of an arbitrary line, e.g. `[[0, 400], [640, 200]]`.
    /// Overrides both other placements; Near is to the left when walking
    /// from lineStart to lineEnd.
    pub line_start: Option<Point2D>,
    pub line_end: Option<Point2D>,

    /// Hysteresis margin in pixels: how far past the line (towards the Near
    /// side) a point must be before it reads as Near again
    pub margin: f32,

    // -------- PIPELINE SETTINGS
    /// How many decoded frames may wait between the reader thread and the counter
    pub queue_capacity: usize,

    /// Stop after this many frames, even if the source has more
    pub max_frames: Option<u64>,

    // -------- STORAGE SETTINGS
    /// JSON-lines file where finished runs are recorded
    pub store_path: String,
}

impl Default for CountingConfig {
    fn default() -> Self {
        CountingConfig {
            line_position: 0.60,
            line_orientation: LineOrientation::Horizontal,
            line_absolute: None,
            line_start: None,
            line_end: None,
            margin: 5.,
            queue_capacity: 32,
            max_frames: None,
            store_path: String::from("./people_counter.jsonl"),
        }
    }
}

impl CountingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0. ..=1.).contains(&self.line_position) {
            return Err(anyhow!(
                "linePosition must be within [0;1], got {}",
                self.line_position
            ));
        }
        if !self.margin.is_finite() || self.margin < 0. {
            return Err(anyhow!("margin must be a non-negative number, got {}", self.margin));
        }
        if let Some(position) = self.line_absolute {
            if !position.is_finite() {
                return Err(anyhow!("lineAbsolute must be finite"));
            }
        }
        match (self.line_start, self.line_end) {
            (None, None) => {}
            (Some(start), Some(end)) => {
                if BoundaryLine::through(start, end, self.margin).is_none() {
                    return Err(anyhow!(
                        "lineStart {:?} and lineEnd {:?} do not make a line",
                        start,
                        end
                    ));
                }
            }
            _ => return Err(anyhow!("lineStart and lineEnd must be set together")),
        }
        Ok(())
    }

    /// The line for a source whose frames are `width` x `height` pixels
    pub fn boundary_for_frame(&self, width: u32, height: u32) -> BoundaryLine {
        if let (Some(start), Some(end)) = (self.line_start, self.line_end) {
            match BoundaryLine::through(start, end, self.margin) {
                Some(line) => return line,
                None => warn!("Ignoring degenerate lineStart/lineEnd; placing line by position"),
            }
        }
        match self.line_absolute {
            Some(position) => {
                BoundaryLine::at_position(self.line_orientation, position, self.margin)
            }
            None => BoundaryLine::from_fraction(
                self.line_orientation,
                self.line_position,
                width,
                height,
                self.margin,
            ),
        }
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, text)?;
        info!("Wrote config to file: {:?}", config_file_path);
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<CountingConfig> {
    match fs::read_to_string(config_file_path) {
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!(
                    "Counting config file not found at {}; using defaults",
                    config_file_path
                );
                Ok(CountingConfig::default())
            } else {
                Err(anyhow!(
                    "Failed to load counting config from {}: {}",
                    config_file_path,
                    e
                ))
            }
        }
        Ok(s) => {
            info!("Loaded counting config OK from \"{}\"", config_file_path);
            match serde_json::from_str::<CountingConfig>(&s) {
                Ok(loaded_config) => {
                    debug!("Config parsed data from file: {:?}", &loaded_config);
                    loaded_config.validate()?;
                    Ok(loaded_config)
                }
                Err(e) => Err(anyhow!("Failed to parse config data: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::side_classifier::{Side, classify};

    #[test]
    fn test_defaults() {
        let config = CountingConfig::default();
        assert_eq!(config.line_position, 0.60);
        assert_eq!(config.margin, 5.);
        assert!(config.validate().is_ok());

        let line = config.boundary_for_frame(640, 480);
        // 480 * 0.6 = 288
        assert_eq!(line.signed_distance(&(0., 288.)), 0.);
        assert_eq!(line.margin(), 5.);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: CountingConfig =
            serde_json::from_str(r#"{"margin": 8, "lineOrientation": "vertical"}"#).unwrap();
        assert_eq!(config.margin, 8.);
        assert_eq!(config.line_orientation, LineOrientation::Vertical);
        assert_eq!(config.line_position, 0.60);
        assert_eq!(config.queue_capacity, 32);

        let line = config.boundary_for_frame(1000, 480);
        assert_eq!(classify(&(591., 0.), &line, true), Side::Near);
        assert_eq!(classify(&(593., 0.), &line, true), Side::Far);
    }

    #[test]
    fn test_absolute_line_overrides_fraction() {
        let config = CountingConfig {
            line_absolute: Some(300.),
            ..Default::default()
        };
        let line = config.boundary_for_frame(640, 480);
        assert_eq!(line.signed_distance(&(0., 300.)), 0.);
    }

    #[test]
    fn test_two_point_line() {
        let config: CountingConfig = serde_json::from_str(
            r#"{"lineStart": [0, 400], "lineEnd": [640, 80], "lineAbsolute": 10}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        let line = config.boundary_for_frame(640, 480);
        assert_eq!(line.segment(), ((0., 400.), (640., 80.)));
        // midpoint of the segment is on the line; above-left is Near
        assert!(line.signed_distance(&(320., 240.)).abs() < 1e-3);
        assert_eq!(classify(&(100., 100.), &line, true), Side::Near);
        assert_eq!(classify(&(500., 400.), &line, true), Side::Far);

        let half = CountingConfig {
            line_start: Some((0., 0.)),
            ..Default::default()
        };
        assert!(half.validate().is_err());
        let degenerate = CountingConfig {
            line_start: Some((5., 5.)),
            line_end: Some((5., 5.)),
            ..Default::default()
        };
        assert!(degenerate.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CountingConfig {
            line_position: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = CountingConfig {
            margin: -1.,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = load_config_from_file("./definitely/not/here.json").unwrap();
        assert_eq!(config, CountingConfig::default());
    }

    #[test]
    fn test_write_then_load() {
        let path = std::env::temp_dir().join(format!(
            "people-counter-config-{}.json",
            std::process::id()
        ));
        let path = path.to_string_lossy().into_owned();
        let config = CountingConfig {
            margin: 3.,
            max_frames: Some(100),
            ..Default::default()
        };
        config.write_config_to_file(&path).unwrap();
        assert_eq!(load_config_from_file(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();
    }
}
