//! Tunable parameters for the canvas core.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "layout": { "rest_length": 200.0 }, "camera": { "max_zoom": 8.0 } }
//! ```

use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive number, got {value}")))
    }
}

/// Spatial index settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Grid cell edge length in world units. `None` derives it from the
    /// median node radius.
    pub cell_size: Option<f64>,
}

/// Camera limits and output surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Device pixel ratio.
    pub scale_factor: f64,
    /// Viewport size in screen pixels.
    pub viewport: Size,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.05,
            max_zoom: 5.0,
            scale_factor: 1.0,
            viewport: Size::new(1280.0, 800.0),
        }
    }
}

/// Force-directed layout parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Inverse-square repulsion constant.
    pub repulsion: f64,
    /// Spring stiffness along edges.
    pub spring: f64,
    /// Edge length at which springs exert no force.
    pub rest_length: f64,
    /// Nodes farther apart than this do not repel each other.
    pub cutoff: f64,
    /// Distances are floored to this value before computing repulsion.
    pub min_distance: f64,
    /// Velocity multiplier applied every step, in (0, 1].
    pub damping: f64,
    /// Upper bound on velocity magnitude. Also the starting temperature.
    pub max_speed: f64,
    /// Factor the speed cap is multiplied by after every step, in (0, 1].
    pub cooling: f64,
    /// Mean kinetic energy per movable node considered at rest.
    pub energy_threshold: f64,
    /// Consecutive calm steps required before declaring convergence.
    pub calm_steps: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            repulsion: 5000.0,
            spring: 0.05,
            rest_length: 120.0,
            cutoff: 240.0,
            min_distance: 10.0,
            damping: 0.8,
            max_speed: 50.0,
            cooling: 0.995,
            energy_threshold: 0.01,
            calm_steps: 10,
        }
    }
}

/// Frame scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `dt` passed to the layout engine on each tick.
    pub time_step: f64,
    /// Layout motion below this distance (world units) does not mark the
    /// frame dirty.
    pub redraw_epsilon: f64,
    /// Frames slower than this are counted as over budget.
    pub frame_budget_ms: f64,
    /// Number of recent frames kept for statistics.
    pub stats_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            redraw_epsilon: 0.01,
            frame_budget_ms: 16.6,
            stats_window: 120,
        }
    }
}

/// Complete configuration for a canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub spatial: SpatialConfig,
    pub camera: CameraConfig,
    pub layout: LayoutConfig,
    pub scheduler: SchedulerConfig,
}

impl CanvasConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize the config to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values the core cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spatial.validate()?;
        self.camera.validate()?;
        self.layout.validate()?;
        self.scheduler.validate()
    }
}

impl SpatialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.cell_size {
            Some(cell_size) => positive("spatial.cell_size", cell_size),
            None => Ok(()),
        }
    }
}

impl CameraConfig {
    /// Zoom limits must be positive and ordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("camera.min_zoom", self.min_zoom)?;
        positive("camera.max_zoom", self.max_zoom)?;
        if self.min_zoom > self.max_zoom {
            return Err(invalid(
                "camera.min_zoom",
                format!("{} exceeds max_zoom {}", self.min_zoom, self.max_zoom),
            ));
        }
        positive("camera.scale_factor", self.scale_factor)
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("layout.repulsion", self.repulsion),
            ("layout.spring", self.spring),
            ("layout.rest_length", self.rest_length),
            ("layout.cutoff", self.cutoff),
            ("layout.min_distance", self.min_distance),
            ("layout.max_speed", self.max_speed),
            ("layout.energy_threshold", self.energy_threshold),
        ] {
            positive(field, value)?;
        }
        for (field, value) in [("layout.damping", self.damping), ("layout.cooling", self.cooling)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(field, format!("must be in (0, 1], got {value}")));
            }
        }
        if self.min_distance >= self.cutoff {
            return Err(invalid(
                "layout.min_distance",
                "must be smaller than layout.cutoff",
            ));
        }
        if self.calm_steps == 0 {
            return Err(invalid("layout.calm_steps", "must be at least 1"));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scheduler.time_step", self.time_step)?;
        if !(self.redraw_epsilon.is_finite() && self.redraw_epsilon >= 0.0) {
            return Err(invalid("scheduler.redraw_epsilon", "must be non-negative"));
        }
        positive("scheduler.frame_budget_ms", self.frame_budget_ms)?;
        if self.stats_window == 0 {
            return Err(invalid("scheduler.stats_window", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CanvasConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            CanvasConfig::from_json(r#"{ "layout": { "rest_length": 200.0 }, "spatial": { "cell_size": 32.0 } }"#)
                .unwrap();
        assert_eq!(config.layout.rest_length, 200.0);
        assert_eq!(config.layout.damping, LayoutConfig::default().damping);
        assert_eq!(config.spatial.cell_size, Some(32.0));
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_rejects_inverted_zoom_range() {
        let err = CanvasConfig::from_json(r#"{ "camera": { "min_zoom": 4.0, "max_zoom": 2.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.min_zoom", .. }));
    }

    #[test]
    fn test_rejects_bad_damping_and_cell_size() {
        let mut config = CanvasConfig::default();
        config.layout.damping = 1.5;
        assert!(config.validate().is_err());

        let mut config = CanvasConfig::default();
        config.spatial.cell_size = Some(0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "spatial.cell_size", .. })
        ));
    }

    #[test]
    fn test_rejects_cooling_out_of_range() {
        for cooling in [0.0, 1.5, f64::NAN] {
            let layout = LayoutConfig {
                cooling,
                ..LayoutConfig::default()
            };
            assert!(matches!(
                layout.validate(),
                Err(ConfigError::Invalid { field: "layout.cooling", .. })
            ));
        }
    }

    #[test]
    fn test_rejects_unrepresentable_frame_budget() {
        for budget in [0.0, f64::INFINITY, f64::NAN] {
            let scheduler = SchedulerConfig {
                frame_budget_ms: budget,
                ..SchedulerConfig::default()
            };
            assert!(scheduler.validate().is_err(), "{budget} accepted");
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        let mut config = CanvasConfig::default();
        config.scheduler.time_step = 0.5;
        std::fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(CanvasConfig::load(&path).unwrap(), config);
        assert!(matches!(
            CanvasConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
