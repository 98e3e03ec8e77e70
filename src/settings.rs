//! User settings and the validated subset the geometry needs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FishMeshError, Result};

pub const DEFAULT_SETTINGS_FILE: &str = "fish-mesh-settings.json";

/// Physical size of the reference board plus the margin kept around it in
/// the rectified image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectificationSettings {
    reference_width: f64,
    reference_height: f64,
    margin_ratio: f64,
}

impl RectificationSettings {
    /// `margin_ratio` is per side, so it has to stay below one half for the
    /// inner box to keep a positive size.
    pub fn new(reference_width: f64, reference_height: f64, margin_ratio: f64) -> Result<Self> {
        if !(reference_width.is_finite() && reference_width > 0.0) {
            return Err(FishMeshError::InvalidSettings(
                "'Measure box width' must be larger than 0".into(),
            ));
        }
        if !(reference_height.is_finite() && reference_height > 0.0) {
            return Err(FishMeshError::InvalidSettings(
                "'Measure box height' must be larger than 0".into(),
            ));
        }
        if !(0.0..0.5).contains(&margin_ratio) {
            return Err(FishMeshError::InvalidSettings(
                "'Measure box margin ratio' must be in [0, 0.5)".into(),
            ));
        }
        Ok(Self {
            reference_width,
            reference_height,
            margin_ratio,
        })
    }

    pub fn reference_width(&self) -> f64 {
        self.reference_width
    }

    pub fn reference_height(&self) -> f64 {
        self.reference_height
    }

    pub fn margin_ratio(&self) -> f64 {
        self.margin_ratio
    }

    /// Fraction of the rectified image covered by the inner box along each axis.
    pub fn inner_fraction(&self) -> f64 {
        1.0 - 2.0 * self.margin_ratio
    }
}

/// Everything persisted in the settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub measure_box_width: f64,
    pub measure_box_height: f64,
    /// Keeps e.g. a fish head visible when it extends past the board edge.
    pub measure_box_margin_ratio: f64,
    pub font_size: f32,
    pub point_size_relative_to_view_width: f32,
    pub draw_color: String,
    pub show_preview_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            measure_box_width: 42.0,
            measure_box_height: 29.6,
            measure_box_margin_ratio: 0.1,
            font_size: 16.0,
            point_size_relative_to_view_width: 0.005,
            draw_color: "#ffff00".to_owned(),
            show_preview_on_start: true,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_SETTINGS_FILE)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path`, falling back to defaults if the file is missing or
    /// unusable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!(
                    "Ignoring settings file {}: {e}. Using defaults.",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rectification()?;
        if !(self.font_size > 0.0) {
            return Err(FishMeshError::InvalidSettings(
                "'Font size' must be larger than 0".into(),
            ));
        }
        if !(self.point_size_relative_to_view_width > 0.0) {
            return Err(FishMeshError::InvalidSettings(
                "'Point size relative to view width' must be larger than 0".into(),
            ));
        }
        self.draw_rgb()?;
        Ok(())
    }

    pub fn rectification(&self) -> Result<RectificationSettings> {
        RectificationSettings::new(
            self.measure_box_width,
            self.measure_box_height,
            self.measure_box_margin_ratio,
        )
    }

    pub fn draw_rgb(&self) -> Result<[u8; 3]> {
        parse_hex_color(&self.draw_color)
    }

    /// Marker radius in pixels for a view `view_width` pixels wide.
    pub fn point_radius(&self, view_width: f32) -> f32 {
        (self.point_size_relative_to_view_width * view_width).max(1.0)
    }
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Result<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    let invalid = || FishMeshError::InvalidSettings(format!("'{hex}' is not a #rrggbb color"));
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

pub fn to_hex_color([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        let r = settings.rectification().unwrap();
        assert_eq!(r.reference_width(), 42.0);
        assert_eq!(r.reference_height(), 29.6);
        assert_eq!(r.margin_ratio(), 0.1);
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        assert!(matches!(
            RectificationSettings::new(0.0, 10.0, 0.1),
            Err(FishMeshError::InvalidSettings(_))
        ));
        assert!(RectificationSettings::new(10.0, -1.0, 0.1).is_err());
        assert!(RectificationSettings::new(f64::NAN, 1.0, 0.1).is_err());
    }

    #[test]
    fn rejects_margin_that_swallows_the_box() {
        assert!(RectificationSettings::new(10.0, 10.0, 0.5).is_err());
        assert!(RectificationSettings::new(10.0, 10.0, -0.01).is_err());
        assert!(RectificationSettings::new(10.0, 10.0, 0.0).is_ok());
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ffff00").unwrap(), [255, 255, 0]);
        assert_eq!(parse_hex_color("0a0B0c").unwrap(), [10, 11, 12]);
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gggggg").is_err());
        assert_eq!(to_hex_color([1, 2, 255]), "#0102ff");
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"measure_box_width": 50.0}"#).unwrap();
        assert_eq!(settings.measure_box_width, 50.0);
        assert_eq!(settings.measure_box_height, 29.6);
        assert_eq!(settings.draw_color, "#ffff00");
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "fish-mesh-settings-test-{}.json",
            std::process::id()
        ));
        let settings = Settings {
            measure_box_width: 60.0,
            draw_color: "#ff0000".into(),
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        let loaded = Settings::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "fish-mesh-settings-broken-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "not json").unwrap();
        let loaded = Settings::load_or_default(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, Settings::default());
    }
}
