//! Elevation layer configuration.

use crate::dem::codec::DemEncoding;
use serde::{Deserialize, Serialize};

/// Reducer used to collapse the raster samples of one block into a single
/// voxel elevation when downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Max,
    Avg,
    Min,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Max
    }
}

/// How a layer's voxels are colored outside compare mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    Solid,
    ElevationGradient,
}

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode::Solid
    }
}

/// Configuration of one elevation layer. Ordering within the viewer's layer
/// list determines draw/compare precedence and is user-reorderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    /// User-friendly name
    pub name: String,
    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders
    pub source_url: String,
    pub visible: bool,
    pub color: [u8; 3],
    /// Opacity in [0, 1]
    pub opacity: f64,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub elevation_aggregation: Aggregation,
    #[serde(default)]
    pub dem_format: DemEncoding,
}

impl LayerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_url: source_url.into(),
            visible: true,
            color: [255, 255, 255],
            opacity: 1.0,
            color_mode: ColorMode::default(),
            elevation_aggregation: Aggregation::default(),
            dem_format: DemEncoding::default(),
        }
    }
}

/// Partial update applied to a [`LayerConfig`] by
/// [`VoxelViewer::update_layer`](crate::core::viewer::VoxelViewer::update_layer).
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerUpdate {
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub visible: Option<bool>,
    pub color: Option<[u8; 3]>,
    pub opacity: Option<f64>,
    pub color_mode: Option<ColorMode>,
    pub elevation_aggregation: Option<Aggregation>,
    pub dem_format: Option<DemEncoding>,
}

impl LayerUpdate {
    /// Merges this update into `config`, field by field.
    pub fn apply(&self, config: &mut LayerConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(source_url) = &self.source_url {
            config.source_url = source_url.clone();
        }
        if let Some(visible) = self.visible {
            config.visible = visible;
        }
        if let Some(color) = self.color {
            config.color = color;
        }
        if let Some(opacity) = self.opacity {
            config.opacity = opacity;
        }
        if let Some(color_mode) = self.color_mode {
            config.color_mode = color_mode;
        }
        if let Some(agg) = self.elevation_aggregation {
            config.elevation_aggregation = agg;
        }
        if let Some(format) = self.dem_format {
            config.dem_format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let layer = LayerConfig::new("a", "Layer A", "https://example.com/{z}/{x}/{y}.png");
        assert!(layer.visible);
        assert_eq!(layer.elevation_aggregation, Aggregation::Max);
        assert_eq!(layer.color_mode, ColorMode::Solid);
        assert_eq!(layer.dem_format, DemEncoding::Gsi);
    }

    #[test]
    fn test_update_merges_only_set_fields() {
        let mut layer = LayerConfig::new("a", "Layer A", "https://example.com/{z}/{x}/{y}.png");
        let update = LayerUpdate {
            visible: Some(false),
            opacity: Some(0.5),
            ..Default::default()
        };
        update.apply(&mut layer);
        assert!(!layer.visible);
        assert_eq!(layer.opacity, 0.5);
        assert_eq!(layer.name, "Layer A");
        assert_eq!(layer.source_url, "https://example.com/{z}/{x}/{y}.png");
    }

    #[test]
    fn test_serde_aggregation_names() {
        let json = serde_json::to_string(&Aggregation::Avg).unwrap();
        assert_eq!(json, "\"avg\"");
        let mode: ColorMode = serde_json::from_str("\"elevation-gradient\"").unwrap();
        assert_eq!(mode, ColorMode::ElevationGradient);
    }
}
