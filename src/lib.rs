//! # demvoxel
//!
//! Converts raster digital-elevation-model (DEM) tiles into a ZFXY
//! spatial-index voxel representation and maintains a reactive view-model
//! over multiple elevation layers, including a before/after compare mode.
//!
//! The crate is split into pure coordinate math ([`spatial`]), the pixel
//! elevation codec ([`dem`]), the tile-fanning voxel generator ([`voxel`])
//! and the layer/compare state controller ([`core::viewer`]).

pub mod core;
pub mod dem;
pub mod prelude;
pub mod spatial;
pub mod voxel;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    geo::{LatLng, LatLngBounds, TileCoord},
    layer::{Aggregation, ColorMode, LayerConfig, LayerUpdate},
    viewer::{RenderLayer, StyledVoxel, Subscription, ViewerCoreState, VoxelViewer},
};

pub use crate::spatial::index::{SpatialId, VoxelBounds};

pub use crate::dem::{
    codec::DemEncoding,
    raster::{HttpTileRaster, RasterTile, TileRaster},
    terrain::TerrainRgbAdapter,
};

pub use crate::voxel::generator::{DemSource, VoxelGenerator};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, VoxelError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum VoxelError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Tile error: {0}")]
    Tile(String),

    #[error("Layer error: {0}")]
    Layer(String),
}

/// Error type alias for convenience
pub type Error = VoxelError;
