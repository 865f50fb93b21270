//! Prelude module for common demvoxel types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use demvoxel::prelude::*;`

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

pub use crate::{Error as VoxelError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
