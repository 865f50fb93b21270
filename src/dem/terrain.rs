//! Terrain-source adapter.
//!
//! Bridges renderers that expect Mapbox Terrain-RGB tiles to a GSI-encoded
//! source: each pixel is decoded under the source convention and re-encoded
//! in place, preserving the image dimensions and alpha channel.

use crate::core::geo::TileCoord;
use crate::dem::codec::{encode_terrain_rgb, DemEncoding};
use crate::dem::raster::{fill_template, RasterTile, TileRaster};
use crate::Result;
use std::sync::Arc;

/// Re-encodes fetched DEM tiles into the Terrain-RGB convention.
pub struct TerrainRgbAdapter {
    raster: Arc<dyn TileRaster>,
    url_template: String,
    encoding: DemEncoding,
}

impl TerrainRgbAdapter {
    pub fn new(raster: Arc<dyn TileRaster>, url_template: impl Into<String>) -> Self {
        Self {
            raster,
            url_template: url_template.into(),
            encoding: DemEncoding::Gsi,
        }
    }

    /// Overrides the source pixel convention (default GSI).
    pub fn with_encoding(mut self, encoding: DemEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Fetches the source tile at `coord` and returns it re-encoded as
    /// Terrain-RGB. Missing samples become elevation 0, since Terrain-RGB
    /// has no sentinel for gaps.
    pub async fn tile(&self, coord: TileCoord) -> Result<RasterTile> {
        let url = fill_template(&self.url_template, coord.z, coord.x, coord.y);
        let mut tile = self.raster.fetch(&url).await?;

        for px in tile.data.chunks_exact_mut(4) {
            let elevation = self.encoding.decode(px[0], px[1], px[2]).unwrap_or(0.0);
            let [r, g, b] = encode_terrain_rgb(elevation);
            px[0] = r;
            px[1] = g;
            px[2] = b;
            // Alpha remains untouched
        }

        Ok(tile)
    }
}
