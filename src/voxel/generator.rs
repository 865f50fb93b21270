//! Voxel generation: fans out DEM tile fetches over a geographic bounding
//! rectangle, decodes and aggregates pixel blocks, and places each block into
//! a ZFXY cell.

use crate::core::constants::{MAX_DEM_ZOOM, MAX_TILES_PER_REQUEST, TILE_SIZE, VERTICAL_EXTENT};
use crate::core::geo::LatLngBounds;
use crate::core::layer::{Aggregation, LayerConfig};
use crate::dem::codec::DemEncoding;
use crate::dem::raster::{fill_template, HttpTileRaster, RasterTile, TileRaster};
use crate::spatial::index::{lng_lat_to_tile, to_voxel_bounds, SpatialId, VoxelBounds};
use std::sync::Arc;

/// The per-layer inputs the generator needs: where to fetch tiles, how they
/// are encoded, and how to collapse samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DemSource {
    pub url_template: String,
    pub encoding: DemEncoding,
    pub aggregation: Aggregation,
}

impl From<&LayerConfig> for DemSource {
    fn from(layer: &LayerConfig) -> Self {
        Self {
            url_template: layer.source_url.clone(),
            encoding: layer.dem_format,
            aggregation: layer.elevation_aggregation,
        }
    }
}

/// Produces voxel sets from DEM tiles through a [`TileRaster`].
pub struct VoxelGenerator {
    raster: Arc<dyn TileRaster>,
}

impl VoxelGenerator {
    pub fn new(raster: Arc<dyn TileRaster>) -> Self {
        Self { raster }
    }

    /// Generator backed by the default HTTP raster fetcher.
    pub fn with_http() -> Self {
        Self::new(Arc::new(HttpTileRaster::new()))
    }

    /// Generates the complete voxel set covering `bounds` at resolution
    /// `target_z`.
    ///
    /// The DEM tile zoom is the floored viewport zoom capped at the source
    /// maximum; all covered tiles are fetched concurrently and joined. A tile
    /// that fails to fetch or decode contributes no voxels. The only
    /// operation-aborting condition is the tile-count guard, which returns an
    /// empty set rather than an error.
    pub async fn generate(
        &self,
        bounds: &LatLngBounds,
        target_z: u8,
        viewport_zoom: f64,
        source: &DemSource,
    ) -> Vec<VoxelBounds> {
        let dem_z = (viewport_zoom.floor() as i32).clamp(0, MAX_DEM_ZOOM as i32) as u8;

        let (min_x, max_x, min_y, max_y) = tile_range(bounds, dem_z);
        let tile_count = (max_x - min_x + 1) * (max_y - min_y + 1);
        if tile_count > MAX_TILES_PER_REQUEST {
            log::warn!(
                "too many tiles requested ({tile_count}) at DEM z{dem_z}, skipping voxel generation"
            );
            return Vec::new();
        }

        log::debug!("fetching {tile_count} DEM tiles at z{dem_z} for target z{target_z}");

        let jobs = (min_x..=max_x).flat_map(|x| {
            (min_y..=max_y).map(move |y| (x, y))
        });
        let results = futures::future::join_all(
            jobs.map(|(x, y)| self.process_tile(dem_z, x, y, target_z, source)),
        )
        .await;

        results.into_iter().flatten().collect()
    }

    /// Fetches one tile and turns its pixel blocks into voxels. Fetch or
    /// decode failures degrade to an empty list.
    async fn process_tile(
        &self,
        dem_z: u8,
        tile_x: u32,
        tile_y: u32,
        target_z: u8,
        source: &DemSource,
    ) -> Vec<VoxelBounds> {
        let url = fill_template(&source.url_template, dem_z, tile_x, tile_y);
        match self.raster.fetch(&url).await {
            Ok(tile) => voxelize_tile(&tile, dem_z, tile_x, tile_y, target_z, source),
            Err(e) => {
                log::warn!("tile {url} unavailable, degrading coverage: {e}");
                Vec::new()
            }
        }
    }
}

/// Computes the normalized tile-coordinate rectangle covering `bounds` at
/// zoom `z`. Min/max are taken per axis since the NW/SE corner mapping is
/// not guaranteed to be ordered near the dateline.
pub(crate) fn tile_range(bounds: &LatLngBounds, z: u8) -> (u32, u32, u32, u32) {
    let nw = lng_lat_to_tile(bounds.west(), bounds.north(), z);
    let se = lng_lat_to_tile(bounds.east(), bounds.south(), z);

    (
        nw.0.min(se.0),
        nw.0.max(se.0),
        nw.1.min(se.1),
        nw.1.max(se.1),
    )
}

/// Synchronous per-tile aggregation: partitions the pixel grid into
/// `stride x stride` blocks, reduces each block's valid samples with the
/// layer's aggregation mode, and emits one voxel per non-empty block.
fn voxelize_tile(
    tile: &RasterTile,
    dem_z: u8,
    tile_x: u32,
    tile_y: u32,
    target_z: u8,
    source: &DemSource,
) -> Vec<VoxelBounds> {
    let zoom_diff = target_z as i32 - dem_z as i32;
    // Fractional below one when the target is coarser than the DEM zoom, in
    // which case several tiles collapse onto the same column.
    let units_per_tile = 2_f64.powi(zoom_diff);

    // Block size in source pixels per target cell. Floors to 1 when the
    // requested resolution is finer than the raster; detail beyond one cell
    // per pixel is never synthesized.
    let stride = ((TILE_SIZE as f64 / units_per_tile).floor() as u32).max(1);

    let n_target = 2_f64.powi(target_z as i32);
    let mut voxels = Vec::new();

    let mut block_y = 0;
    while block_y < tile.height {
        let mut block_x = 0;
        while block_x < tile.width {
            if let Some(elevation) = aggregate_block(tile, block_x, block_y, stride, source) {
                let sid_x =
                    (tile_x as f64 * units_per_tile + (block_x / stride) as f64).floor() as u32;
                let sid_y =
                    (tile_y as f64 * units_per_tile + (block_y / stride) as f64).floor() as u32;
                let f = (n_target * elevation / VERTICAL_EXTENT).floor() as i32;

                voxels.push(to_voxel_bounds(SpatialId::new(target_z, f, sid_x, sid_y)));
            }
            block_x += stride;
        }
        block_y += stride;
    }

    voxels
}

/// Reduces the valid samples of one block, clipped at the grid edges.
/// Returns `None` when every sample is NoData; such a block contributes no
/// voxel.
fn aggregate_block(
    tile: &RasterTile,
    block_x: u32,
    block_y: u32,
    stride: u32,
    source: &DemSource,
) -> Option<f64> {
    let x_end = (block_x + stride).min(tile.width);
    let y_end = (block_y + stride).min(tile.height);

    let mut acc: Option<f64> = None;
    let mut sum = 0.0;
    let mut count = 0u32;

    for py in block_y..y_end {
        for px in block_x..x_end {
            let [r, g, b, _] = tile.pixel(px, py);
            let Some(elevation) = source.encoding.decode(r, g, b) else {
                continue;
            };
            match source.aggregation {
                Aggregation::Max => {
                    acc = Some(acc.map_or(elevation, |a| a.max(elevation)));
                }
                Aggregation::Min => {
                    acc = Some(acc.map_or(elevation, |a| a.min(elevation)));
                }
                Aggregation::Avg => {
                    sum += elevation;
                    count += 1;
                }
            }
        }
    }

    match source.aggregation {
        Aggregation::Avg if count > 0 => Some(sum / count as f64),
        Aggregation::Avg => None,
        _ => acc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::index::{tile_x_to_lng, tile_y_to_lat};
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes an elevation as a GSI DEM pixel.
    fn gsi_pixel(elevation: f64) -> [u8; 3] {
        let mut v = (elevation / 0.01).round() as i64;
        if v < 0 {
            v += 16_777_216;
        }
        let v = v as u32;
        [(v >> 16) as u8, (v >> 8) as u8, v as u8]
    }

    /// Square tile filled with NoData except the given pixels.
    fn gsi_tile(size: u32, pixels: &[(u32, u32, f64)]) -> RasterTile {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for _ in 0..size * size {
            data.extend_from_slice(&[128, 0, 0, 255]);
        }
        let mut tile = RasterTile::from_rgba(size, size, data).unwrap();
        for &(x, y, e) in pixels {
            let [r, g, b] = gsi_pixel(e);
            let idx = ((y * size + x) * 4) as usize;
            tile.data[idx] = r;
            tile.data[idx + 1] = g;
            tile.data[idx + 2] = b;
        }
        tile
    }

    struct MockRaster {
        tile: RasterTile,
        fetches: AtomicUsize,
    }

    impl MockRaster {
        fn new(tile: RasterTile) -> Self {
            Self {
                tile,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TileRaster for MockRaster {
        async fn fetch(&self, _url: &str) -> Result<RasterTile> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.tile.clone())
        }
    }

    struct FailingRaster;

    #[async_trait]
    impl TileRaster for FailingRaster {
        async fn fetch(&self, url: &str) -> Result<RasterTile> {
            Err(crate::VoxelError::Tile(format!("unreachable: {url}")))
        }
    }

    fn source() -> DemSource {
        DemSource {
            url_template: "mock://{z}/{x}/{y}".into(),
            encoding: DemEncoding::Gsi,
            aggregation: Aggregation::Max,
        }
    }

    /// Bounds spanning the centers of a 1 x `rows` run of tiles at zoom `z`.
    fn column_bounds(z: u8, x: u32, y_first: u32, rows: u32) -> LatLngBounds {
        let lng = tile_x_to_lng(x as f64 + 0.5, z);
        let north = tile_y_to_lat(y_first as f64 + 0.5, z);
        let south = tile_y_to_lat((y_first + rows - 1) as f64 + 0.5, z);
        LatLngBounds::from_coords(south, lng, north, lng)
    }

    #[test]
    fn test_tile_range_normalizes_axes() {
        let bounds = column_bounds(10, 512, 100, 3);
        assert_eq!(tile_range(&bounds, 10), (512, 512, 100, 102));
    }

    #[tokio::test]
    async fn test_tile_guard_aborts_at_401() {
        let raster = Arc::new(MockRaster::new(gsi_tile(2, &[])));
        let generator = VoxelGenerator::new(raster.clone());

        let bounds = column_bounds(10, 512, 50, 401);
        let voxels = generator.generate(&bounds, 14, 10.0, &source()).await;
        assert!(voxels.is_empty());
        assert_eq!(raster.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tile_guard_allows_400() {
        let raster = Arc::new(MockRaster::new(gsi_tile(2, &[])));
        let generator = VoxelGenerator::new(raster.clone());

        let bounds = column_bounds(10, 512, 50, 400);
        generator.generate(&bounds, 14, 10.0, &source()).await;
        assert_eq!(raster.fetches.load(Ordering::SeqCst), 400);
    }

    #[tokio::test]
    async fn test_all_no_data_yields_no_voxels() {
        let generator = VoxelGenerator::new(Arc::new(MockRaster::new(gsi_tile(4, &[]))));
        let bounds = column_bounds(14, 14552, 6451, 1);
        let voxels = generator.generate(&bounds, 14, 14.0, &source()).await;
        assert!(voxels.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_empty() {
        let generator = VoxelGenerator::new(Arc::new(FailingRaster));
        let bounds = column_bounds(14, 14552, 6451, 1);
        let voxels = generator.generate(&bounds, 14, 14.0, &source()).await;
        assert!(voxels.is_empty());
    }

    #[tokio::test]
    async fn test_aggregation_modes() {
        // target_z == dem_z: one 256-pixel block covers the whole tile, so
        // all samples collapse into a single voxel.
        let tile = gsi_tile(2, &[(0, 0, 4000.0), (1, 0, 8000.0), (0, 1, 2000.0)]);
        let bounds = column_bounds(14, 14552, 6451, 1);
        let unit = VERTICAL_EXTENT / 2_f64.powi(14); // 2048 m

        for (agg, expected_f) in [
            (Aggregation::Max, (8000.0 / unit) as i32),
            (Aggregation::Avg, ((4000.0 + 8000.0 + 2000.0) / 3.0 / unit) as i32),
            (Aggregation::Min, (2000.0 / unit) as i32),
        ] {
            let generator = VoxelGenerator::new(Arc::new(MockRaster::new(tile.clone())));
            let src = DemSource {
                aggregation: agg,
                ..source()
            };
            let voxels = generator.generate(&bounds, 14, 14.0, &src).await;
            assert_eq!(voxels.len(), 1, "{agg:?}");
            assert_eq!(voxels[0].id.f, expected_f, "{agg:?}");
            assert_eq!(voxels[0].id.x, 14552);
            assert_eq!(voxels[0].id.y, 6451);
            assert_eq!(voxels[0].id.z, 14);
        }
    }

    #[tokio::test]
    async fn test_finer_target_splits_tile_into_blocks() {
        // target_z = dem_z + 1: stride 128, four blocks per 256px tile.
        let tile = gsi_tile(256, &[(0, 0, 100.0), (130, 10, 200.0)]);
        let generator = VoxelGenerator::new(Arc::new(MockRaster::new(tile)));
        let bounds = column_bounds(14, 14552, 6451, 1);

        let mut voxels = generator.generate(&bounds, 15, 14.0, &source()).await;
        voxels.sort_by_key(|v| (v.id.x, v.id.y));

        assert_eq!(voxels.len(), 2);
        assert_eq!(
            (voxels[0].id.x, voxels[0].id.y),
            (14552 * 2, 6451 * 2),
            "block (0,0)"
        );
        assert_eq!(
            (voxels[1].id.x, voxels[1].id.y),
            (14552 * 2 + 1, 6451 * 2),
            "block (1,0)"
        );
    }

    #[tokio::test]
    async fn test_coarser_target_collapses_columns() {
        // target_z = dem_z - 2: the whole tile maps to one coarse column.
        let tile = gsi_tile(4, &[(0, 0, 1000.0), (3, 3, 3000.0)]);
        let generator = VoxelGenerator::new(Arc::new(MockRaster::new(tile)));
        let bounds = column_bounds(14, 14552, 6451, 1);

        let voxels = generator.generate(&bounds, 12, 14.0, &source()).await;
        assert_eq!(voxels.len(), 1);
        assert_eq!(voxels[0].id.x, 14552 / 4);
        assert_eq!(voxels[0].id.y, 6451 / 4);
        assert_eq!(voxels[0].id.z, 12);
    }

    #[tokio::test]
    async fn test_dem_zoom_capped_at_source_maximum() {
        let raster = Arc::new(MockRaster::new(gsi_tile(2, &[(0, 0, 500.0)])));
        let generator = VoxelGenerator::new(raster.clone());

        // Viewport zoom 18 still fetches z14 tiles: bounds inside one z14
        // tile must trigger exactly one fetch.
        let bounds = column_bounds(14, 14552, 6451, 1);
        let voxels = generator.generate(&bounds, 18, 18.0, &source()).await;
        assert_eq!(raster.fetches.load(Ordering::SeqCst), 1);
        assert!(!voxels.is_empty());
        assert!(voxels.iter().all(|v| v.id.z == 18));
    }
}
