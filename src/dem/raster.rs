//! Raster tile fetching.
//!
//! [`TileRaster`] is the seam between the voxel pipeline and the network: it
//! turns a tile URL into a decoded RGBA pixel grid. The HTTP implementation
//! shares one client across all fetches and retries once before giving up.

use crate::{Result, VoxelError};
use async_trait::async_trait;
use once_cell::sync::Lazy;

/// Shared async HTTP client with a custom User-Agent so that public tile
/// servers don't reject the request. Building the client once avoids the
/// cost of TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("demvoxel/0.1.0")
        .timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build reqwest async client")
});

/// A decoded square raster tile as a 2D grid of RGBA samples.
#[derive(Debug, Clone)]
pub struct RasterTile {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, `width * height * 4` long.
    pub data: Vec<u8>,
}

impl RasterTile {
    /// Creates a tile from raw RGBA bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if data.len() != (width * height * 4) as usize {
            return Err(VoxelError::Tile(format!(
                "RGBA buffer length {} does not match {}x{} tile",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Returns the RGBA sample at pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }
}

/// Anything that can resolve a tile URL into a pixel grid.
#[async_trait]
pub trait TileRaster: Send + Sync {
    /// Fetch and decode the tile at `url`. A failure here degrades to "no
    /// voxels for this tile" in the generator, it never aborts a whole
    /// generation.
    async fn fetch(&self, url: &str) -> Result<RasterTile>;
}

/// Substitutes `{z}`, `{x}` and `{y}` placeholders in a tile URL template.
pub fn fill_template(template: &str, z: u8, x: u32, y: u32) -> String {
    template
        .replace("{z}", &z.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

/// Default [`TileRaster`] that fetches PNG tiles over HTTP.
#[derive(Debug, Default)]
pub struct HttpTileRaster;

impl HttpTileRaster {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_once(&self, url: &str) -> Result<RasterTile> {
        let resp = HTTP_CLIENT.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(VoxelError::Tile(format!("HTTP {} for {}", resp.status(), url)));
        }
        let bytes = resp.bytes().await?;
        let img = image::load_from_memory(&bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(RasterTile {
            width,
            height,
            data: img.into_raw(),
        })
    }
}

#[async_trait]
impl TileRaster for HttpTileRaster {
    async fn fetch(&self, url: &str) -> Result<RasterTile> {
        const MAX_ATTEMPTS: usize = 2;
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            log::debug!("fetch tile {} attempt {}", url, attempt);
            match self.fetch_once(url).await {
                Ok(tile) => {
                    log::debug!("downloaded tile {} ({}x{})", url, tile.width, tile.height);
                    return Ok(tile);
                }
                Err(e) => {
                    log::warn!("tile {} fetch failed on attempt {}: {}", url, attempt, e);
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| VoxelError::Tile(format!("fetch failed: {url}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template() {
        let url = fill_template("https://example.com/{z}/{x}/{y}.png", 14, 14552, 6451);
        assert_eq!(url, "https://example.com/14/14552/6451.png");

        // Swapped-axis templates substitute the same way
        let url = fill_template("https://example.com/{z}/{y}/{x}.png", 5, 1, 2);
        assert_eq!(url, "https://example.com/5/2/1.png");
    }

    #[test]
    fn test_raster_tile_pixel_indexing() {
        let mut data = vec![0u8; 2 * 2 * 4];
        data[(1 * 2 + 1) * 4..(1 * 2 + 1) * 4 + 4].copy_from_slice(&[1, 2, 3, 255]);
        let tile = RasterTile::from_rgba(2, 2, data).unwrap();
        assert_eq!(tile.pixel(1, 1), [1, 2, 3, 255]);
        assert_eq!(tile.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_raster_tile_rejects_bad_length() {
        assert!(RasterTile::from_rgba(2, 2, vec![0u8; 3]).is_err());
    }
}
