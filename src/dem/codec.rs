//! Elevation pixel codec.
//!
//! Decodes an RGB pixel triple into an elevation in meters under the GSI DEM
//! PNG convention, and re-encodes elevations into the Mapbox Terrain-RGB
//! convention for consumers that expect it.

use serde::{Deserialize, Serialize};

/// GSI encoding: `X == 2^23` marks a missing sample.
const GSI_NO_DATA: u32 = 1 << 23;

/// GSI encoding resolution, 0.01 m per step.
const GSI_STEP: f64 = 0.01;

/// Terrain-RGB encoding: `elevation = -10000 + X * 0.1`.
const TERRAIN_RGB_OFFSET: f64 = 10_000.0;
const TERRAIN_RGB_STEP: f64 = 0.1;

/// Raster pixel convention of a DEM source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DemEncoding {
    /// GSI DEM PNG: `X = r*2^16 + g*2^8 + b`, 0.01 m steps, signed via 2^24
    /// wrap-around, `2^23` means no data.
    Gsi,
    /// Mapbox Terrain-RGB: `elevation = -10000 + X * 0.1`, no sentinel.
    TerrainRgb,
}

impl Default for DemEncoding {
    fn default() -> Self {
        DemEncoding::Gsi
    }
}

impl DemEncoding {
    /// Decodes a pixel triple under this convention. `None` means no data and
    /// must be treated as "skip this sample", never as elevation 0.
    pub fn decode(&self, r: u8, g: u8, b: u8) -> Option<f64> {
        match self {
            DemEncoding::Gsi => decode_gsi(r, g, b),
            DemEncoding::TerrainRgb => Some(decode_terrain_rgb(r, g, b)),
        }
    }
}

/// Decodes a GSI DEM PNG pixel into elevation in meters.
///
/// `X = r*65536 + g*256 + b`; `X == 2^23` is no data; values above wrap to
/// negative elevations via `X - 2^24`.
pub fn decode_gsi(r: u8, g: u8, b: u8) -> Option<f64> {
    let x = (r as u32) * 65_536 + (g as u32) * 256 + b as u32;

    if x == GSI_NO_DATA {
        return None;
    }

    if x < GSI_NO_DATA {
        Some(x as f64 * GSI_STEP)
    } else {
        Some((x as f64 - 16_777_216.0) * GSI_STEP)
    }
}

/// Decodes a Mapbox Terrain-RGB pixel into elevation in meters.
pub fn decode_terrain_rgb(r: u8, g: u8, b: u8) -> f64 {
    let x = (r as u32) * 65_536 + (g as u32) * 256 + b as u32;
    -TERRAIN_RGB_OFFSET + x as f64 * TERRAIN_RGB_STEP
}

/// Encodes an elevation into a Mapbox Terrain-RGB pixel triple, packed
/// big-endian. Lossy only to the 0.1 m step of the target convention.
pub fn encode_terrain_rgb(elevation: f64) -> [u8; 3] {
    let v = ((elevation + TERRAIN_RGB_OFFSET) / TERRAIN_RGB_STEP).round() as i64;
    let v = v.clamp(0, 0xFF_FF_FF) as u32;
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}
