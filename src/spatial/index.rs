//! ZFXY spatial-ID math: geographic <-> tile <-> spatial-index <-> metric
//! bounds conversions. Pure functions, no I/O, no state.
//!
//! The globe is divided into the Web-Mercator tile grid horizontally and
//! `2^z` equal vertical slices of a fixed `2^25` m span at level `z`.

use crate::core::constants::{EQUATOR_RESOLUTION, TILE_SIZE, VERTICAL_EXTENT, Z_MAX};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A four-integer ZFXY spatial address. `(z, x, y)` identifies a horizontal
/// Web-Mercator column at resolution `z`, `f` the vertical cell within it.
/// `f` may be negative for below-reference elevations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialId {
    pub z: u8,
    pub f: i32,
    pub x: u32,
    pub y: u32,
}

impl SpatialId {
    pub fn new(z: u8, f: i32, x: u32, y: u32) -> Self {
        Self { z, f, x, y }
    }

    /// Checks the horizontal coordinates fit the resolution level.
    pub fn is_valid(&self) -> bool {
        let max_coord = 2_u64.pow(self.z as u32);
        self.z <= Z_MAX && (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }

    /// Full cell key, format `z/f/x/y`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}/{}", self.z, self.f, self.x, self.y)
    }

    /// Horizontal column key, format `z/x/y`. Used to cross-reference cells
    /// between independently generated voxel sets in compare mode.
    pub fn column_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Metric center of a voxel cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelCenter {
    pub lng: f64,
    pub lat: f64,
    pub alt: f64,
}

/// Half-extent dimensions of a voxel cell in meters. Halved because the
/// renderable unit geometry spans -1..+1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

/// North-west corner of the horizontal footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelOrigin {
    pub lng: f64,
    pub lat: f64,
}

/// Read-only metric projection of a [`SpatialId`], suitable for rendering.
/// Computed on demand, immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelBounds {
    pub id: SpatialId,
    pub center: VoxelCenter,
    pub size: VoxelSize,
    pub origin: VoxelOrigin,
}

/// Meters per pixel at a given latitude and zoom level.
pub fn resolution_at_latitude(lat: f64, z: u8) -> f64 {
    EQUATOR_RESOLUTION * lat.to_radians().cos() / 2_f64.powi(z as i32)
}

/// Height of one vertical slice at level `z`: `2^25 / 2^z` meters.
pub fn unit_height(z: u8) -> f64 {
    VERTICAL_EXTENT / 2_f64.powi(z as i32)
}

/// Converts longitude to the tile X coordinate at zoom `z`, clamped to the
/// valid tile range.
pub fn lng_to_tile_x(lng: f64, z: u8) -> u32 {
    let n = 2_f64.powi(z as i32);
    let x = (n * (lng + 180.0) / 360.0).floor();
    (x as i64).clamp(0, n as i64 - 1) as u32
}

/// Converts latitude to the tile Y coordinate at zoom `z` via the Web
/// Mercator projection, clamped to the valid tile range.
pub fn lat_to_tile_y(lat: f64, z: u8) -> u32 {
    let n = 2_f64.powi(z as i32);
    let lat_rad = lat.to_radians();
    let y = (n * (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0).floor();
    (y as i64).clamp(0, n as i64 - 1) as u32
}

/// Converts a (possibly fractional) tile X to longitude. Integer `x` gives
/// the west edge of the tile; `x + 0.5` its center.
pub fn tile_x_to_lng(x: f64, z: u8) -> f64 {
    let n = 2_f64.powi(z as i32);
    x / n * 360.0 - 180.0
}

/// Converts a (possibly fractional) tile Y to latitude. Integer `y` gives
/// the north edge of the tile; `y + 0.5` its center.
pub fn tile_y_to_lat(y: f64, z: u8) -> f64 {
    let n = 2_f64.powi(z as i32);
    let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
    lat_rad.to_degrees()
}

/// Converts altitude to the vertical cell index at level `z` (floor).
pub fn altitude_to_f(alt: f64, z: u8) -> i32 {
    let n = 2_f64.powi(z as i32);
    (n * alt / VERTICAL_EXTENT).floor() as i32
}

/// Converts a vertical cell index to the altitude of its floor (not center).
pub fn f_to_altitude(f: i32, z: u8) -> f64 {
    f as f64 * unit_height(z)
}

/// Composes the tile and altitude conversions into a [`SpatialId`].
pub fn to_spatial_id(lng: f64, lat: f64, alt: f64, z: u8) -> SpatialId {
    SpatialId {
        z,
        f: altitude_to_f(alt, z),
        x: lng_to_tile_x(lng, z),
        y: lat_to_tile_y(lat, z),
    }
}

/// Converts longitude/latitude to tile coordinates at zoom `z`.
pub fn lng_lat_to_tile(lng: f64, lat: f64, z: u8) -> (u32, u32) {
    (lng_to_tile_x(lng, z), lat_to_tile_y(lat, z))
}

/// Projects a [`SpatialId`] into metric space for rendering.
pub fn to_voxel_bounds(id: SpatialId) -> VoxelBounds {
    let SpatialId { z, f, x, y } = id;
    let unit = unit_height(z);

    // f_to_altitude gives the cell floor, add half a unit for the center.
    let alt = f_to_altitude(f, z) + unit / 2.0;
    let lng = tile_x_to_lng(x as f64 + 0.5, z);
    let lat = tile_y_to_lat(y as f64 + 0.5, z);

    let res = resolution_at_latitude(lat, z);
    let half_footprint = res * TILE_SIZE as f64 * 0.5;

    VoxelBounds {
        id,
        center: VoxelCenter { lng, lat, alt },
        size: VoxelSize {
            width: half_footprint,
            depth: half_footprint,
            height: unit * 0.5,
        },
        origin: VoxelOrigin {
            lng: tile_x_to_lng(x as f64, z),
            lat: tile_y_to_lat(y as f64, z),
        },
    }
}
