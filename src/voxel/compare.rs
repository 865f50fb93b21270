//! Compare-mode difference coloring.
//!
//! The base layer's highest surface cell per horizontal column is the
//! comparison reference; target cells are colored by their vertical-index
//! difference against it on a logarithmic curve that makes a one-cell
//! difference clearly visible while saturating by twenty cells.

use crate::prelude::HashMap;
use crate::spatial::index::VoxelBounds;

/// Neutral color for target columns with no base reference.
pub const NO_BASE_COLOR: [u8; 3] = [150, 150, 150];

/// Color for columns with zero difference.
pub const NO_DIFF_COLOR: [u8; 3] = [240, 240, 240];

/// Difference magnitude at which the color saturates.
const MAX_DIFF: f64 = 20.0;

/// Builds the lookup from horizontal column key `z/x/y` to the base layer's
/// vertical index, keeping the maximum `f` per column.
pub fn build_base_f_map(voxels: &[VoxelBounds]) -> HashMap<String, i32> {
    let mut map: HashMap<String, i32> = HashMap::default();
    for v in voxels {
        let key = v.id.column_key();
        match map.get(&key) {
            Some(&existing) if existing >= v.id.f => {}
            _ => {
                map.insert(key, v.id.f);
            }
        }
    }
    map
}

/// Colors a vertical-index difference: warm hue for positive, cool for
/// negative, neutral for zero. Intensity follows
/// `log10(|diff| + 1) / log10(21)`, clamped to [0, 1].
pub fn diff_color(diff: i32) -> [u8; 3] {
    if diff == 0 {
        return NO_DIFF_COLOR;
    }

    let abs = diff.unsigned_abs() as f64;
    let t = ((abs + 1.0).log10() / (MAX_DIFF + 1.0).log10()).min(1.0);
    let intensity = (t * 255.0).round() as u8;
    let faded = 255 - intensity;

    if diff > 0 {
        [255, faded, faded]
    } else {
        [faded, faded, 255]
    }
}

/// Maps altitude 0-4000 m onto a cool-to-warm gradient, clamped outside the
/// range.
pub fn elevation_color(alt: f64) -> [u8; 3] {
    let t = (alt / 4000.0).clamp(0.0, 1.0);
    [
        (t * 255.0).round() as u8,
        100,
        (255.0 - t * 255.0).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::index::{to_voxel_bounds, SpatialId};

    #[test]
    fn test_base_f_map_keeps_max_per_column() {
        let voxels = vec![
            to_voxel_bounds(SpatialId::new(14, 5, 10, 20)),
            to_voxel_bounds(SpatialId::new(14, 9, 10, 20)),
            to_voxel_bounds(SpatialId::new(14, 7, 10, 20)),
            to_voxel_bounds(SpatialId::new(14, 1, 11, 20)),
        ];
        let map = build_base_f_map(&voxels);
        assert_eq!(map.len(), 2);
        assert_eq!(map["14/10/20"], 9);
        assert_eq!(map["14/11/20"], 1);
    }

    #[test]
    fn test_diff_color_zero_is_neutral() {
        assert_eq!(diff_color(0), NO_DIFF_COLOR);
    }

    #[test]
    fn test_diff_color_two_steps() {
        // t = log10(3) / log10(21) ~ 0.3608, intensity 92
        assert_eq!(diff_color(2), [255, 163, 163]);
        assert_eq!(diff_color(-2), [163, 163, 255]);
    }

    #[test]
    fn test_diff_color_saturates_at_twenty() {
        assert_eq!(diff_color(20), [255, 0, 0]);
        assert_eq!(diff_color(300), [255, 0, 0]);
        assert_eq!(diff_color(-300), [0, 0, 255]);
    }

    #[test]
    fn test_diff_color_one_step_stands_out() {
        // log10(2)/log10(21) ~ 0.2276, intensity 58: visibly away from white
        assert_eq!(diff_color(1), [255, 197, 197]);
    }

    #[test]
    fn test_elevation_color_gradient() {
        assert_eq!(elevation_color(0.0), [0, 100, 255]);
        assert_eq!(elevation_color(4000.0), [255, 100, 0]);
        assert_eq!(elevation_color(2000.0), [128, 100, 128]);
        // Clamped outside the range
        assert_eq!(elevation_color(-100.0), [0, 100, 255]);
        assert_eq!(elevation_color(9000.0), [255, 100, 0]);
    }
}
