//! Engine-wide constants derived from the ZFXY spatial-ID convention and
//! common web-map tile defaults. Keeping them in a single place makes it
//! easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Maximum ZFXY resolution level. The vertical axis spans `2^Z_MAX` meters.
pub const Z_MAX: u8 = 25;

/// Total vertical extent of the ZFXY grid in meters (2^25).
pub const VERTICAL_EXTENT: f64 = 33_554_432.0;

/// Web-Mercator resolution at the equator in meters per pixel
/// (earth circumference / 256).
pub const EQUATOR_RESOLUTION: f64 = 156_543.03;

/// Highest zoom the DEM raster source serves; requests are capped here.
pub const MAX_DEM_ZOOM: u8 = 14;

/// Abort voxel generation when a bounding box covers more tiles than this
/// (roughly a 20x20 grid). Backpressure against runaway fetch fan-out.
pub const MAX_TILES_PER_REQUEST: u32 = 400;

/// Clamp range for the spatial-index resolution picked from viewport zoom.
pub const MIN_RESOLUTION_Z: u8 = 10;
pub const MAX_RESOLUTION_Z: u8 = 22;

/// Default delta added to the floored viewport zoom to pick the resolution.
pub const DEFAULT_RESOLUTION_OFFSET: i32 = 4;

/// GSI DEM PNG tile URL template.
pub const GSI_DEM_URL_TEMPLATE: &str = "https://cyberjapandata.gsi.go.jp/xyz/dem_png/{z}/{x}/{y}.png";

/// AIST seamless elevation tile URL template. Note the swapped {y}/{x} order
/// in the path.
pub const AIST_DEM_URL_TEMPLATE: &str = "https://tiles.gsj.jp/tiles/elev/mixed/{z}/{y}/{x}.png";
