pub mod codec;
pub mod raster;
pub mod terrain;
