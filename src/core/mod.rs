pub mod constants;
pub mod geo;
pub mod layer;
pub mod viewer;
