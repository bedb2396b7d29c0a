pub mod raster;
pub mod dataset;
pub mod labels;

pub use raster::*;
pub use dataset::*;
pub use labels::*;
