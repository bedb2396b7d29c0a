pub mod kmeans;
pub mod segmentation;
pub mod asymmetry;
pub mod border;
pub mod blue_veil;
pub mod inpaint;
pub mod hair;

pub use kmeans::*;
pub use segmentation::*;
pub use asymmetry::*;
pub use border::*;
pub use blue_veil::*;
pub use inpaint::*;
pub use hair::*;
