mod backend;
pub mod backends;
mod loader;
pub mod postprocess;
pub mod render;
mod result;
mod shared;

pub use backend::DetectorBackend;
pub use backends::{CpuBackend, StubBackend};
pub use loader::load_backend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use render::{draw_detections, BoxStyle};
pub use result::{BoundingBox, Detection, DetectionSet, POTHOLE_LABEL};
pub use shared::{shared_detector, SharedDetector};
