// scene/mod.rs

pub mod camera;
pub mod scene;
pub mod transform;

pub use camera::{Camera, CameraMovement};
pub use scene::Scene;
pub use transform::Transform;
