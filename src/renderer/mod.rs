// renderer/mod.rs
//
// Scene-level rendering objects built on the `gfx` device layer.

pub mod depth;
pub mod lights;
pub mod mesh;
pub mod model;
pub mod primitives;
pub mod shader;
pub mod skybox;
pub mod texture;
pub mod units;

pub use depth::DepthTarget;
pub use lights::{Attenuation, DirLight, Light, PointLight, ShadowPass, SpotLight};
pub use mesh::{Mesh, MeshKind};
pub use model::{Model, ModelError};
pub use primitives::QuadGeometry;
pub use shader::{BuiltinShader, Shader};
pub use skybox::Skybox;
pub use texture::{Texture, TextureError, TextureFormat, TextureParameter, TextureValue};
pub use units::TextureUnits;
