//! Rendering core of an interactive 3D model viewer.
//!
//! Meshes carry their own material textures and transform, an ordered list
//! of passes (shadow maps first, then the lit main pass) renders into an
//! offscreen target, and the finished frame is handed back as a texture
//! through a future or a completion callback. Device creation, windowing
//! and presentation stay with the embedding application.

pub mod config;
pub mod error;
pub mod material;
pub mod obj;
pub mod render;
pub mod rotation;
pub mod shading;

pub use config::ViewerConfig;
pub use error::{MeshError, RenderError, TextureError};
pub use material::{Light, LightSource, Lighting, Material, MAX_LIGHTS, MAX_SHADOW_CASTERS};
pub use obj::{load_obj, load_obj_from_str, ObjMesh};
pub use render::{
    CameraParams, HeadlessGpu, Mesh, MeshLayout, MeshPass, OffscreenView, RenderCompletion,
    RenderPass, RenderedFrame, ShadowMap, ShadowPass, TargetSize, TextureUpload,
};
pub use rotation::MeshRotation;
pub use shading::{lit_color, shadow_coverage, DepthImage, DepthSampler, FragmentCharacters};
