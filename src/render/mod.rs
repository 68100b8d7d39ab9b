pub mod common;
pub mod headless;
pub mod mesh;
pub mod mesh_pass;
pub mod offscreen;
pub mod pass;
pub mod shadow;
pub mod shared;
pub mod target;
pub mod texture;

pub use common::{ground_plane, unit_cube};
pub use headless::HeadlessGpu;
pub use mesh::{
    MaterialBinding, MaterialVertex, Mesh, MeshLayout, MeshTransform, PipelineStateDescriptor,
    PlainVertex, TexturedMaterialVertex, TexturedVertex, Vertex,
};
pub use mesh_pass::{MeshPass, DEFAULT_CLEAR_COLOR};
pub use offscreen::{OffscreenView, RenderCompletion, RenderedFrame};
pub use pass::{PassContext, RenderPass, ResourceId};
pub use shadow::{light_view_projection, ShadowMap, ShadowPass};
pub use shared::CameraParams;
pub use target::{RenderTarget, TargetSize, COLOR_FORMAT, DEPTH_FORMAT};
pub use texture::{GpuTexture, TextureData, TextureKind, TextureSlot, TextureUpload};
