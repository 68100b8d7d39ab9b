use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use log::{debug, warn};
use parking_lot::RwLock;
use wgpu::util::DeviceExt;

use crate::error::{MeshError, TextureError};
use crate::rotation::MeshRotation;

use super::target::{COLOR_FORMAT, DEPTH_FORMAT};
use super::texture::{GpuTexture, TextureData, TextureKind, TextureSlot, TextureSource, TextureUpload};

/// Vertex data a mesh carries. Decides the vertex layout, the shader entry
/// point and whether textures can be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshLayout {
    /// Position and normal.
    Plain,
    /// Position, normal and texture coordinates.
    Textured,
    /// Position, normal and per-vertex material colors, specular power and
    /// opacity. No texture coordinates.
    Materialed,
    /// Textured plus per-vertex material data.
    TexturedMaterialed,
}

const PLAIN_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
const TEXTURED_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
// Locations match the textured-materialed layout; location 2 stays unused.
const MATERIALED_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    3 => Float32x3,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x2,
];
const TEXTURED_MATERIALED_ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x3,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x2,
];
const POSITION_ATTRIBUTE: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

impl MeshLayout {
    pub const ALL: [MeshLayout; 4] = [
        MeshLayout::Plain,
        MeshLayout::Textured,
        MeshLayout::Materialed,
        MeshLayout::TexturedMaterialed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MeshLayout::Plain => "plain",
            MeshLayout::Textured => "textured",
            MeshLayout::Materialed => "materialed",
            MeshLayout::TexturedMaterialed => "textured-materialed",
        }
    }

    /// Size of one vertex in bytes.
    pub fn stride(self) -> usize {
        match self {
            MeshLayout::Plain => std::mem::size_of::<PlainVertex>(),
            MeshLayout::Textured => std::mem::size_of::<TexturedVertex>(),
            MeshLayout::Materialed => std::mem::size_of::<MaterialVertex>(),
            MeshLayout::TexturedMaterialed => std::mem::size_of::<TexturedMaterialVertex>(),
        }
    }

    pub fn has_tex_coords(self) -> bool {
        matches!(self, MeshLayout::Textured | MeshLayout::TexturedMaterialed)
    }

    pub fn vertex_entry(self) -> &'static str {
        match self {
            MeshLayout::Plain => "vs_plain",
            MeshLayout::Textured => "vs_textured",
            MeshLayout::Materialed => "vs_materialed",
            MeshLayout::TexturedMaterialed => "vs_textured_materialed",
        }
    }

    pub fn vertex_buffer_layout(self) -> wgpu::VertexBufferLayout<'static> {
        let attributes: &'static [wgpu::VertexAttribute] = match self {
            MeshLayout::Plain => &PLAIN_ATTRIBUTES,
            MeshLayout::Textured => &TEXTURED_ATTRIBUTES,
            MeshLayout::Materialed => &MATERIALED_ATTRIBUTES,
            MeshLayout::TexturedMaterialed => &TEXTURED_MATERIALED_ATTRIBUTES,
        };
        wgpu::VertexBufferLayout {
            array_stride: self.stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }

    /// Same stride, position only. Used by depth-only passes.
    pub fn position_buffer_layout(self) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTE,
        }
    }

    /// Shading program configuration for meshes of this layout.
    pub fn pipeline_state_descriptor(self) -> PipelineStateDescriptor {
        PipelineStateDescriptor {
            label: format!("{}-mesh-pipeline", self.name()),
            layout: self,
            vertex_entry: self.vertex_entry(),
            fragment_entry: "fs_main",
            vertex_buffer: self.vertex_buffer_layout(),
            blend: wgpu::BlendState::ALPHA_BLENDING,
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PlainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub specular_power: f32,
    pub opacity: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedMaterialVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub specular_power: f32,
    pub opacity: f32,
}

/// Vertex types with a known mesh layout.
pub trait Vertex: Pod {
    const LAYOUT: MeshLayout;
}

impl Vertex for PlainVertex {
    const LAYOUT: MeshLayout = MeshLayout::Plain;
}

impl Vertex for TexturedVertex {
    const LAYOUT: MeshLayout = MeshLayout::Textured;
}

impl Vertex for MaterialVertex {
    const LAYOUT: MeshLayout = MeshLayout::Materialed;
}

impl Vertex for TexturedMaterialVertex {
    const LAYOUT: MeshLayout = MeshLayout::TexturedMaterialed;
}

/// Everything needed to build the render pipeline for one mesh layout.
#[derive(Clone, Debug)]
pub struct PipelineStateDescriptor {
    pub label: String,
    pub layout: MeshLayout,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub vertex_buffer: wgpu::VertexBufferLayout<'static>,
    pub blend: wgpu::BlendState,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
}

impl PipelineStateDescriptor {
    pub(crate) fn create_pipeline(
        &self,
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        pipeline_layout: &wgpu::PipelineLayout,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.label),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some(self.vertex_entry),
                compilation_options: Default::default(),
                buffers: std::slice::from_ref(&self.vertex_buffer),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: self.depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(self.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(self.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview_mask: None,
            cache: None,
        })
    }
}

/// Counts derived from validated geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GeometryCounts {
    pub vertices: u32,
    pub indices: u32,
}

/// Checks raw vertex and index bytes against `layout`. Indices are `u32`
/// in native byte order, three per triangle.
pub(crate) fn validate_geometry(
    layout: MeshLayout,
    vertex_bytes: &[u8],
    index_bytes: &[u8],
) -> Result<GeometryCounts, MeshError> {
    let stride = layout.stride();
    if vertex_bytes.is_empty() {
        return Err(MeshError::EmptyVertices);
    }
    if vertex_bytes.len() % stride != 0 {
        return Err(MeshError::VertexStride {
            length: vertex_bytes.len(),
            stride,
        });
    }
    if index_bytes.is_empty() {
        return Err(MeshError::EmptyIndices);
    }
    if index_bytes.len() % 4 != 0 {
        return Err(MeshError::IndexAlignment {
            length: index_bytes.len(),
        });
    }
    let index_count = index_bytes.len() / 4;
    if index_count % 3 != 0 {
        return Err(MeshError::PartialTriangle { count: index_count });
    }

    let vertex_count = (vertex_bytes.len() / stride) as u32;
    for chunk in index_bytes.chunks_exact(4) {
        let index = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if index >= vertex_count {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
    }

    Ok(GeometryCounts {
        vertices: vertex_count,
        indices: index_count as u32,
    })
}

/// Model matrix and the matching normal matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTransform {
    pub model: Mat4,
    pub normal: Mat3,
}

impl Default for MeshTransform {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            normal: Mat3::IDENTITY,
        }
    }
}

impl MeshTransform {
    /// Normal matrix is the inverse-transpose of the upper-left 3x3 block.
    pub fn from_model(model: Mat4) -> Self {
        let upper = Mat3::from_mat4(model);
        let normal = if upper.determinant().abs() > f32::EPSILON {
            upper.inverse().transpose()
        } else {
            Mat3::IDENTITY
        };
        Self { model, normal }
    }
}

/// Texture slots and alpha handling of a mesh.
#[derive(Debug)]
pub struct MaterialBinding {
    opacity: Arc<TextureSlot>,
    bump: Arc<TextureSlot>,
    ignore_alpha: AtomicBool,
}

impl Default for MaterialBinding {
    fn default() -> Self {
        Self {
            opacity: Arc::new(TextureSlot::new(TextureKind::Opacity)),
            bump: Arc::new(TextureSlot::new(TextureKind::Bump)),
            ignore_alpha: AtomicBool::new(false),
        }
    }
}

impl MaterialBinding {
    pub fn slot(&self, kind: TextureKind) -> &Arc<TextureSlot> {
        match kind {
            TextureKind::Opacity => &self.opacity,
            TextureKind::Bump => &self.bump,
        }
    }

    pub fn opacity_texture(&self) -> Option<Arc<GpuTexture>> {
        self.opacity.current()
    }

    pub fn bump_texture(&self) -> Option<Arc<GpuTexture>> {
        self.bump.current()
    }

    pub fn ignores_texture_alpha(&self) -> bool {
        self.ignore_alpha.load(Ordering::Acquire)
    }
}

/// Geometry on the device together with its transform and material.
#[derive(Debug)]
pub struct Mesh {
    label: String,
    layout: MeshLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_count: u32,
    index_count: u32,
    transform: RwLock<MeshTransform>,
    material: MaterialBinding,
}

impl Mesh {
    /// Uploads raw vertex and index bytes laid out as `layout`.
    pub fn new(
        device: &wgpu::Device,
        layout: MeshLayout,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
    ) -> Result<Self, MeshError> {
        Self::with_label(device, layout.name(), layout, vertex_bytes, index_bytes)
    }

    pub fn with_label(
        device: &wgpu::Device,
        label: &str,
        layout: MeshLayout,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
    ) -> Result<Self, MeshError> {
        let counts = validate_geometry(layout, vertex_bytes, index_bytes)?;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: vertex_bytes,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: index_bytes,
            usage: wgpu::BufferUsages::INDEX,
        });
        debug!(
            "created {} mesh {label}: {} vertices, {} triangles",
            layout.name(),
            counts.vertices,
            counts.indices / 3
        );
        Ok(Self {
            label: label.to_string(),
            layout,
            vertex_buffer,
            index_buffer,
            vertex_count: counts.vertices,
            index_count: counts.indices,
            transform: RwLock::new(MeshTransform::default()),
            material: MaterialBinding::default(),
        })
    }

    /// Typed form of [`Mesh::new`]; the layout follows from the vertex type.
    pub fn from_vertices<V: Vertex>(
        device: &wgpu::Device,
        label: &str,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Self, MeshError> {
        Self::with_label(
            device,
            label,
            V::LAYOUT,
            bytemuck::cast_slice(vertices),
            bytemuck::cast_slice(indices),
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> MeshLayout {
        self.layout
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub(crate) fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub(crate) fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    pub fn material(&self) -> &MaterialBinding {
        &self.material
    }

    pub fn make_pipeline_state_descriptor(&self) -> PipelineStateDescriptor {
        self.layout.pipeline_state_descriptor()
    }

    /// Loads the diffuse texture whose alpha channel is the surface opacity.
    pub fn make_texture_opacity(
        &self,
        path: impl AsRef<Path>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        let source = TextureSource::Path(path.as_ref().to_path_buf());
        self.load_texture(TextureKind::Opacity, source, device, queue)
    }

    /// Loads a tangent-space normal map.
    pub fn make_texture_bump(
        &self,
        path: impl AsRef<Path>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        let source = TextureSource::Path(path.as_ref().to_path_buf());
        self.load_texture(TextureKind::Bump, source, device, queue)
    }

    pub fn make_texture_opacity_from_data(
        &self,
        data: TextureData,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        self.load_texture(TextureKind::Opacity, TextureSource::Decoded(data), device, queue)
    }

    pub fn make_texture_bump_from_data(
        &self,
        data: TextureData,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        self.load_texture(TextureKind::Bump, TextureSource::Decoded(data), device, queue)
    }

    fn load_texture(
        &self,
        kind: TextureKind,
        source: TextureSource,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        if !self.layout.has_tex_coords() {
            warn!(
                "mesh {} has no texture coordinates; ignoring {} texture",
                self.label,
                kind.label()
            );
            return TextureUpload::failed(TextureError::NoTexCoords {
                layout: self.layout.name(),
            });
        }
        self.material.slot(kind).load(source, device, queue)
    }

    /// When set, fragments are opaque whatever the texel alpha and vertex
    /// opacity.
    pub fn set_ignore_texture_alpha(&self, ignore: bool) {
        self.material.ignore_alpha.store(ignore, Ordering::Release);
    }

    pub fn transform(&self) -> MeshTransform {
        *self.transform.read()
    }

    pub fn set_transform(&self, model: Mat4) {
        *self.transform.write() = MeshTransform::from_model(model);
    }

    /// Replaces the transform with the rotation's matrices.
    pub fn apply_rotation(&self, rotation: &MeshRotation) {
        *self.transform.write() = MeshTransform {
            model: rotation.rotation_matrix(),
            normal: rotation.rotation_normal_matrix(),
        };
    }
}
