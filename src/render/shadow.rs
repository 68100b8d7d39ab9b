use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::bytes_of;
use glam::{Mat4, Vec3};
use log::debug;
use parking_lot::RwLock;
use wgpu::util::DeviceExt;

use crate::error::RenderError;
use crate::shading::DepthImage;

use super::common::SHADOW_SHADER;
use super::mesh::{Mesh, MeshLayout};
use super::offscreen::read_texture;
use super::pass::{PassContext, RenderPass, ResourceId};
use super::shared::{uniform_entry, ShadowObjectConstants, ShadowUniform};
use super::target::{TargetSize, DEPTH_FORMAT};

static NEXT_SHADOW_MAP_ID: AtomicU64 = AtomicU64::new(1);

/// Orthographic light view-projection covering a sphere of `scene_radius`
/// around the origin. `direction` points toward the light.
pub fn light_view_projection(direction: Vec3, scene_radius: f32) -> Mat4 {
    let direction = direction.try_normalize().unwrap_or(Vec3::Y);
    let radius = scene_radius.max(1e-3);
    let up = if direction.cross(Vec3::Y).length_squared() > 1e-6 {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let view = Mat4::look_at_rh(direction * radius * 2.0, Vec3::ZERO, up);
    let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
    projection * view
}

/// Square depth texture written by a [`ShadowPass`] and sampled by the
/// main pass. The light matrix lives here so writer and readers agree.
#[derive(Debug)]
pub struct ShadowMap {
    id: ResourceId,
    size: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    view_proj: RwLock<Mat4>,
}

impl ShadowMap {
    pub fn new(device: &wgpu::Device, size: u32, view_proj: Mat4) -> Self {
        let size = size.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: TargetSize::square(size).extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: NEXT_SHADOW_MAP_ID.fetch_add(1, Ordering::Relaxed),
            size,
            texture,
            view,
            view_proj: RwLock::new(view_proj),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn view_proj(&self) -> Mat4 {
        *self.view_proj.read()
    }

    pub fn set_view_proj(&self, view_proj: Mat4) {
        *self.view_proj.write() = view_proj;
    }

    /// Copies the depth values back to the CPU. Blocks until the copy is done.
    pub fn read_depth(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<DepthImage, RenderError> {
        let bytes = read_texture(
            device,
            queue,
            &self.texture,
            TargetSize::square(self.size),
            4,
            wgpu::TextureAspect::DepthOnly,
        )?;
        let depths = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        DepthImage::new(self.size, self.size, depths).ok_or(RenderError::Abandoned)
    }
}

/// Depth-only pass rendering meshes from a light into a [`ShadowMap`].
pub struct ShadowPass {
    name: String,
    map: Arc<ShadowMap>,
    meshes: Vec<Arc<Mesh>>,
    pipelines: HashMap<MeshLayout, wgpu::RenderPipeline>,
    light_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
}

impl ShadowPass {
    pub fn new(device: &wgpu::Device, map: Arc<ShadowMap>, meshes: Vec<Arc<Mesh>>) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SHADER.into()),
        });
        let light_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-light-layout"),
            entries: &[uniform_entry::<ShadowUniform>(0, wgpu::ShaderStages::VERTEX)],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-object-layout"),
            entries: &[uniform_entry::<ShadowObjectConstants>(
                0,
                wgpu::ShaderStages::VERTEX,
            )],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&light_layout, &object_layout],
            immediate_size: 0,
        });

        let pipelines = MeshLayout::ALL
            .into_iter()
            .map(|layout| {
                let buffers = [layout.position_buffer_layout()];
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&format!("{}-shadow-pipeline", layout.name())),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_shadow"),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    fragment: None,
                    multiview_mask: None,
                    cache: None,
                });
                (layout, pipeline)
            })
            .collect();

        Self {
            name: format!("shadow-{}", map.id()),
            map,
            meshes,
            pipelines,
            light_layout,
            object_layout,
        }
    }

    pub fn map(&self) -> &Arc<ShadowMap> {
        &self.map
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, ctx: &mut PassContext<'_>) {
        let light = ShadowUniform {
            light_view_proj: self.map.view_proj().to_cols_array_2d(),
        };
        let light_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("shadow-light-uniform"),
                contents: bytes_of(&light),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let light_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-light-bind-group"),
            layout: &self.light_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_buffer.as_entire_binding(),
            }],
        });

        let object_bind_groups: Vec<wgpu::BindGroup> = self
            .meshes
            .iter()
            .map(|mesh| {
                let constants = ShadowObjectConstants {
                    model: mesh.transform().model.to_cols_array_2d(),
                };
                let buffer = ctx
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("shadow-object-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("shadow-object-bind-group"),
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.name),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.map.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_bind_group(0, &light_bind_group, &[]);

        for (mesh, bind_group) in self.meshes.iter().zip(object_bind_groups.iter()) {
            let Some(pipeline) = self.pipelines.get(&mesh.layout()) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer().slice(..));
            pass.set_index_buffer(mesh.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count(), 0, 0..1);
        }
        drop(pass);
        debug!("encoded {} with {} meshes", self.name, self.meshes.len());
    }

    fn writes(&self) -> Vec<ResourceId> {
        vec![self.map.id()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4Swizzles;

    #[test]
    fn light_projection_keeps_scene_in_depth_range() {
        let view_proj = light_view_projection(Vec3::new(0.3, 1.0, 0.6), 2.0);
        for corner in [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::ZERO,
        ] {
            let clip = view_proj * corner.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!((0.0..=1.0).contains(&ndc.z), "depth {} for {corner}", ndc.z);
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        }
    }

    #[test]
    fn points_nearer_the_light_have_smaller_depth() {
        let view_proj = light_view_projection(Vec3::Y, 2.0);
        let high = view_proj * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        let low = view_proj * Vec3::new(0.0, -1.0, 0.0).extend(1.0);
        assert!(high.z < low.z);
    }

    #[test]
    fn zero_direction_falls_back_to_overhead_light() {
        assert_eq!(
            light_view_projection(Vec3::ZERO, 1.0),
            light_view_projection(Vec3::Y, 1.0)
        );
    }
}
