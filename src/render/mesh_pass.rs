use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::bytes_of;
use glam::Mat4;
use log::{debug, warn};
use parking_lot::RwLock;
use wgpu::util::DeviceExt;

use crate::material::{Lighting, MAX_SHADOW_CASTERS};
use crate::shading::SHADING_LIBRARY;

use super::common::MESH_SHADER;
use super::mesh::{Mesh, MeshLayout};
use super::pass::{PassContext, RenderPass, ResourceId};
use super::shadow::ShadowMap;
use super::shared::{
    texture_entry, uniform_entry, CameraParams, LightingUniform, ObjectConstants, SceneUniform,
};
use super::target::DEPTH_FORMAT;
use super::texture::{GpuTexture, TextureData};

/// Background of the main pass.
pub const DEFAULT_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

/// Main color pass: draws meshes into the view's target with the shading
/// library, sampling the shadow maps of up to two lights.
pub struct MeshPass {
    name: String,
    meshes: Vec<Arc<Mesh>>,
    shadow_maps: Vec<Arc<ShadowMap>>,
    lighting: Lighting,
    camera: RwLock<CameraParams>,
    clear_color: wgpu::Color,
    pipelines: HashMap<MeshLayout, wgpu::RenderPipeline>,
    scene_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback_diffuse: GpuTexture,
    fallback_bump: GpuTexture,
    _fallback_depth: wgpu::Texture,
    fallback_depth_view: wgpu::TextureView,
}

impl MeshPass {
    /// `shadow_maps[i]` is sampled for light source `i`; maps beyond the
    /// second are ignored.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        lighting: Lighting,
        meshes: Vec<Arc<Mesh>>,
        mut shadow_maps: Vec<Arc<ShadowMap>>,
    ) -> Self {
        if shadow_maps.len() > MAX_SHADOW_CASTERS {
            warn!(
                "{} shadow maps supplied; only the first {MAX_SHADOW_CASTERS} are sampled",
                shadow_maps.len()
            );
            shadow_maps.truncate(MAX_SHADOW_CASTERS);
        }

        let source = format!("{SHADING_LIBRARY}\n{MESH_SHADER}");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh-shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let depth_sample = wgpu::TextureSampleType::Depth;
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-scene-layout"),
            entries: &[
                uniform_entry::<SceneUniform>(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                uniform_entry::<LightingUniform>(1, wgpu::ShaderStages::VERTEX_FRAGMENT),
                texture_entry(2, depth_sample),
                texture_entry(3, depth_sample),
            ],
        });

        let color_sample = wgpu::TextureSampleType::Float { filterable: true };
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-object-layout"),
            entries: &[
                uniform_entry::<ObjectConstants>(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                texture_entry(1, color_sample),
                texture_entry(2, color_sample),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh-pipeline-layout"),
            bind_group_layouts: &[&scene_layout, &object_layout],
            immediate_size: 0,
        });

        let pipelines = MeshLayout::ALL
            .into_iter()
            .map(|layout| {
                let descriptor = layout.pipeline_state_descriptor();
                (
                    layout,
                    descriptor.create_pipeline(device, &shader, &pipeline_layout),
                )
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let fallback_diffuse = GpuTexture::create(device, queue, &TextureData::white());
        let fallback_bump = GpuTexture::create(device, queue, &TextureData::flat_normal());
        let fallback_depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fallback-shadow-map"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let fallback_depth_view = fallback_depth.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            name: "main".to_string(),
            meshes,
            shadow_maps,
            lighting,
            camera: RwLock::new(CameraParams::default()),
            clear_color: DEFAULT_CLEAR_COLOR,
            pipelines,
            scene_layout,
            object_layout,
            sampler,
            fallback_diffuse,
            fallback_bump,
            _fallback_depth: fallback_depth,
            fallback_depth_view,
        }
    }

    pub fn with_clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn set_camera(&self, camera: CameraParams) {
        *self.camera.write() = camera;
    }

    pub fn camera(&self) -> CameraParams {
        self.camera.read().clone()
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    fn shadow_view(&self, index: usize) -> &wgpu::TextureView {
        self.shadow_maps
            .get(index)
            .map(|map| map.view())
            .unwrap_or(&self.fallback_depth_view)
    }
}

impl RenderPass for MeshPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, ctx: &mut PassContext<'_>) {
        let mut light_view_proj = [Mat4::IDENTITY; MAX_SHADOW_CASTERS];
        for (slot, map) in light_view_proj.iter_mut().zip(&self.shadow_maps) {
            *slot = map.view_proj();
        }
        let scene = SceneUniform::new(&self.camera.read(), light_view_proj);
        let lighting = LightingUniform::new(&self.lighting, self.shadow_maps.len());

        let scene_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("scene-uniform"),
                contents: bytes_of(&scene),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let lighting_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lighting-uniform"),
                contents: bytes_of(&lighting),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let scene_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh-scene-bind-group"),
            layout: &self.scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lighting_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(self.shadow_view(0)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(self.shadow_view(1)),
                },
            ],
        });

        // Snapshot the texture slots once so every draw of this frame sees
        // the same binding.
        let mut object_bind_groups = Vec::with_capacity(self.meshes.len());
        for mesh in &self.meshes {
            let material = mesh.material();
            let diffuse = material.opacity_texture();
            let bump = material.bump_texture();
            let transform = mesh.transform();
            let constants = ObjectConstants::new(
                transform.model,
                transform.normal,
                material.ignores_texture_alpha(),
                bump.is_some(),
            );
            let buffer = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let diffuse_view = diffuse
                .as_deref()
                .map(|texture| &texture.view)
                .unwrap_or(&self.fallback_diffuse.view);
            let bump_view = bump
                .as_deref()
                .map(|texture| &texture.view)
                .unwrap_or(&self.fallback_bump.view);
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mesh-object-bind-group"),
                layout: &self.object_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(diffuse_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(bump_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            object_bind_groups.push(bind_group);
        }

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.target.color_view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: ctx.target.depth_view(),
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
        pass.set_bind_group(0, &scene_bind_group, &[]);

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
        debug!(
            "encoded {} with {} meshes and {} shadow maps",
            self.name,
            self.meshes.len(),
            self.shadow_maps.len()
        );
    }

    fn reads(&self) -> Vec<ResourceId> {
        self.shadow_maps.iter().map(|map| map.id()).collect()
    }
}
