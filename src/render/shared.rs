//! CPU-side uniform layouts. Field order matches the WGSL structs in
//! `shading::SHADING_LIBRARY` and `render::common`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::material::{Lighting, MAX_LIGHTS, MAX_SHADOW_CASTERS};
use crate::shading::clamp_sample_radius;

/// Camera parameters consumed by the main pass.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    /// Perspective camera at `position` looking at `target`, wgpu depth range.
    pub fn look_at(position: Vec3, target: Vec3, fov_degrees: f32, aspect: f32) -> Self {
        let forward = (target - position).normalize_or_zero();
        let up = if forward.cross(Vec3::Y).length_squared() > f32::EPSILON {
            Vec3::Y
        } else {
            Vec3::Z
        };
        let view = Mat4::look_at_rh(position, target, up);
        let projection =
            Mat4::perspective_rh(fov_degrees.to_radians(), aspect.max(0.01), 0.1, 100.0);
        Self {
            view_proj: projection * view,
            position,
        }
    }
}

impl Default for CameraParams {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, 60.0, 1.0)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[[f32; 4]; 4]; MAX_SHADOW_CASTERS],
    pub eye: [f32; 4],
}

impl SceneUniform {
    pub fn new(camera: &CameraParams, light_view_proj: [Mat4; MAX_SHADOW_CASTERS]) -> Self {
        Self {
            view_proj: camera.view_proj.to_cols_array_2d(),
            light_view_proj: light_view_proj.map(|matrix| matrix.to_cols_array_2d()),
            eye: camera.position.extend(1.0).into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub(crate) struct LightSourceUniform {
    pub direction: [f32; 4],
    pub density: f32,
    pub specular: f32,
    pub shadow_bias: f32,
    pub shadow_soften: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct LightingUniform {
    pub lights: [LightSourceUniform; MAX_LIGHTS],
    pub ambient_density: f32,
    pub shadow_sample_radius: f32,
    pub light_count: u32,
    pub shadow_caster_count: u32,
    pub light_diffuse: [f32; 4],
    pub light_specular: [f32; 4],
    pub material_ambient: [f32; 4],
    pub material_diffuse: [f32; 4],
    /// `w` carries the specular power.
    pub material_specular: [f32; 4],
}

impl LightingUniform {
    pub fn new(lighting: &Lighting, shadow_caster_count: usize) -> Self {
        let mut lights = [LightSourceUniform::default(); MAX_LIGHTS];
        let active = lighting.active_sources();
        for (slot, source) in lights.iter_mut().zip(active) {
            *slot = LightSourceUniform {
                direction: source.direction.normalize_or_zero().extend(0.0).into(),
                density: source.density,
                specular: source.specular,
                shadow_bias: source.shadow_bias,
                shadow_soften: source.shadow_soften,
            };
        }
        let material = &lighting.material;
        Self {
            lights,
            ambient_density: lighting.ambient_density,
            shadow_sample_radius: clamp_sample_radius(lighting.shadow_sample_radius),
            light_count: active.len() as u32,
            shadow_caster_count: shadow_caster_count.min(MAX_SHADOW_CASTERS).min(active.len())
                as u32,
            light_diffuse: lighting.light.diffuse_color.extend(1.0).into(),
            light_specular: lighting.light.specular_color.extend(1.0).into(),
            material_ambient: material.ambient_color.extend(1.0).into(),
            material_diffuse: material.diffuse_color.extend(1.0).into(),
            material_specular: material.specular_color.extend(material.specular_power).into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    /// x: ignore texture alpha, y: bump map bound.
    pub flags: [u32; 4],
}

impl ObjectConstants {
    pub fn new(model: Mat4, normal: Mat3, ignore_alpha: bool, has_bump: bool) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            flags: [ignore_alpha as u32, has_bump as u32, 0, 0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ShadowUniform {
    pub light_view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ShadowObjectConstants {
    pub model: [[f32; 4]; 4],
}

pub(crate) fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

pub(crate) fn uniform_entry<T>(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

pub(crate) fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
