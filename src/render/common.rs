use glam::Vec3;

use super::mesh::TexturedVertex;

/// Main pass program. Linked after `shading::SHADING_LIBRARY`.
pub(crate) const MESH_SHADER: &str = r#"
struct SceneUniform {
    view_proj: mat4x4<f32>,
    light_view_proj: array<mat4x4<f32>, 2>,
    eye: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    flags: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> scene: SceneUniform;
@group(0) @binding(1)
var<uniform> lighting: LightingUniform;
@group(0) @binding(2)
var shadow_map0: texture_depth_2d;
@group(0) @binding(3)
var shadow_map1: texture_depth_2d;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;
@group(1) @binding(1)
var diffuse_texture: texture_2d<f32>;
@group(1) @binding(2)
var bump_texture: texture_2d<f32>;
@group(1) @binding(3)
var material_sampler: sampler;

struct PlainInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct TexturedInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
}

struct MaterialedInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(3) ambient: vec3<f32>,
    @location(4) diffuse: vec3<f32>,
    @location(5) specular: vec3<f32>,
    @location(6) power_opacity: vec2<f32>,
}

struct TexturedMaterialedInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
    @location(3) ambient: vec3<f32>,
    @location(4) diffuse: vec3<f32>,
    @location(5) specular: vec3<f32>,
    @location(6) power_opacity: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
    @location(3) ambient: vec3<f32>,
    @location(4) diffuse: vec3<f32>,
    @location(5) specular: vec3<f32>,
    @location(6) power_opacity: vec2<f32>,
    @location(7) shadow_position0: vec4<f32>,
    @location(8) shadow_position1: vec4<f32>,
}

fn transform_vertex(position: vec3<f32>, normal: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(position, 1.0);
    out.clip_position = scene.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normalize(normal_matrix * normal);

    out.tex_coord = vec2<f32>(0.0, 0.0);
    out.ambient = lighting.material_ambient.rgb;
    out.diffuse = lighting.material_diffuse.rgb;
    out.specular = lighting.material_specular.rgb;
    out.power_opacity = vec2<f32>(lighting.material_specular.w, 1.0);
    out.shadow_position0 = scene.light_view_proj[0] * world_position;
    out.shadow_position1 = scene.light_view_proj[1] * world_position;
    return out;
}

@vertex
fn vs_plain(input: PlainInput) -> VertexOutput {
    return transform_vertex(input.position, input.normal);
}

@vertex
fn vs_textured(input: TexturedInput) -> VertexOutput {
    var out = transform_vertex(input.position, input.normal);
    out.tex_coord = input.tex_coord;
    return out;
}

@vertex
fn vs_materialed(input: MaterialedInput) -> VertexOutput {
    var out = transform_vertex(input.position, input.normal);
    out.ambient = input.ambient;
    out.diffuse = input.diffuse;
    out.specular = input.specular;
    out.power_opacity = input.power_opacity;
    return out;
}

@vertex
fn vs_textured_materialed(input: TexturedMaterialedInput) -> VertexOutput {
    var out = transform_vertex(input.position, input.normal);
    out.tex_coord = input.tex_coord;
    out.ambient = input.ambient;
    out.diffuse = input.diffuse;
    out.specular = input.specular;
    out.power_opacity = input.power_opacity;
    return out;
}

// Cotangent frame from screen-space derivatives; no tangent attribute needed.
fn perturb_normal(normal: vec3<f32>, world_pos: vec3<f32>, uv: vec2<f32>, bump: vec3<f32>) -> vec3<f32> {
    let dp1 = dpdx(world_pos);
    let dp2 = dpdy(world_pos);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);

    let dp2perp = cross(dp2, normal);
    let dp1perp = cross(normal, dp1);
    let tangent = dp2perp * duv1.x + dp1perp * duv2.x;
    let bitangent = dp2perp * duv1.y + dp1perp * duv2.y;
    let scale = max(dot(tangent, tangent), dot(bitangent, bitangent));
    if (scale <= 1e-12) {
        return normal;
    }
    let inv = inverseSqrt(scale);
    let frame = mat3x3<f32>(tangent * inv, bitangent * inv, normal);
    return normalize(frame * (bump * 2.0 - 1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(diffuse_texture, material_sampler, input.tex_coord);
    let bump = textureSample(bump_texture, material_sampler, input.tex_coord).xyz;
    let geometric = normalize(input.normal);
    let bumped = perturb_normal(geometric, input.world_pos, input.tex_coord, bump);
    let normal = select(geometric, bumped, object.flags.y != 0u);

    var vert: FragmentCharacters;
    vert.eye = scene.eye.xyz - input.world_pos;
    vert.ambient = input.ambient;
    vert.diffuse = input.diffuse;
    vert.specular = input.specular;
    vert.specular_power = input.power_opacity.x;
    vert.opacity = input.power_opacity.y;
    vert.shadow_position0 = input.shadow_position0;
    vert.shadow_position1 = input.shadow_position1;

    return lit_color(vert, normal, lighting, texel, shadow_map0, shadow_map1, object.flags.x != 0u);
}
"#;

/// Depth-only program of the shadow pass.
pub(crate) const SHADOW_SHADER: &str = r#"
struct ShadowUniform {
    light_view_proj: mat4x4<f32>,
}

struct ShadowObject {
    model: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> shadow: ShadowUniform;

@group(1) @binding(0)
var<uniform> object: ShadowObject;

@vertex
fn vs_shadow(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return shadow.light_view_proj * object.model * vec4<f32>(position, 1.0);
}
"#;

/// Unit cube centered at the origin, four vertices per face.
pub fn unit_cube() -> (Vec<TexturedVertex>, Vec<u32>) {
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (-Vec3::Z, -Vec3::X, Vec3::Y),
        (-Vec3::X, Vec3::Z, Vec3::Y),
        (Vec3::X, -Vec3::Z, Vec3::Y),
        (-Vec3::Y, Vec3::X, Vec3::Z),
        (Vec3::Y, Vec3::X, -Vec3::Z),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, right, up) in faces {
        let base = vertices.len() as u32;
        for (u, v) in [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
            let position = normal * 0.5 + right * (u - 0.5) + up * (0.5 - v);
            vertices.push(TexturedVertex {
                position: position.into(),
                normal: normal.into(),
                tex_coord: [u, v],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Square in the XZ plane at height `y`, facing up.
pub fn ground_plane(half_extent: f32, y: f32) -> (Vec<TexturedVertex>, Vec<u32>) {
    let corners = [(-1.0, 1.0, 0.0, 1.0), (1.0, 1.0, 1.0, 1.0), (1.0, -1.0, 1.0, 0.0), (-1.0, -1.0, 0.0, 0.0)];
    let vertices = corners
        .iter()
        .map(|&(x, z, u, v)| TexturedVertex {
            position: [x * half_extent, y, z * half_extent],
            normal: [0.0, 1.0, 0.0],
            tex_coord: [u, v],
        })
        .collect();
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winding_normal(vertices: &[TexturedVertex], tri: &[u32]) -> Vec3 {
        let p = |i: u32| Vec3::from(vertices[i as usize].position);
        (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]))
    }

    #[test]
    fn cube_triangles_wind_outward() {
        let (vertices, indices) = unit_cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        for tri in indices.chunks_exact(3) {
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(winding_normal(&vertices, tri).dot(normal) > 0.0);
        }
    }

    #[test]
    fn ground_plane_faces_up() {
        let (vertices, indices) = ground_plane(2.0, -1.0);
        for tri in indices.chunks_exact(3) {
            assert!(winding_normal(&vertices, tri).y > 0.0);
        }
        assert!(vertices.iter().all(|v| v.position[1] == -1.0));
    }
}
