//! Lighting and shadow evaluation shared by every fragment stage.
//!
//! [`SHADING_LIBRARY`] is prepended to each fragment shader. The CPU
//! functions in this module compute the same values with the same
//! operations so lighting setups can be checked without a GPU and shadow
//! maps read back from the device can be inspected.

use glam::{Vec3, Vec4};

use crate::material::{Lighting, MAX_SHADOW_CASTERS};

/// Upper bound of the slope factor applied to the shadow bias.
pub const MAX_SLOPE_BIAS: f32 = 10.0;

/// Largest percentage-closer kernel radius in texels; 9x9 samples.
pub const MAX_SAMPLE_RADIUS: f32 = 4.0;

/// Sample radius as the shaders see it: within `0..=MAX_SAMPLE_RADIUS`,
/// NaN treated as zero.
pub fn clamp_sample_radius(sample_radius: f32) -> f32 {
    if sample_radius.is_nan() {
        return 0.0;
    }
    sample_radius.clamp(0.0, MAX_SAMPLE_RADIUS)
}

/// Depth values addressable by texel, row 0 at the top.
pub trait DepthSampler {
    fn dimensions(&self) -> (u32, u32);
    fn depth(&self, x: u32, y: u32) -> f32;
}

/// Depth map held in memory, usually read back from a shadow pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    depths: Vec<f32>,
}

impl DepthImage {
    /// Returns `None` when `depths` does not hold `width * height` values.
    pub fn new(width: u32, height: u32, depths: Vec<f32>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        (expected > 0 && depths.len() == expected).then_some(Self {
            width,
            height,
            depths,
        })
    }

    pub fn filled(width: u32, height: u32, depth: f32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            depths: vec![depth; width as usize * height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.depths[index] = depth;
        }
    }

    pub fn depths(&self) -> &[f32] {
        &self.depths
    }
}

impl DepthSampler for DepthImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn depth(&self, x: u32, y: u32) -> f32 {
        self.depths[self.index(x, y)]
    }
}

/// Per-fragment inputs interpolated from the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentCharacters {
    /// Vector from the surface to the eye, not necessarily normalized.
    pub eye: Vec3,
    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
    pub specular_power: f32,
    pub opacity: f32,
    /// Fragment position in the clip space of each shadow-casting light.
    pub shadow_positions: [Vec4; MAX_SHADOW_CASTERS],
}

impl FragmentCharacters {
    /// Fragment characters for a mesh without per-vertex material data.
    pub fn from_lighting(lighting: &Lighting, eye: Vec3) -> Self {
        Self {
            eye,
            ambient_color: lighting.material.ambient_color,
            diffuse_color: lighting.material.diffuse_color,
            specular_color: lighting.material.specular_color,
            specular_power: lighting.material.specular_power,
            opacity: 1.0,
            shadow_positions: [Vec4::ZERO; MAX_SHADOW_CASTERS],
        }
    }
}

/// Bias grows with the surface slope relative to the light.
///
/// `cos_angle` is N·L; the slope factor is `tan(acos(cos_angle))`.
pub fn shadow_bias(bias_factor: f32, cos_angle: f32) -> f32 {
    let c = cos_angle.clamp(0.01, 1.0);
    let slope = ((1.0 - c * c).sqrt() / c).min(MAX_SLOPE_BIAS);
    bias_factor * (1.0 + slope)
}

/// Fraction of percentage-closer samples that see the light (1 = lit).
///
/// Fragments behind the light, outside its depth range or outside the
/// shadow map footprint are fully lit, as is everything when the map has
/// no texels. `sample_radius` goes through [`clamp_sample_radius`].
pub fn shadow_coverage(
    position: Vec4,
    bias_factor: f32,
    surface_angle: f32,
    soften: f32,
    sample_radius: f32,
    shadow_map: &dyn DepthSampler,
) -> f32 {
    if position.w <= 0.0 {
        return 1.0;
    }
    let ndc = position.truncate() / position.w;
    if !(0.0..=1.0).contains(&ndc.z) {
        return 1.0;
    }
    let u = ndc.x * 0.5 + 0.5;
    let v = 0.5 - ndc.y * 0.5;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return 1.0;
    }

    let (width, height) = shadow_map.dimensions();
    if width == 0 || height == 0 {
        return 1.0;
    }
    let center_x = u * width as f32;
    let center_y = v * height as f32;
    let step = soften.max(0.0);
    let radius = (clamp_sample_radius(sample_radius) + 0.5).floor() as i32;
    let bias = shadow_bias(bias_factor, surface_angle);

    let mut lit = 0.0;
    let mut count = 0.0;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let sx = (center_x + dx as f32 * step).floor();
            let sy = (center_y + dy as f32 * step).floor();
            let x = (sx.max(0.0) as u32).min(width - 1);
            let y = (sy.max(0.0) as u32).min(height - 1);
            if ndc.z - bias <= shadow_map.depth(x, y) {
                lit += 1.0;
            }
            count += 1.0;
        }
    }
    lit / count
}

/// Final fragment color: ambient plus shadowed diffuse and specular terms.
pub fn lit_color(
    frag: &FragmentCharacters,
    normal: Vec3,
    lighting: &Lighting,
    diffuse_texel: Vec4,
    shadow_maps: [Option<&dyn DepthSampler>; MAX_SHADOW_CASTERS],
    ignore_alpha: bool,
) -> Vec4 {
    let normal = normal.normalize_or_zero();
    let view = frag.eye.normalize_or_zero();
    let base = diffuse_texel.truncate() * frag.diffuse_color;
    let ambient = lighting.ambient_density * frag.ambient_color * base;

    let mut lights = Vec3::ZERO;
    for (index, source) in lighting.active_sources().iter().enumerate() {
        let to_light = source.direction.normalize_or_zero();
        let n_dot_l = normal.dot(to_light).max(0.0);
        let diffuse = lighting.light.diffuse_color * base * n_dot_l * source.density;

        let mut specular = Vec3::ZERO;
        if n_dot_l > 0.0 {
            let reflected = 2.0 * normal.dot(to_light) * normal - to_light;
            let r_dot_v = reflected.dot(view).max(0.0);
            if r_dot_v > 0.0 {
                specular = lighting.light.specular_color
                    * frag.specular_color
                    * r_dot_v.powf(frag.specular_power)
                    * source.specular;
            }
        }

        let coverage = match shadow_maps.get(index).copied().flatten() {
            Some(map) => shadow_coverage(
                frag.shadow_positions[index],
                source.shadow_bias,
                normal.dot(to_light),
                source.shadow_soften,
                lighting.shadow_sample_radius,
                map,
            ),
            None => 1.0,
        };
        lights += (diffuse + specular) * coverage;
    }

    let alpha = if ignore_alpha {
        1.0
    } else {
        diffuse_texel.w * frag.opacity
    };
    (ambient + lights).extend(alpha)
}

/// WGSL counterpart of this module. Expects the uniform layout of
/// `render::shared::LightingUniform`.
pub const SHADING_LIBRARY: &str = r#"
struct LightSource {
    direction: vec4<f32>,
    density: f32,
    specular: f32,
    shadow_bias: f32,
    shadow_soften: f32,
}

struct LightingUniform {
    lights: array<LightSource, 4>,
    ambient_density: f32,
    shadow_sample_radius: f32,
    light_count: u32,
    shadow_caster_count: u32,
    light_diffuse: vec4<f32>,
    light_specular: vec4<f32>,
    material_ambient: vec4<f32>,
    material_diffuse: vec4<f32>,
    material_specular: vec4<f32>,
}

struct FragmentCharacters {
    eye: vec3<f32>,
    ambient: vec3<f32>,
    diffuse: vec3<f32>,
    specular: vec3<f32>,
    specular_power: f32,
    opacity: f32,
    shadow_position0: vec4<f32>,
    shadow_position1: vec4<f32>,
}

fn shadow_bias(bias_factor: f32, cos_angle: f32) -> f32 {
    let c = clamp(cos_angle, 0.01, 1.0);
    let slope = min(sqrt(1.0 - c * c) / c, 10.0);
    return bias_factor * (1.0 + slope);
}

fn shadow_coverage(
    position: vec4<f32>,
    bias_factor: f32,
    surface_angle: f32,
    soften: f32,
    sample_radius: f32,
    shadow_map: texture_depth_2d,
) -> f32 {
    if (position.w <= 0.0) {
        return 1.0;
    }
    let ndc = position.xyz / position.w;
    if (ndc.z < 0.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0) {
        return 1.0;
    }

    let dims = textureDimensions(shadow_map);
    let center = uv * vec2<f32>(dims);
    let max_coord = vec2<i32>(dims) - vec2<i32>(1, 1);
    let spacing = max(soften, 0.0);
    let radius = i32(floor(clamp(sample_radius, 0.0, 4.0) + 0.5));
    let bias = shadow_bias(bias_factor, surface_angle);

    var lit = 0.0;
    var count = 0.0;
    for (var dy = -radius; dy <= radius; dy++) {
        for (var dx = -radius; dx <= radius; dx++) {
            let texel_pos = floor(center + vec2<f32>(f32(dx), f32(dy)) * spacing);
            let coord = clamp(vec2<i32>(texel_pos), vec2<i32>(0, 0), max_coord);
            let map_depth = textureLoad(shadow_map, coord, 0);
            if (ndc.z - bias <= map_depth) {
                lit += 1.0;
            }
            count += 1.0;
        }
    }
    return lit / count;
}

fn lit_color(
    vert: FragmentCharacters,
    surface_normal: vec3<f32>,
    lighting: LightingUniform,
    diffuse_texel: vec4<f32>,
    shadow_map0: texture_depth_2d,
    shadow_map1: texture_depth_2d,
    ignore_alpha: bool,
) -> vec4<f32> {
    let normal = normalize(surface_normal);
    let to_eye = normalize(vert.eye);
    let base = diffuse_texel.rgb * vert.diffuse;
    let ambient = lighting.ambient_density * vert.ambient * base;

    var sources = lighting.lights;
    var lights = vec3<f32>(0.0);
    let count = min(lighting.light_count, 4u);
    for (var i = 0u; i < count; i++) {
        let source = sources[i];
        let to_light = normalize(source.direction.xyz);
        let n_dot_l = max(dot(normal, to_light), 0.0);
        let diffuse = lighting.light_diffuse.rgb * base * n_dot_l * source.density;

        var specular = vec3<f32>(0.0);
        if (n_dot_l > 0.0) {
            let reflected = 2.0 * dot(normal, to_light) * normal - to_light;
            let r_dot_v = max(dot(reflected, to_eye), 0.0);
            if (r_dot_v > 0.0) {
                specular = lighting.light_specular.rgb * vert.specular
                    * pow(r_dot_v, vert.specular_power) * source.specular;
            }
        }

        var coverage = 1.0;
        if (i == 0u && lighting.shadow_caster_count > 0u) {
            coverage = shadow_coverage(vert.shadow_position0, source.shadow_bias,
                dot(normal, to_light), source.shadow_soften,
                lighting.shadow_sample_radius, shadow_map0);
        } else if (i == 1u && lighting.shadow_caster_count > 1u) {
            coverage = shadow_coverage(vert.shadow_position1, source.shadow_bias,
                dot(normal, to_light), source.shadow_soften,
                lighting.shadow_sample_radius, shadow_map1);
        }
        lights += (diffuse + specular) * coverage;
    }

    var alpha = diffuse_texel.a * vert.opacity;
    if (ignore_alpha) {
        alpha = 1.0;
    }
    return vec4<f32>(ambient + lights, alpha);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::LightSource;

    fn overhead_lighting() -> Lighting {
        Lighting {
            sources: vec![LightSource {
                direction: Vec3::Y,
                ..LightSource::default()
            }],
            ..Lighting::default()
        }
    }

    fn ortho_position(u: f32, v: f32, depth: f32) -> Vec4 {
        Vec4::new(u * 2.0 - 1.0, 1.0 - v * 2.0, depth, 1.0)
    }

    #[test]
    fn coverage_is_one_outside_depth_range() {
        let map = DepthImage::filled(8, 8, 0.0);
        for depth in [-0.5, -0.001, 1.001, 3.0] {
            for bias in [0.0, 0.005, 0.1] {
                for angle in [-1.0, 0.0, 0.5, 1.0] {
                    for soften in [0.0, 1.0, 4.0] {
                        for radius in [0.0, 1.0, 2.0] {
                            let position = ortho_position(0.5, 0.5, depth);
                            let coverage =
                                shadow_coverage(position, bias, angle, soften, radius, &map);
                            assert_eq!(coverage, 1.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn coverage_is_one_outside_light_footprint() {
        let map = DepthImage::filled(8, 8, 0.0);
        let outside = ortho_position(1.5, 0.5, 0.5);
        assert_eq!(shadow_coverage(outside, 0.0, 1.0, 1.0, 1.0, &map), 1.0);
        let behind = Vec4::new(0.0, 0.0, 0.5, -1.0);
        assert_eq!(shadow_coverage(behind, 0.0, 1.0, 1.0, 1.0, &map), 1.0);
    }

    #[test]
    fn occluded_fragment_is_shadowed() {
        let map = DepthImage::filled(16, 16, 0.2);
        let coverage = shadow_coverage(ortho_position(0.5, 0.5, 0.8), 0.001, 1.0, 1.0, 1.0, &map);
        assert_eq!(coverage, 0.0);
        let lit = shadow_coverage(ortho_position(0.5, 0.5, 0.1), 0.001, 1.0, 1.0, 1.0, &map);
        assert_eq!(lit, 1.0);
    }

    #[test]
    fn percentage_closer_filter_softens_edges() {
        let mut map = DepthImage::filled(16, 16, 1.0);
        for y in 0..16 {
            for x in 0..8 {
                map.set(x, y, 0.1);
            }
        }
        let edge = ortho_position(8.5 / 16.0, 0.5, 0.5);
        let hard = shadow_coverage(edge, 0.0, 1.0, 1.0, 0.0, &map);
        let soft = shadow_coverage(edge, 0.0, 1.0, 1.0, 1.0, &map);
        assert_eq!(hard, 1.0);
        assert!(soft > 0.0 && soft < 1.0, "soft coverage {soft}");
    }

    struct NoTexels;

    impl DepthSampler for NoTexels {
        fn dimensions(&self) -> (u32, u32) {
            (0, 0)
        }

        fn depth(&self, _: u32, _: u32) -> f32 {
            unreachable!("sampled an empty depth map")
        }
    }

    #[test]
    fn empty_sampler_leaves_fragment_lit() {
        let position = ortho_position(0.5, 0.5, 0.5);
        assert_eq!(shadow_coverage(position, 0.0, 1.0, 1.0, 2.0, &NoTexels), 1.0);
    }

    #[test]
    fn oversized_depth_image_is_refused() {
        assert!(DepthImage::new(70_000, 70_000, Vec::new()).is_none());
        assert!(DepthImage::new(0, 4, Vec::new()).is_none());
        assert!(DepthImage::new(2, 3, vec![0.5; 6]).is_some());
    }

    #[test]
    fn sample_radius_is_capped() {
        let mut map = DepthImage::filled(64, 64, 1.0);
        for y in 0..64 {
            for x in 0..29 {
                map.set(x, y, 0.1);
            }
        }
        let edge = ortho_position(32.5 / 64.0, 0.5, 0.5);
        let capped = shadow_coverage(edge, 0.0, 1.0, 1.0, MAX_SAMPLE_RADIUS, &map);
        assert!(capped < 1.0);
        for radius in [5.0, 64.0, 1e9, f32::INFINITY] {
            assert_eq!(shadow_coverage(edge, 0.0, 1.0, 1.0, radius, &map), capped);
        }
        assert_eq!(clamp_sample_radius(f32::NAN), 0.0);
        assert_eq!(clamp_sample_radius(-3.0), 0.0);
    }

    #[test]
    fn wgsl_caps_sample_radius_like_cpu() {
        let cap = format!("clamp(sample_radius, 0.0, {MAX_SAMPLE_RADIUS:.1})");
        assert!(SHADING_LIBRARY.contains(&cap));
    }

    #[test]
    fn steeper_surfaces_get_more_bias() {
        let flat = shadow_bias(0.002, 1.0);
        let tilted = shadow_bias(0.002, 0.5);
        let grazing = shadow_bias(0.002, 0.0);
        assert_eq!(flat, 0.002);
        assert!(tilted > flat);
        assert!(grazing > tilted);
        assert!(grazing <= 0.002 * (1.0 + MAX_SLOPE_BIAS) + f32::EPSILON);
    }

    #[test]
    fn ignore_alpha_forces_opaque_output() {
        let lighting = overhead_lighting();
        let frag = FragmentCharacters {
            opacity: 0.3,
            ..FragmentCharacters::from_lighting(&lighting, Vec3::Y)
        };
        for alpha in [0.0, 0.25, 0.5, 1.0] {
            for channel in [0.0, 0.4, 1.0] {
                let texel = Vec4::new(channel, 1.0 - channel, channel, alpha);
                let color = lit_color(&frag, Vec3::Y, &lighting, texel, [None, None], true);
                assert_eq!(color.w, 1.0);
                let blended = lit_color(&frag, Vec3::Y, &lighting, texel, [None, None], false);
                assert!((blended.w - alpha * 0.3).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn light_behind_surface_contributes_nothing() {
        let lighting = overhead_lighting();
        let frag = FragmentCharacters::from_lighting(&lighting, Vec3::new(0.0, -1.0, 0.2));
        let texel = Vec4::ONE;
        let facing_away = lit_color(&frag, -Vec3::Y, &lighting, texel, [None, None], false);
        let ambient_only = lighting.ambient_density
            * lighting.material.ambient_color
            * lighting.material.diffuse_color;
        assert_eq!(facing_away.truncate(), ambient_only);
    }

    #[test]
    fn shadow_map_attenuates_light_terms() {
        let lighting = overhead_lighting();
        let mut frag = FragmentCharacters::from_lighting(&lighting, Vec3::Y);
        frag.shadow_positions[0] = ortho_position(0.5, 0.5, 0.9);
        let occluder = DepthImage::filled(4, 4, 0.1);
        let open = DepthImage::filled(4, 4, 1.0);
        let texel = Vec4::ONE;
        let occluder: &dyn DepthSampler = &occluder;
        let open: &dyn DepthSampler = &open;
        let shadowed = lit_color(&frag, Vec3::Y, &lighting, texel, [Some(occluder), None], false);
        let lit = lit_color(&frag, Vec3::Y, &lighting, texel, [Some(open), None], false);
        let unshadowed = lit_color(&frag, Vec3::Y, &lighting, texel, [None, None], false);
        assert!(shadowed.x < lit.x);
        assert_eq!(lit, unshadowed);
    }

    #[test]
    fn depth_image_rejects_mismatched_sizes() {
        assert!(DepthImage::new(2, 2, vec![0.0; 3]).is_none());
        assert!(DepthImage::new(2, 2, vec![0.0; 4]).is_some());
    }
}
