use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Maximum number of directional lights evaluated per fragment.
pub const MAX_LIGHTS: usize = 4;
/// Number of lights that may cast shadows (one shadow map each).
pub const MAX_SHADOW_CASTERS: usize = 2;

/// Surface response used by meshes without per-vertex material data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
    pub specular_power: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::splat(0.6),
            diffuse_color: Vec3::splat(0.6),
            specular_color: Vec3::ONE,
            specular_power: 100.0,
        }
    }
}

/// Color of the light shared by every light source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            diffuse_color: Vec3::ONE,
            specular_color: Vec3::splat(0.5),
        }
    }
}

/// A directional light. `direction` points from the surface toward the light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSource {
    pub direction: Vec3,
    pub density: f32,
    pub specular: f32,
    pub shadow_bias: f32,
    pub shadow_soften: f32,
}

impl Default for LightSource {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.3, 1.0, 0.6),
            density: 1.0,
            specular: 0.6,
            shadow_bias: 0.002,
            shadow_soften: 1.0,
        }
    }
}

/// Lighting setup handed to the shading library.
///
/// Immutable once a pass is built; build a new pass to change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lighting {
    pub material: Material,
    pub light: Light,
    pub sources: Vec<LightSource>,
    pub ambient_density: f32,
    pub shadow_sample_radius: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            material: Material::default(),
            light: Light::default(),
            sources: vec![LightSource::default()],
            ambient_density: 0.3,
            shadow_sample_radius: 1.0,
        }
    }
}

impl Lighting {
    /// Light sources actually evaluated by the shaders.
    pub fn active_sources(&self) -> &[LightSource] {
        let count = self.sources.len().min(MAX_LIGHTS);
        &self.sources[..count]
    }

    pub fn with_sources(mut self, sources: Vec<LightSource>) -> Self {
        if sources.len() > MAX_LIGHTS {
            log::warn!(
                "{} light sources configured; only the first {MAX_LIGHTS} are shaded",
                sources.len()
            );
        }
        self.sources = sources;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_viewer_constants() {
        let material = Material::default();
        assert_eq!(material.ambient_color, Vec3::splat(0.6));
        assert_eq!(material.specular_power, 100.0);
        let light = Light::default();
        assert_eq!(light.specular_color, Vec3::splat(0.5));
    }

    #[test]
    fn extra_sources_are_ignored() {
        let lighting = Lighting::default().with_sources(vec![LightSource::default(); 6]);
        assert_eq!(lighting.sources.len(), 6);
        assert_eq!(lighting.active_sources().len(), MAX_LIGHTS);
    }
}
