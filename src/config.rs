//! Viewer configuration.
//!
//! Sources, lowest priority first:
//! 1. `config/default.toml`
//! 2. `config/user.toml`
//! 3. Environment variables (`VIEWER_SECTION__KEY`)

use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::material::{Light, LightSource, Lighting, Material};
use crate::render::{CameraParams, TargetSize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub render: RenderConfig,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub material: Material,
    pub light: Light,
}

impl ViewerConfig {
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Missing files are skipped; a present but malformed file is an error.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();
        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }
        // VIEWER_RENDER__TARGET_SIZE=512 -> render.target_size = 512
        figment = figment.merge(Env::prefixed("VIEWER_").split("__"));

        figment
            .extract()
            .with_context(|| format!("invalid viewer configuration in {}", config_dir.display()))
    }

    pub fn lighting(&self) -> Lighting {
        Lighting {
            material: self.material,
            light: self.light,
            ambient_density: self.lighting.ambient_density,
            shadow_sample_radius: self.lighting.shadow_sample_radius,
            ..Lighting::default()
        }
        .with_sources(self.lighting.sources.clone())
    }

    pub fn camera(&self) -> CameraParams {
        let size = self.render.target_size();
        CameraParams::look_at(
            Vec3::from(self.camera.position),
            Vec3::from(self.camera.target),
            self.camera.fov,
            size.aspect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Edge length of the square offscreen target.
    pub target_size: u32,
    pub shadow_map_size: u32,
    pub clear_color: [f64; 4],
    /// Radius of the sphere the shadow projections must cover.
    pub scene_radius: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_size: 512,
            shadow_map_size: 1024,
            clear_color: [0.03, 0.03, 0.05, 1.0],
            scene_radius: 2.5,
        }
    }
}

impl RenderConfig {
    pub fn target_size(&self) -> TargetSize {
        TargetSize::square(self.target_size)
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 4.0],
            target: [0.0, 0.0, 0.0],
            fov: 45.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient_density: f32,
    pub shadow_sample_radius: f32,
    /// Number of leading light sources that render shadow maps.
    pub shadow_casters: usize,
    pub sources: Vec<LightSource>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        let lighting = Lighting::default();
        Self {
            ambient_density: lighting.ambient_density,
            shadow_sample_radius: lighting.shadow_sample_radius,
            shadow_casters: 1,
            sources: lighting.sources,
        }
    }
}
