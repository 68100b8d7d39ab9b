use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::info;

use model_viewer::render::{ground_plane, light_view_projection, unit_cube};
use model_viewer::{
    load_obj, HeadlessGpu, Mesh, MeshPass, MeshRotation, ObjMesh, OffscreenView, RenderPass,
    ShadowMap, ShadowPass, TargetSize, ViewerConfig, MAX_SHADOW_CASTERS,
};

const USAGE: &str = "Usage: model-viewer <model.obj|--cube> [--output PATH] [--size N] \
[--texture PATH] [--bump PATH] [--angle RADIANS] [--ignore-alpha] [--summary-only] [--config DIR]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let mut config = ViewerConfig::load_from(&options.config_dir)?;
    if let Some(size) = options.size {
        config.render.target_size = size;
    }

    let mut model = match &options.model {
        ModelSource::Cube => {
            let (vertices, indices) = unit_cube();
            ObjMesh {
                vertices,
                indices,
                has_tex_coords: true,
            }
        }
        ModelSource::Obj(path) => load_obj(path)?,
    };
    model.fit_to_radius(1.0);
    print_summary(&options, &config, &model);

    if options.summary_only {
        return Ok(());
    }

    let gpu = HeadlessGpu::blocking()?;
    render_to_png(&gpu, &config, &options, &model)
}

fn print_summary(options: &CliOptions, config: &ViewerConfig, model: &ObjMesh) {
    println!(
        "Loaded {} with {} vertices and {} triangles",
        options.model,
        model.vertices.len(),
        model.triangle_count()
    );
    println!(
        "Texture coordinates: {}",
        if model.has_tex_coords { "yes" } else { "no" }
    );
    let lighting = config.lighting();
    println!(
        "Lights: {} ({} casting shadows)",
        lighting.active_sources().len(),
        shadow_caster_count(config)
    );
}

fn shadow_caster_count(config: &ViewerConfig) -> usize {
    config
        .lighting
        .shadow_casters
        .min(MAX_SHADOW_CASTERS)
        .min(config.lighting().active_sources().len())
}

fn render_to_png(
    gpu: &HeadlessGpu,
    config: &ViewerConfig,
    options: &CliOptions,
    model: &ObjMesh,
) -> Result<()> {
    let device = &gpu.device;
    let queue = &gpu.queue;

    let subject = Arc::new(
        Mesh::from_vertices(device, "model", &model.vertices, &model.indices)
            .context("model geometry is not drawable")?,
    );
    subject.apply_rotation(&MeshRotation::new(Vec3::Y, options.angle));
    subject.set_ignore_texture_alpha(options.ignore_alpha);

    let (floor_vertices, floor_indices) = ground_plane(2.0, -1.05);
    let floor = Arc::new(
        Mesh::from_vertices(device, "floor", &floor_vertices, &floor_indices)
            .context("floor geometry is not drawable")?,
    );

    if let Some(path) = &options.texture {
        if let Err(err) = subject.make_texture_opacity(path, device, queue).wait() {
            eprintln!("Continuing without texture: {err}");
        }
    }
    if let Some(path) = &options.bump {
        if let Err(err) = subject.make_texture_bump(path, device, queue).wait() {
            eprintln!("Continuing without bump map: {err}");
        }
    }

    let meshes = vec![Arc::clone(&floor), Arc::clone(&subject)];
    let lighting = config.lighting();
    let mut passes: Vec<Box<dyn RenderPass>> = Vec::new();
    let mut shadow_maps = Vec::new();
    for source in lighting
        .active_sources()
        .iter()
        .take(shadow_caster_count(config))
    {
        let map = Arc::new(ShadowMap::new(
            device,
            config.render.shadow_map_size,
            light_view_projection(source.direction, config.render.scene_radius),
        ));
        passes.push(Box::new(ShadowPass::new(device, Arc::clone(&map), meshes.clone())));
        shadow_maps.push(map);
    }

    let main_pass = MeshPass::new(device, queue, lighting, meshes, shadow_maps)
        .with_clear_color(config.render.clear_color());
    main_pass.set_camera(config.camera());
    passes.push(Box::new(main_pass));

    let size: TargetSize = config.render.target_size();
    let view = OffscreenView::new(device, size, passes)?;
    let frame = view.render(device, queue, gpu.encoder("viewer-frame")).wait(device)?;
    let pixels = frame.read_rgba(device, queue)?;

    let image = image::RgbaImage::from_raw(size.width, size.height, pixels)
        .ok_or_else(|| anyhow!("rendered frame does not match {}x{}", size.width, size.height))?;
    image
        .save(&options.output)
        .with_context(|| format!("failed to write {}", options.output.display()))?;
    info!("rendered {} passes into {}", view.passes().len(), options.output.display());
    println!(
        "Wrote {}x{} frame to {}",
        size.width,
        size.height,
        options.output.display()
    );
    Ok(())
}

enum ModelSource {
    Cube,
    Obj(PathBuf),
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Cube => write!(f, "built-in cube"),
            ModelSource::Obj(path) => write!(f, "{}", path.display()),
        }
    }
}

struct CliOptions {
    model: ModelSource,
    output: PathBuf,
    size: Option<u32>,
    texture: Option<PathBuf>,
    bump: Option<PathBuf>,
    angle: f32,
    ignore_alpha: bool,
    summary_only: bool,
    config_dir: PathBuf,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(first) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let model = match first.as_str() {
            "--cube" => ModelSource::Cube,
            flag if flag.starts_with("--") => return Err(anyhow!(USAGE)),
            path => ModelSource::Obj(PathBuf::from(path)),
        };

        let mut options = Self {
            model,
            output: PathBuf::from("render.png"),
            size: None,
            texture: None,
            bump: None,
            angle: 0.0,
            ignore_alpha: false,
            summary_only: false,
            config_dir: PathBuf::from("config"),
        };
        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{name} expects a value"))
            };
            match arg.as_str() {
                "--output" => options.output = PathBuf::from(value("--output")?),
                "--size" => {
                    let size = value("--size")?
                        .parse::<u32>()
                        .context("--size expects a positive integer")?;
                    options.size = Some(size);
                }
                "--texture" => options.texture = Some(PathBuf::from(value("--texture")?)),
                "--bump" => options.bump = Some(PathBuf::from(value("--bump")?)),
                "--angle" => {
                    options.angle = value("--angle")?
                        .parse::<f32>()
                        .context("--angle expects radians")?;
                }
                "--config" => options.config_dir = PathBuf::from(value("--config")?),
                "--ignore-alpha" => options.ignore_alpha = true,
                "--summary-only" => options.summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }
}
