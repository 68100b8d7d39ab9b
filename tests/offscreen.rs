mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Vec3, Vec4Swizzles};
use parking_lot::Mutex;

use model_viewer::render::{ground_plane, light_view_projection, TextureData};
use model_viewer::{
    shadow_coverage, CameraParams, HeadlessGpu, LightSource, Lighting, Mesh, MeshPass,
    OffscreenView, RenderError, RenderPass, ShadowMap, ShadowPass, TargetSize,
};

fn slanted_light() -> Lighting {
    Lighting::default().with_sources(vec![LightSource {
        direction: Vec3::new(1.0, 1.0, 0.0),
        ..LightSource::default()
    }])
}

fn floor(gpu: &HeadlessGpu, half_extent: f32, y: f32) -> Arc<Mesh> {
    let (vertices, indices) = ground_plane(half_extent, y);
    Arc::new(Mesh::from_vertices(&gpu.device, "floor", &vertices, &indices).unwrap())
}

fn pixel_at(pixels: &[u8], size: TargetSize, camera: &CameraParams, world: Vec3) -> [u8; 4] {
    let clip = camera.view_proj * world.extend(1.0);
    let ndc = clip.xyz() / clip.w;
    let x = (((ndc.x * 0.5 + 0.5) * size.width as f32) as u32).min(size.width - 1);
    let y = (((0.5 - ndc.y * 0.5) * size.height as f32) as u32).min(size.height - 1);
    let offset = ((y * size.width + x) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

#[test]
fn completion_fires_once_with_target_sized_texture() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let pass = MeshPass::new(
        &gpu.device,
        &gpu.queue,
        Lighting::default(),
        vec![floor(gpu, 1.0, 0.0)],
        Vec::new(),
    );
    let view = OffscreenView::new(&gpu.device, TargetSize::new(64, 48), vec![Box::new(pass)])
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(Mutex::new(None));
    {
        let calls = Arc::clone(&calls);
        let delivered = Arc::clone(&delivered);
        view.render_with_completion(
            &gpu.device,
            &gpu.queue,
            gpu.encoder("completion-test"),
            move |texture| {
                calls.fetch_add(1, Ordering::SeqCst);
                *delivered.lock() = Some((texture.width(), texture.height()));
            },
        );
    }
    gpu.device
        .poll(wgpu::PollType::wait_indefinitely())
        .unwrap();
    gpu.device
        .poll(wgpu::PollType::wait_indefinitely())
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*delivered.lock(), Some((64, 48)));
}

#[test]
fn future_resolves_with_cleared_frame() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let clear = wgpu::Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    let pass = MeshPass::new(&gpu.device, &gpu.queue, Lighting::default(), Vec::new(), Vec::new())
        .with_clear_color(clear);
    let size = TargetSize::new(16, 8);
    let view = OffscreenView::new(&gpu.device, size, vec![Box::new(pass)]).unwrap();

    let frame = view
        .render(&gpu.device, &gpu.queue, gpu.encoder("future-test"))
        .wait(&gpu.device)
        .unwrap();
    assert_eq!(frame.size, size);
    let pixels = frame.read_rgba(&gpu.device, &gpu.queue).unwrap();
    assert_eq!(pixels.len(), 16 * 8 * 4);
    assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));
}

#[test]
fn resize_changes_delivered_size() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let pass = MeshPass::new(&gpu.device, &gpu.queue, Lighting::default(), Vec::new(), Vec::new());
    let mut view =
        OffscreenView::new(&gpu.device, TargetSize::square(8), vec![Box::new(pass)]).unwrap();
    view.resize(&gpu.device, TargetSize::new(20, 10)).unwrap();
    assert!(matches!(
        view.resize(&gpu.device, TargetSize::new(0, 10)),
        Err(RenderError::ZeroTarget { .. })
    ));

    let frame = view
        .render(&gpu.device, &gpu.queue, gpu.encoder("resize-test"))
        .wait(&gpu.device)
        .unwrap();
    assert_eq!((frame.texture.width(), frame.texture.height()), (20, 10));
}

#[test]
fn zero_sized_view_is_rejected() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let result = OffscreenView::new(&gpu.device, TargetSize::new(32, 0), Vec::new());
    assert!(matches!(
        result,
        Err(RenderError::ZeroTarget {
            width: 32,
            height: 0
        })
    ));
}

#[test]
fn main_pass_samples_depth_written_by_earlier_shadow_pass() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let lighting = slanted_light();
    let receiver = floor(gpu, 2.0, -0.5);
    let caster = floor(gpu, 0.5, 0.5);
    let meshes = vec![Arc::clone(&receiver), Arc::clone(&caster)];

    let map = Arc::new(ShadowMap::new(
        &gpu.device,
        256,
        light_view_projection(lighting.sources[0].direction, 2.5),
    ));
    let shadow = ShadowPass::new(&gpu.device, Arc::clone(&map), meshes.clone());
    let main = MeshPass::new(
        &gpu.device,
        &gpu.queue,
        lighting.clone(),
        meshes,
        vec![Arc::clone(&map)],
    );
    let size = TargetSize::square(128);
    let camera = CameraParams::look_at(
        Vec3::new(0.0, 3.0, 4.0),
        Vec3::new(0.0, -0.5, 0.0),
        45.0,
        size.aspect(),
    );
    main.set_camera(camera.clone());
    let passes: Vec<Box<dyn RenderPass>> = vec![Box::new(shadow), Box::new(main)];
    let view = OffscreenView::new(&gpu.device, size, passes).unwrap();

    let frame = view
        .render(&gpu.device, &gpu.queue, gpu.encoder("shadow-test"))
        .wait(&gpu.device)
        .unwrap();

    // The caster sits above the origin; the light pushes its shadow toward -x.
    let shadowed = Vec3::new(-1.0, -0.5, 0.0);
    let open = Vec3::new(1.0, -0.5, 0.0);

    let depth = map.read_depth(&gpu.device, &gpu.queue).unwrap();
    let source = lighting.sources[0];
    let coverage = |point: Vec3| {
        shadow_coverage(
            map.view_proj() * point.extend(1.0),
            source.shadow_bias,
            Vec3::Y.dot(source.direction.normalize()),
            source.shadow_soften,
            lighting.shadow_sample_radius,
            &depth,
        )
    };
    assert!(
        coverage(shadowed) < coverage(open),
        "coverage under caster {} vs open floor {}",
        coverage(shadowed),
        coverage(open)
    );

    let pixels = frame.read_rgba(&gpu.device, &gpu.queue).unwrap();
    let dark = pixel_at(&pixels, size, &camera, shadowed);
    let lit = pixel_at(&pixels, size, &camera, open);
    assert!(dark[0] < lit[0], "shadowed {dark:?} vs lit {lit:?}");
}

#[test]
fn ignore_alpha_makes_transparent_texture_opaque() {
    let Some(gpu) = common::gpu() else {
        return;
    };
    let size = TargetSize::square(32);
    let camera = CameraParams::look_at(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO, 45.0, 1.0);
    let center = |ignore_alpha: bool| {
        let quad = floor(gpu, 1.0, 0.0);
        quad.make_texture_opacity_from_data(
            TextureData::solid_color([255, 255, 255, 0], "clear"),
            &gpu.device,
            &gpu.queue,
        )
        .wait()
        .unwrap();
        quad.set_ignore_texture_alpha(ignore_alpha);
        let pass = MeshPass::new(
            &gpu.device,
            &gpu.queue,
            Lighting::default(),
            vec![quad],
            Vec::new(),
        )
        .with_clear_color(wgpu::Color::BLACK);
        pass.set_camera(camera.clone());
        let view = OffscreenView::new(&gpu.device, size, vec![Box::new(pass)]).unwrap();
        let frame = view
            .render(&gpu.device, &gpu.queue, gpu.encoder("alpha-test"))
            .wait(&gpu.device)
            .unwrap();
        let pixels = frame.read_rgba(&gpu.device, &gpu.queue).unwrap();
        pixel_at(&pixels, size, &camera, Vec3::ZERO)
    };

    let blended = center(false);
    let opaque = center(true);
    assert_eq!(&blended[..3], &[0, 0, 0]);
    assert!(opaque[0] > 0);
    assert_eq!(opaque[3], 255);
}
