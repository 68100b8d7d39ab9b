#![allow(dead_code)]

use once_cell::sync::Lazy;

use model_viewer::HeadlessGpu;

static GPU: Lazy<Option<HeadlessGpu>> = Lazy::new(|| match HeadlessGpu::blocking() {
    Ok(gpu) => Some(gpu),
    Err(err) => {
        eprintln!("skipping GPU tests: {err:#}");
        None
    }
});

/// Shared device for the GPU tests, `None` on machines without an adapter.
pub fn gpu() -> Option<&'static HeadlessGpu> {
    GPU.as_ref()
}

/// Encodes an RGBA image as PNG bytes.
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut encoded = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
        .expect("encode png");
    encoded
}
