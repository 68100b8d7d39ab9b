//! Texture loading, GPU upload and per-mesh texture slots.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

use futures::channel::oneshot;
use log::{debug, error, warn};
use parking_lot::RwLock;

use crate::error::TextureError;

pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded RGBA8 pixels ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Decodes an image file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self::from_image(image, name)
    }

    /// Decodes an encoded image (PNG, JPEG) held in memory.
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            path: PathBuf::from(name),
            source,
        })?;
        Self::from_image(image, name.to_string())
    }

    fn from_image(image: image::DynamicImage, name: String) -> Result<Self, TextureError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty { name });
        }
        Ok(Self {
            width,
            height,
            data: rgba.into_raw(),
            name,
        })
    }

    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Tangent-space normal pointing straight out of the surface.
    pub fn flat_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "flat-normal")
    }

    /// Checks the pixels can be uploaded as a texture no wider or taller
    /// than `max_dimension`.
    pub fn validate(&self, max_dimension: u32) -> Result<(), TextureError> {
        if self.width == 0 || self.height == 0 {
            return Err(TextureError::Empty {
                name: self.name.clone(),
            });
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(TextureError::TooLarge {
                name: self.name.clone(),
                width: self.width,
                height: self.height,
                max: max_dimension,
            });
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .unwrap_or(usize::MAX);
        if self.data.len() != expected {
            return Err(TextureError::DataLength {
                name: self.name.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Texture resident on the device.
#[derive(Debug)]
pub struct GpuTexture {
    id: u64,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub name: String,
}

impl GpuTexture {
    /// Creates the texture and queues the pixel upload. The upload lands
    /// with the next queue submission.
    pub fn create(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Self {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.name),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            view,
            width: data.width,
            height: data.height,
            name: data.name.clone(),
        }
    }

    /// Creates the texture and blocks until the GPU has received the pixels.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &TextureData,
    ) -> Result<Self, TextureError> {
        let texture = Self::create(device, queue, data);
        let submission = queue.submit(std::iter::empty());
        device.poll(wgpu::PollType::Wait {
            submission_index: Some(submission),
            timeout: None,
        })?;
        Ok(texture)
    }

    /// Process-unique identifier, stable for the texture's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Which material texture a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Diffuse color; its alpha channel is the surface opacity.
    Opacity,
    /// Tangent-space normal map.
    Bump,
}

impl TextureKind {
    pub fn label(self) -> &'static str {
        match self {
            TextureKind::Opacity => "opacity",
            TextureKind::Bump => "bump",
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    committed: u64,
    texture: Option<Arc<GpuTexture>>,
}

/// Texture bound to one material slot of a mesh.
///
/// Every load request takes a ticket when issued. A finished upload only
/// replaces the bound texture if no later request has committed first, so
/// overlapping loads settle on the most recently issued one.
#[derive(Debug)]
pub struct TextureSlot {
    kind: TextureKind,
    tickets: AtomicU64,
    state: RwLock<SlotState>,
}

impl TextureSlot {
    pub fn new(kind: TextureKind) -> Self {
        Self {
            kind,
            tickets: AtomicU64::new(0),
            state: RwLock::new(SlotState::default()),
        }
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Texture currently bound, if any upload has completed.
    pub fn current(&self) -> Option<Arc<GpuTexture>> {
        self.state.read().texture.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.state.read().texture.is_some()
    }

    fn issue(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn commit(&self, ticket: u64, texture: Option<Arc<GpuTexture>>) -> bool {
        let mut state = self.state.write();
        if ticket <= state.committed {
            return false;
        }
        state.committed = ticket;
        state.texture = texture;
        true
    }

    /// Loads `source` on a worker thread and binds it once uploaded.
    pub(crate) fn load(
        self: &Arc<Self>,
        source: TextureSource,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> TextureUpload {
        let ticket = self.issue();
        let (sender, receiver) = oneshot::channel();
        let slot = Arc::clone(self);
        let device = device.clone();
        let queue = queue.clone();
        let kind = self.kind;
        let max_dimension = device.limits().max_texture_dimension_2d;

        let spawned = thread::Builder::new()
            .name(format!("{}-texture-upload", kind.label()))
            .spawn(move || {
                let result = source
                    .decode(max_dimension)
                    .and_then(|data| GpuTexture::upload(&device, &queue, &data))
                    .map(Arc::new);
                let outcome = match result {
                    Ok(texture) => {
                        if slot.commit(ticket, Some(Arc::clone(&texture))) {
                            debug!("bound {} texture {}", kind.label(), texture.name);
                        } else {
                            debug!(
                                "{} texture {} superseded by a later request",
                                kind.label(),
                                texture.name
                            );
                        }
                        Ok(texture)
                    }
                    Err(err) => {
                        warn!("failed to load {} texture: {err}", kind.label());
                        slot.commit(ticket, None);
                        Err(err)
                    }
                };
                let _ = sender.send(outcome);
            });
        if let Err(err) = spawned {
            error!("unable to start {} texture upload: {err}", kind.label());
        }
        TextureUpload { receiver }
    }
}

/// Where a texture load reads its pixels from.
#[derive(Debug, Clone)]
pub(crate) enum TextureSource {
    Path(PathBuf),
    Decoded(TextureData),
}

impl TextureSource {
    fn decode(self, max_dimension: u32) -> Result<TextureData, TextureError> {
        let data = match self {
            TextureSource::Path(path) => TextureData::from_file(path)?,
            TextureSource::Decoded(data) => data,
        };
        data.validate(max_dimension)?;
        Ok(data)
    }
}

/// Completion of an asynchronous texture load.
///
/// Resolves once the texture is on the device and the slot has been
/// updated. Dropping it does not cancel the load.
#[derive(Debug)]
pub struct TextureUpload {
    receiver: oneshot::Receiver<Result<Arc<GpuTexture>, TextureError>>,
}

impl TextureUpload {
    pub(crate) fn failed(err: TextureError) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(err));
        Self { receiver }
    }

    /// Blocks the calling thread until the load finishes.
    pub fn wait(self) -> Result<Arc<GpuTexture>, TextureError> {
        pollster::block_on(self)
    }
}

impl Future for TextureUpload {
    type Output = Result<Arc<GpuTexture>, TextureError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TextureError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_normal_points_out_of_surface() {
        let data = TextureData::flat_normal();
        assert_eq!((data.width, data.height), (1, 1));
        assert_eq!(data.data, vec![128, 128, 255, 255]);
    }

    #[test]
    fn undecodable_bytes_are_reported() {
        let err = TextureData::from_bytes(b"not an image", "broken.png").unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }

    #[test]
    fn decodes_png_in_memory() {
        let mut encoded = Vec::new();
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 40]));
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();
        let data = TextureData::from_bytes(&encoded, "pixel.png").unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(&data.data[..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn short_pixel_buffer_is_rejected() {
        let data = TextureData {
            width: 4,
            height: 4,
            data: vec![255; 12],
            name: "short".to_string(),
        };
        let err = TextureSource::Decoded(data).decode(8192).unwrap_err();
        assert!(matches!(
            err,
            TextureError::DataLength {
                expected: 64,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn oversized_texture_is_rejected_before_upload() {
        let data = TextureData {
            width: 17,
            height: 2,
            data: vec![0; 17 * 2 * 4],
            name: "wide".to_string(),
        };
        assert!(data.validate(17).is_ok());
        let err = TextureSource::Decoded(data).decode(16).unwrap_err();
        assert!(matches!(
            err,
            TextureError::TooLarge {
                width: 17,
                height: 2,
                max: 16,
                ..
            }
        ));
    }

    #[test]
    fn zero_area_is_still_empty() {
        let data = TextureData {
            width: 0,
            height: 3,
            data: Vec::new(),
            name: "none".to_string(),
        };
        assert!(matches!(
            data.validate(8192),
            Err(TextureError::Empty { .. })
        ));
    }

    #[test]
    fn later_ticket_wins_regardless_of_completion_order() {
        let slot = TextureSlot::new(TextureKind::Opacity);
        let first = slot.issue();
        let second = slot.issue();
        assert!(slot.commit(second, None));
        assert!(!slot.commit(first, None));
        assert!(!slot.is_bound());
    }

    #[test]
    fn failed_upload_future_resolves_with_error() {
        let upload = TextureUpload::failed(TextureError::NoTexCoords { layout: "plain" });
        assert!(matches!(upload.wait(), Err(TextureError::NoTexCoords { .. })));
    }
}
