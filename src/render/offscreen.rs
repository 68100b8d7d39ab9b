use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use log::{debug, info, warn};

use crate::error::RenderError;

use super::pass::{out_of_order_reads, PassContext, RenderPass};
use super::target::{RenderTarget, TargetSize, COLOR_FORMAT};

/// Runs an ordered list of passes against an offscreen target and hands
/// the resulting color texture to the caller.
///
/// Passes run exactly in the order supplied. The device and queue are
/// borrowed per call; the view owns only its passes and target.
pub struct OffscreenView {
    target: RenderTarget,
    passes: Vec<Box<dyn RenderPass>>,
}

impl OffscreenView {
    pub fn new(
        device: &wgpu::Device,
        size: TargetSize,
        passes: Vec<Box<dyn RenderPass>>,
    ) -> Result<Self, RenderError> {
        let size = size.validate()?;
        for (name, resource) in out_of_order_reads(&passes) {
            warn!("pass {name} samples resource {resource} before the pass that renders it");
        }
        info!(
            "offscreen view {}x{} with passes [{}]",
            size.width,
            size.height,
            passes
                .iter()
                .map(|pass| pass.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            target: RenderTarget::create(device, size),
            passes,
        })
    }

    pub fn size(&self) -> TargetSize {
        self.target.size()
    }

    pub fn passes(&self) -> &[Box<dyn RenderPass>] {
        &self.passes
    }

    /// Recreates the target attachments. Frames already delivered are
    /// unaffected.
    pub fn resize(&mut self, device: &wgpu::Device, size: TargetSize) -> Result<(), RenderError> {
        let size = size.validate()?;
        if size != self.target.size() {
            self.target = RenderTarget::create(device, size);
        }
        Ok(())
    }

    /// Records every pass into `encoder`, copies the final color into a new
    /// texture and submits. The returned future resolves once the GPU has
    /// finished; the device must be polled for that to happen.
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: wgpu::CommandEncoder,
    ) -> RenderCompletion {
        let (sender, receiver) = oneshot::channel();
        self.render_with_completion(device, queue, encoder, move |texture| {
            let _ = sender.send(texture);
        });
        RenderCompletion {
            receiver,
            size: self.target.size(),
        }
    }

    /// Callback form of [`OffscreenView::render`]. `completion` runs once,
    /// after all GPU work of this call has finished.
    pub fn render_with_completion<F>(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mut encoder: wgpu::CommandEncoder,
        completion: F,
    ) -> wgpu::SubmissionIndex
    where
        F: FnOnce(wgpu::Texture) + Send + 'static,
    {
        let size = self.target.size();
        let mut ctx = PassContext {
            device,
            queue,
            encoder: &mut encoder,
            target: &self.target,
        };
        for pass in &self.passes {
            debug!("encoding pass {}", pass.name());
            pass.encode(&mut ctx);
        }

        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-frame"),
            size: size.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        encoder.copy_texture_to_texture(
            self.target.color_texture().as_image_copy(),
            output.as_image_copy(),
            size.extent(),
        );

        let submission = queue.submit(std::iter::once(encoder.finish()));
        queue.on_submitted_work_done(move || completion(output));
        submission
    }
}

/// Final color texture of one render.
#[derive(Debug)]
pub struct RenderedFrame {
    pub texture: wgpu::Texture,
    pub size: TargetSize,
}

impl RenderedFrame {
    /// Tightly packed RGBA8 rows, top row first.
    pub fn read_rgba(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<u8>, RenderError> {
        read_texture(
            device,
            queue,
            &self.texture,
            self.size,
            4,
            wgpu::TextureAspect::All,
        )
    }
}

/// Resolves with the rendered frame once the GPU work of a render is done.
#[derive(Debug)]
pub struct RenderCompletion {
    receiver: oneshot::Receiver<wgpu::Texture>,
    size: TargetSize,
}

impl RenderCompletion {
    /// Polls `device` until idle and returns the frame.
    pub fn wait(self, device: &wgpu::Device) -> Result<RenderedFrame, RenderError> {
        device.poll(wgpu::PollType::wait_indefinitely())?;
        pollster::block_on(self)
    }
}

impl Future for RenderCompletion {
    type Output = Result<RenderedFrame, RenderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let size = self.size;
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received
                .map(|texture| RenderedFrame { texture, size })
                .map_err(|_| RenderError::Abandoned)
        })
    }
}

/// Copies a whole texture into host memory, stripping row padding.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: TargetSize,
    bytes_per_pixel: u32,
    aspect: wgpu::TextureAspect,
) -> Result<Vec<u8>, RenderError> {
    let unpadded = size.width * bytes_per_pixel;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback-buffer"),
        size: u64::from(padded) * u64::from(size.height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(size.height),
            },
        },
        size.extent(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::PollType::wait_indefinitely())?;
    pollster::block_on(receiver).map_err(|_| RenderError::Abandoned)??;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * size.height) as usize);
    for row in mapped.chunks_exact(padded as usize) {
        pixels.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
