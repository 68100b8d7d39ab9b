use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Color format of offscreen targets and of the delivered frame.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Depth format of offscreen targets and shadow maps.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Drawable size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub(crate) fn validate(self) -> Result<Self, RenderError> {
        if self.is_empty() {
            return Err(RenderError::ZeroTarget {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Color and depth attachments shared by the passes of an offscreen view.
#[derive(Debug)]
pub struct RenderTarget {
    size: TargetSize,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl RenderTarget {
    pub(crate) fn create(device: &wgpu::Device, size: TargetSize) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-color"),
            size: size.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-depth"),
            size: size.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            size,
            color,
            color_view,
            _depth: depth,
            depth_view,
        }
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_targets_are_rejected() {
        assert!(matches!(
            TargetSize::new(0, 64).validate(),
            Err(RenderError::ZeroTarget { width: 0, height: 64 })
        ));
        assert_eq!(TargetSize::square(32).validate().unwrap(), TargetSize::new(32, 32));
    }
}
