use anyhow::{Context, Result};
use log::{error, info};

/// Device and queue without a surface, for offscreen rendering and tests.
pub struct HeadlessGpu {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl HeadlessGpu {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;
        device.set_device_lost_callback(|reason, message| {
            error!("GPU device lost ({reason:?}): {message}");
        });

        let adapter_info = adapter.get_info();
        info!(
            "using {} ({:?}) for offscreen rendering",
            adapter_info.name, adapter_info.backend
        );
        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Blocking form of [`HeadlessGpu::new`].
    pub fn blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}
