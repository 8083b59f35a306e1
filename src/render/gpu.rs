use serde::Deserialize;

use crate::error::{VisError, VisResult};

/// Adapter selection for the offscreen device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    LowPower,
    HighPerformance,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GpuOptions {
    #[serde(default)]
    pub power: PowerMode,
    /// Accept a software rasterizer when no hardware adapter is present
    #[serde(default)]
    pub allow_software: bool,
}

/// Headless device and queue the visualizer renders with.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter: wgpu::AdapterInfo,
    max_texture_size: u32,
}

impl GpuContext {
    pub fn new(options: GpuOptions) -> VisResult<Self> {
        pollster::block_on(Self::request(options))
    }

    async fn request(options: GpuOptions) -> VisResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let power_preference = match options.power {
            PowerMode::LowPower => wgpu::PowerPreference::LowPower,
            PowerMode::HighPerformance => wgpu::PowerPreference::HighPerformance,
        };
        let mut adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        if adapter.is_none() && options.allow_software {
            log::warn!("No hardware adapter, falling back to software rendering");
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await;
        }
        let adapter = adapter.ok_or_else(|| VisError::Gpu("no suitable GPU adapter".into()))?;

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        // Analysis textures are one row of up to 8192 texels.
        let limits = wgpu::Limits::default().using_resolution(adapter.limits());
        let max_texture_size = limits.max_texture_dimension_2d;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("asa_vis_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| VisError::Gpu(format!("device request failed: {}", e)))?;

        Ok(Self {
            device,
            queue,
            adapter: info,
            max_texture_size,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter
    }

    /// Largest width or height a texture on this device may have.
    pub fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }
}
