use std::collections::HashMap;

use image::imageops::FilterType;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::backend::{
    BufferId, DrawCall, Filter, FrameUniforms, GpuBackend, ProgramId, Sampling, TextureDesc, TextureFormat, TextureId,
    Wrap, ALBUM_ART_UNIT, ANALYSER_L_UNIT, ANALYSER_M_UNIT, ANALYSER_R_UNIT,
};
use super::frame::{FrameTarget, TARGET_FORMAT};
use super::gpu::GpuContext;
use crate::error::{VisError, VisResult};

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    format: TextureFormat,
}

/// [`GpuBackend`] over wgpu, drawing into an offscreen [`FrameTarget`].
pub struct WgpuBackend {
    gpu: GpuContext,
    target: FrameTarget,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    next_id: u64,
    programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, GpuTexture>,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext, width: u32, height: u32) -> Self {
        let device = &gpu.device;
        let target = FrameTarget::new(device, width, height);

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("visualizer_bind_group_layout"),
            entries: &[
                // @binding(0): FrameUniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // @binding(1..=2): album art
                texture_entry(1),
                sampler_entry(2),
                // @binding(3..=5): left/right/mono analysis, @binding(6): their sampler
                texture_entry(3),
                texture_entry(4),
                texture_entry(5),
                sampler_entry(6),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("visualizer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            gpu,
            target,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            next_id: 1,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// RGBA pixels of the last drawn frame, top row first.
    pub fn read_pixels(&self) -> VisResult<Vec<u8>> {
        self.target.read_pixels(&self.gpu)
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, id: TextureId) -> VisResult<&GpuTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| VisError::Gpu(format!("unknown texture {:?}", id)))
    }

    fn write_level(&self, texture: &GpuTexture, level: u32, width: u32, height: u32, data: &[u8]) {
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * texture.format.bytes_per_texel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Luminance8 => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear | Filter::LinearMipmapNearest => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn sampler_descriptor(label: &str, sampling: Sampling) -> wgpu::SamplerDescriptor<'_> {
    wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: address_mode(sampling.wrap),
        address_mode_v: address_mode(sampling.wrap),
        address_mode_w: address_mode(sampling.wrap),
        mag_filter: filter_mode(sampling.mag_filter),
        min_filter: filter_mode(sampling.min_filter),
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

/// Levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Successively halved RGBA levels below level 0.
pub fn rgba_mip_chain(level0: &RgbaImage) -> Vec<RgbaImage> {
    let mut levels = Vec::new();
    let (mut width, mut height) = level0.dimensions();
    let mut current = level0.clone();
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        current = image::imageops::resize(&current, width, height, FilterType::Triangle);
        levels.push(current.clone());
    }
    levels
}

impl GpuBackend for WgpuBackend {
    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> VisResult<ProgramId> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(vertex.into()),
        });
        let fs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(fragment.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vs,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fs,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(VisError::ShaderCompile {
                program: label.to_string(),
                message: error.to_string(),
            });
        }

        let id = ProgramId(self.next());
        self.programs.insert(id, pipeline);
        log::debug!("Compiled program '{}' as {:?}", label, id);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Deleting unknown program {:?}", program);
        }
    }

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[[f32; 2]]) -> VisResult<BufferId> {
        let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let id = BufferId(self.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(buffer) => buffer.destroy(),
            None => log::warn!("Deleting unknown buffer {:?}", buffer),
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> VisResult<TextureId> {
        let expected = (desc.width * desc.height * desc.format.bytes_per_texel()) as usize;
        if desc.width == 0 || desc.height == 0 || desc.data.len() != expected {
            return Err(VisError::Gpu(format!(
                "texture '{}': {}x{} needs {} bytes, got {}",
                desc.label,
                desc.width,
                desc.height,
                expected,
                desc.data.len()
            )));
        }

        let max = self.gpu.max_texture_size();
        if desc.width > max || desc.height > max {
            return Err(VisError::Gpu(format!(
                "texture '{}': {}x{} exceeds the device limit of {}",
                desc.label, desc.width, desc.height, max
            )));
        }

        // Mip chains are only built for RGBA art.
        let mipmapped = desc.sampling.mipmaps && desc.format == TextureFormat::Rgba8;
        let mip_level_count = if mipmapped {
            mip_level_count(desc.width, desc.height)
        } else {
            1
        };

        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self
            .gpu
            .device
            .create_sampler(&sampler_descriptor(desc.label, desc.sampling));
        let gpu_texture = GpuTexture {
            texture,
            view,
            sampler,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        };

        self.write_level(&gpu_texture, 0, desc.width, desc.height, desc.data);
        if mipmapped {
            let level0 = RgbaImage::from_raw(desc.width, desc.height, desc.data.to_vec())
                .ok_or_else(|| VisError::Gpu(format!("texture '{}': bad RGBA data", desc.label)))?;
            for (i, level) in rgba_mip_chain(&level0).iter().enumerate() {
                self.write_level(&gpu_texture, i as u32 + 1, level.width(), level.height(), level.as_raw());
            }
        }

        let id = TextureId(self.next());
        self.textures.insert(id, gpu_texture);
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[u8]) -> VisResult<()> {
        let target = self.texture(texture)?;
        let expected = (target.width * target.height * target.format.bytes_per_texel()) as usize;
        if data.len() != expected {
            return Err(VisError::Gpu(format!(
                "texture write of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        self.write_level(target, 0, target.width, target.height, data);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(t) => t.texture.destroy(),
            None => log::warn!("Deleting unknown texture {:?}", texture),
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> VisResult<()> {
        let pipeline = self
            .programs
            .get(&call.program)
            .ok_or_else(|| VisError::Gpu(format!("unknown program {:?}", call.program)))?;
        let vertex_buffer = self
            .buffers
            .get(&call.vertex_buffer)
            .ok_or_else(|| VisError::Gpu(format!("unknown buffer {:?}", call.vertex_buffer)))?;
        let art = self.texture(call.textures[ALBUM_ART_UNIT])?;
        let left = self.texture(call.textures[ANALYSER_L_UNIT])?;
        let right = self.texture(call.textures[ANALYSER_R_UNIT])?;
        let mono = self.texture(call.textures[ANALYSER_M_UNIT])?;

        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(call.uniforms));

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("visualizer_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&art.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&art.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&left.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&right.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&mono.view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&left.sampler),
                },
            ],
        });

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let [r, g, b, a] = call.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("visualizer_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..call.vertex_count, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.target.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_reach_one_texel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(512, 64), 10);
    }

    #[test]
    fn mip_chain_halves_each_level() {
        let level0 = RgbaImage::from_pixel(8, 2, image::Rgba([200, 100, 50, 255]));
        let sizes: Vec<(u32, u32)> = rgba_mip_chain(&level0).iter().map(|l| l.dimensions()).collect();
        assert_eq!(sizes, vec![(4, 1), (2, 1), (1, 1)]);
        assert_eq!(sizes.len() as u32 + 1, mip_level_count(8, 2));
    }

    #[test]
    fn sampling_maps_to_wgpu_filters() {
        let desc = sampler_descriptor("art", Sampling::MIPMAPPED_REPEAT);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);

        let desc = sampler_descriptor("art", Sampling::NEAREST_CLAMP);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_v, wgpu::AddressMode::ClampToEdge);
    }
}
