use bytemuck::{Pod, Zeroable};

use crate::error::VisResult;

pub const TEXTURE_UNITS: usize = 4;
pub const ALBUM_ART_UNIT: usize = 0;
pub const ANALYSER_L_UNIT: usize = 1;
pub const ANALYSER_R_UNIT: usize = 2;
pub const ANALYSER_M_UNIT: usize = 3;

/// Fullscreen triangle; two of its corners sit outside the viewport.
pub const FULLSCREEN_TRIANGLE: [[f32; 2]; 3] = [[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// One byte per texel
    Luminance8,
    /// Four bytes per texel, sRGB
    Rgba8,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Luminance8 => 1,
            TextureFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
    /// Linear within a level, nearest level
    LinearMipmapNearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap: Wrap,
    pub mipmaps: bool,
}

impl Sampling {
    pub const NEAREST_CLAMP: Sampling = Sampling {
        min_filter: Filter::Nearest,
        mag_filter: Filter::Nearest,
        wrap: Wrap::ClampToEdge,
        mipmaps: false,
    };

    pub const MIPMAPPED_REPEAT: Sampling = Sampling {
        min_filter: Filter::LinearMipmapNearest,
        mag_filter: Filter::Nearest,
        wrap: Wrap::Repeat,
        mipmaps: true,
    };
}

pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub sampling: Sampling,
    /// Level 0 texels, tightly packed, bottom row first
    pub data: &'a [u8],
}

/// Scalar uniforms shared by every program. Programs that do not reference a
/// field simply ignore it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub width: f32,
    pub height: f32,
    pub buffer_length: f32,
    pub rms_l: f32,
    pub rms_r: f32,
    pub rms_m: f32,
    pub _padding: [f32; 2],
}

pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub vertex_buffer: BufferId,
    pub vertex_count: u32,
    pub uniforms: &'a FrameUniforms,
    pub textures: [TextureId; TEXTURE_UNITS],
    pub clear_color: [f64; 4],
}

/// GPU object management as seen by the visualizer.
///
/// Objects are referred to by id; the backend owns the underlying resources
/// until they are deleted.
pub trait GpuBackend {
    /// Compile both stages and link them into a program.
    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> VisResult<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[[f32; 2]]) -> VisResult<BufferId>;

    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> VisResult<TextureId>;

    /// Replace level 0 of an existing texture. `data` must match its size.
    fn write_texture(&mut self, texture: TextureId, data: &[u8]) -> VisResult<()>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Clear the surface and issue one draw.
    fn draw(&mut self, call: &DrawCall<'_>) -> VisResult<()>;

    fn surface_size(&self) -> (u32, u32);
}
