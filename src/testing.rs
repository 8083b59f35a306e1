//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::audio::element::AudioElement;
use crate::error::{VisError, VisResult};
use crate::render::backend::{
    BufferId, DrawCall, FrameUniforms, GpuBackend, ProgramId, Sampling, TextureDesc, TextureId, TEXTURE_UNITS,
};

/// Square wave at the highest representable frequency: every window has an
/// exact time-domain RMS equal to the channel amplitude.
pub struct ToneElement {
    amplitude: Mutex<(f32, f32)>,
    playing: AtomicBool,
}

impl ToneElement {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            amplitude: Mutex::new((left, right)),
            playing: AtomicBool::new(true),
        }
    }

    pub fn set_amplitude(&self, left: f32, right: f32) {
        *self.amplitude.lock().unwrap() = (left, right);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }
}

impl AudioElement for ToneElement {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn tap(&self, left: &mut [f32], right: &mut [f32]) {
        let (l, r) = *self.amplitude.lock().unwrap();
        let playing = self.is_playing();
        for (i, (ls, rs)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            *ls = if playing { l * sign } else { 0.0 };
            *rs = if playing { r * sign } else { 0.0 };
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub program: ProgramId,
    pub uniforms: FrameUniforms,
    pub textures: [TextureId; TEXTURE_UNITS],
}

struct TextureRecord {
    width: u32,
    sampling: Sampling,
}

/// Backend that tracks live objects instead of touching a GPU.
pub struct CountingBackend {
    next_id: u64,
    size: (u32, u32),
    programs: HashSet<ProgramId>,
    buffers: HashSet<BufferId>,
    textures: HashMap<TextureId, TextureRecord>,
    rejected: HashSet<String>,
    pub compiled: Vec<String>,
    pub draws: Vec<RecordedDraw>,
    pub texture_writes: usize,
}

impl CountingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            size: (width, height),
            programs: HashSet::new(),
            buffers: HashSet::new(),
            textures: HashMap::new(),
            rejected: HashSet::new(),
            compiled: Vec::new(),
            draws: Vec::new(),
            texture_writes: 0,
        }
    }

    /// Make every compile or texture creation labelled `label` fail.
    pub fn reject(&mut self, label: &str) {
        self.rejected.insert(label.to_string());
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_width(&self, texture: TextureId) -> Option<u32> {
        self.textures.get(&texture).map(|t| t.width)
    }

    pub fn texture_sampling(&self, texture: TextureId) -> Option<Sampling> {
        self.textures.get(&texture).map(|t| t.sampling)
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuBackend for CountingBackend {
    fn compile_program(&mut self, label: &str, _vertex: &str, _fragment: &str) -> VisResult<ProgramId> {
        if self.rejected.contains(label) {
            return Err(VisError::ShaderCompile {
                program: label.to_string(),
                message: "rejected by test backend".into(),
            });
        }
        let id = ProgramId(self.next());
        self.programs.insert(id);
        self.compiled.push(label.to_string());
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        assert!(self.programs.remove(&program), "double delete of {:?}", program);
    }

    fn create_vertex_buffer(&mut self, _label: &str, _vertices: &[[f32; 2]]) -> VisResult<BufferId> {
        let id = BufferId(self.next());
        self.buffers.insert(id);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        assert!(self.buffers.remove(&buffer), "double delete of {:?}", buffer);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> VisResult<TextureId> {
        if self.rejected.contains(desc.label) {
            return Err(VisError::Gpu(format!("texture '{}' rejected by test backend", desc.label)));
        }
        let expected = (desc.width * desc.height * desc.format.bytes_per_texel()) as usize;
        assert_eq!(desc.data.len(), expected, "texture '{}' data size", desc.label);
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            TextureRecord {
                width: desc.width,
                sampling: desc.sampling,
            },
        );
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, _data: &[u8]) -> VisResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(VisError::Gpu(format!("write to unknown texture {:?}", texture)));
        }
        self.texture_writes += 1;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        assert!(self.textures.remove(&texture).is_some(), "double delete of {:?}", texture);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> VisResult<()> {
        assert!(self.programs.contains(&call.program), "draw with deleted program");
        assert!(self.buffers.contains(&call.vertex_buffer), "draw with deleted buffer");
        for texture in &call.textures {
            assert!(self.textures.contains_key(texture), "draw with deleted texture");
        }
        self.draws.push(RecordedDraw {
            program: call.program,
            uniforms: *call.uniforms,
            textures: call.textures,
        });
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }
}
