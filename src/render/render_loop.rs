use super::backend::{
    DrawCall, FrameUniforms, GpuBackend, ALBUM_ART_UNIT, ANALYSER_L_UNIT, ANALYSER_M_UNIT, ANALYSER_R_UNIT,
    TEXTURE_UNITS,
};
use super::resources::GpuResourceManager;
use crate::audio::features::{AnalysisFrame, SmoothedLoudness};
use crate::error::VisResult;

const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// No program is active yet; the loop stays alive.
    NoProgram,
    Stopped,
}

/// Display-rate loop. The host calls [`RenderLoop::tick`] once per refresh.
#[derive(Debug, Default)]
pub struct RenderLoop {
    running: bool,
    frames_drawn: u64,
    frames_skipped: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if !self.running {
            log::debug!("Render loop started");
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            log::debug!(
                "Render loop stopped after {} frames ({} skipped)",
                self.frames_drawn,
                self.frames_skipped
            );
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Upload the latest analysis and draw one frame with the active program.
    pub fn tick<B: GpuBackend>(
        &mut self,
        gpu: &mut GpuResourceManager<B>,
        frame: &AnalysisFrame,
        loudness: SmoothedLoudness,
    ) -> VisResult<FrameOutcome> {
        if !self.running {
            return Ok(FrameOutcome::Stopped);
        }
        let Some(program) = gpu.active_program() else {
            self.frames_skipped += 1;
            return Ok(FrameOutcome::NoProgram);
        };

        // One uniform buffer serves every program, so every scalar is written.
        let (width, height) = gpu.backend().surface_size();
        let uniforms = FrameUniforms {
            width: width as f32,
            height: height as f32,
            buffer_length: frame.bins() as f32,
            rms_l: loudness.left,
            rms_r: loudness.right,
            rms_m: loudness.mono,
            ..FrameUniforms::default()
        };
        let program_id = program.program();
        let vertex_buffer = program.vertex_buffer();

        gpu.upload_analysis_textures(frame)?;
        let [left, right, mono] = gpu.analysis_textures();
        let mut textures = [gpu.placeholder(); TEXTURE_UNITS];
        textures[ALBUM_ART_UNIT] = gpu.album_art_texture();
        textures[ANALYSER_L_UNIT] = left;
        textures[ANALYSER_R_UNIT] = right;
        textures[ANALYSER_M_UNIT] = mono;

        gpu.backend_mut().draw(&DrawCall {
            program: program_id,
            vertex_buffer,
            vertex_count: 3,
            uniforms: &uniforms,
            textures,
            clear_color: CLEAR_COLOR,
        })?;
        self.frames_drawn += 1;
        Ok(FrameOutcome::Drawn)
    }
}
