use rustfft::FftPlanner;

use super::analyser::is_valid_resolution;
use super::element::SharedElement;
use super::features::{byte_rms, AnalysisFrame, SmoothedLoudness, LOUDNESS_ALPHA};
use super::graph::{Acquired, AudioGraphHandle};
use crate::error::{VisError, VisResult};

/// Stereo signal analyzer over the bound audio element.
///
/// Owns the audio graph for the current playback session and the analysis
/// buffers, which are reused across ticks.
pub struct SignalAnalyzer {
    element: Option<SharedElement>,
    graph: Option<AudioGraphHandle>,
    planner: FftPlanner<f32>,
    frame: AnalysisFrame,
    loudness: SmoothedLoudness,
    alpha: f32,
    time_left: Vec<u8>,
    time_right: Vec<u8>,
}

impl Default for SignalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAnalyzer {
    pub fn new() -> Self {
        Self {
            element: None,
            graph: None,
            planner: FftPlanner::new(),
            frame: AnalysisFrame::default(),
            loudness: SmoothedLoudness::default(),
            alpha: LOUDNESS_ALPHA,
            time_left: Vec::new(),
            time_right: Vec::new(),
        }
    }

    /// Bind the element future `configure` calls tap from. The current graph is
    /// left alone until the next `configure`, which replaces it.
    pub fn bind_element(&mut self, element: SharedElement) {
        self.element = Some(element);
    }

    /// Loudness smoothing factor, clamped to (0, 1].
    pub fn set_smoothing(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(f32::EPSILON, 1.0);
    }

    pub fn element(&self) -> Option<&SharedElement> {
        self.element.as_ref()
    }

    pub fn frame(&self) -> &AnalysisFrame {
        &self.frame
    }

    pub fn loudness(&self) -> SmoothedLoudness {
        self.loudness
    }

    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        self.graph.as_ref()
    }

    /// Configured analyser resolution, if wired.
    pub fn resolution(&self) -> Option<usize> {
        self.graph.as_ref().and_then(|g| g.resolution())
    }

    /// Rebuild the analyser pair at `resolution`. Returns whether the existing
    /// context and source were reused.
    pub fn configure(&mut self, resolution: usize) -> VisResult<bool> {
        if !is_valid_resolution(resolution) {
            return Err(VisError::InvalidResolution(resolution));
        }
        let element = self.element.clone().ok_or(VisError::NoAudioElement)?;

        let Acquired { mut graph, reused } = AudioGraphHandle::acquire_or_create(self.graph.take(), &element);
        graph.wire(&mut self.planner, resolution)?;
        if !reused {
            self.loudness.reset();
        }

        let bins = resolution / 2;
        self.frame.resize(bins);
        self.time_left.resize(bins, 128);
        self.time_right.resize(bins, 128);

        log::info!(
            "Analyser configured: resolution={}, bins={}, context #{} ({})",
            resolution,
            bins,
            graph.context().id(),
            if reused { "reused" } else { "new" }
        );
        self.graph = Some(graph);
        Ok(reused)
    }

    /// Pull the current spectrum and waveform and fold the RMS values into the
    /// smoothed loudness.
    pub fn sample_frame(&mut self) -> VisResult<()> {
        let graph = self.graph.as_mut().ok_or(VisError::NotInitialized)?;
        let splitter = graph.pull().ok_or(VisError::NotInitialized)?;

        let (left, right) = self.frame.channels_mut();
        splitter.left.byte_frequency_data(left);
        splitter.right.byte_frequency_data(right);
        splitter.left.byte_time_domain_data(&mut self.time_left);
        splitter.right.byte_time_domain_data(&mut self.time_right);

        let rms_left = byte_rms(&self.time_left);
        let rms_right = byte_rms(&self.time_right);
        self.frame.derive_mono(rms_left, rms_right);
        self.loudness.update_with(&self.frame, self.alpha);
        Ok(())
    }

    pub fn resume(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.resume();
        }
    }

    pub fn suspend(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.suspend();
        }
    }

    /// Disconnect everything and close the context. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            log::info!("Tearing down audio context #{}", graph.context().id());
            graph.close();
        }
        self.loudness.reset();
        self.frame = AnalysisFrame::default();
    }
}
