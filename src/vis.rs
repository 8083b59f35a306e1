use std::time::{Duration, Instant};

use crate::art::{AlbumArtLoader, ArtEvent};
use crate::audio::analyser::DEFAULT_RESOLUTION;
use crate::audio::analysis::SignalAnalyzer;
use crate::audio::element::SharedElement;
use crate::audio::features::LOUDNESS_ALPHA;
use crate::error::{VisError, VisResult};
use crate::modes::{ModeTable, VisualizationMode};
use crate::render::backend::GpuBackend;
use crate::render::render_loop::{FrameOutcome, RenderLoop};
use crate::render::resources::GpuResourceManager;
use crate::scheduler::{UpdateScheduler, DEFAULT_UPDATE_HZ};
use crate::shaders::ShaderLibrary;

#[derive(Debug, Clone, Copy)]
pub struct VisualizerConfig {
    /// Analysis refresh rate
    pub update_hz: u32,
    /// Loudness smoothing factor
    pub smoothing: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            update_hz: DEFAULT_UPDATE_HZ,
            smoothing: LOUDNESS_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeRequest {
    Next,
    Select(usize),
}

/// The visualizer context: one per output surface.
///
/// The host drives everything through [`Visualizer::tick`], called once per
/// display refresh. Analysis runs on the fixed-rate scheduler inside it; the
/// only work off the host's timeline is album art loading.
pub struct Visualizer<B: GpuBackend> {
    analyzer: SignalAnalyzer,
    gpu: GpuResourceManager<B>,
    modes: ModeTable,
    library: ShaderLibrary,
    scheduler: UpdateScheduler,
    render: RenderLoop,
    art: AlbumArtLoader,
    queued: Option<ModeRequest>,
    /// Loops were stopped for a context swap and restart on the next tick
    resume_pending: bool,
    initialized: bool,
}

impl<B: GpuBackend> Visualizer<B> {
    pub fn new(backend: B, modes: ModeTable, library: ShaderLibrary, config: VisualizerConfig) -> VisResult<Self> {
        modes.validate(&library)?;
        let mut analyzer = SignalAnalyzer::new();
        analyzer.set_smoothing(config.smoothing);
        Ok(Self {
            analyzer,
            gpu: GpuResourceManager::new(backend)?,
            modes,
            library,
            scheduler: UpdateScheduler::new(config.update_hz),
            render: RenderLoop::new(),
            art: AlbumArtLoader::new(),
            queued: None,
            resume_pending: false,
            initialized: false,
        })
    }

    pub fn with_art_loader(mut self, loader: AlbumArtLoader) -> Self {
        self.art = loader;
        self
    }

    pub fn analyzer(&self) -> &SignalAnalyzer {
        &self.analyzer
    }

    pub fn gpu(&self) -> &GpuResourceManager<B> {
        &self.gpu
    }

    pub fn backend(&self) -> &B {
        self.gpu.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.gpu.backend_mut()
    }

    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Element the next `init` or mode switch taps from.
    pub fn bind_element(&mut self, element: SharedElement) {
        self.analyzer.bind_element(element);
    }

    /// Build the audio graph and enter mode 0.
    pub fn init(&mut self) -> VisResult<()> {
        self.stop_loops_if_rebinding();
        self.analyzer.configure(DEFAULT_RESOLUTION)?;
        self.initialized = true;
        self.queued = None;
        if let Err(e) = self.enter_mode(0) {
            log::error!("Failed to enter initial mode: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// The element began playing: resume the context and (re)start both loops.
    pub fn on_play(&mut self, now: Instant) -> VisResult<()> {
        if !self.initialized {
            return Err(VisError::NotInitialized);
        }
        self.analyzer.resume();
        self.scheduler.start(now);
        self.render.start();
        self.resume_pending = false;
        Ok(())
    }

    pub fn on_pause(&mut self) {
        self.analyzer.suspend();
    }

    pub fn mode(&self) -> usize {
        self.modes.active_index()
    }

    pub fn active_mode(&self) -> &VisualizationMode {
        self.modes.active()
    }

    /// Advance to the next mode now. Returns the new index.
    pub fn change_mode(&mut self) -> VisResult<usize> {
        if !self.initialized {
            return Err(VisError::NotInitialized);
        }
        let next = self.modes.next_index();
        self.enter_mode(next)?;
        Ok(next)
    }

    pub fn set_mode(&mut self, index: usize) -> VisResult<()> {
        if !self.initialized {
            return Err(VisError::NotInitialized);
        }
        self.enter_mode(index)
    }

    /// Advance on the next tick. Pending requests are replaced, not stacked.
    pub fn queue_change_mode(&mut self) {
        self.queue(ModeRequest::Next);
    }

    pub fn queue_set_mode(&mut self, index: usize) {
        self.queue(ModeRequest::Select(index));
    }

    fn queue(&mut self, request: ModeRequest) {
        if let Some(previous) = self.queued.replace(request) {
            log::debug!("Mode request {:?} superseded by {:?}", previous, request);
        }
    }

    /// Switch to mode `index`. Validation and analyser errors leave everything
    /// untouched; a failed compile still moves the index but keeps the
    /// previous program drawing.
    fn enter_mode(&mut self, index: usize) -> VisResult<()> {
        let mode = self
            .modes
            .get(index)
            .ok_or(VisError::InvalidMode {
                index,
                count: self.modes.len(),
            })?
            .clone();
        let program = self.library.build(&mode.shader, &mode.params)?;

        let rebinding = self.stop_loops_if_rebinding();
        if rebinding || self.analyzer.resolution() != Some(mode.resolution) {
            self.analyzer.configure(mode.resolution)?;
        }
        self.modes.select(index)?;
        log::info!("Mode {} ({}): {} @ {}", index, mode.name, mode.shader, mode.resolution);
        self.gpu.install_program(&program.label, &program.vertex, &program.fragment)
    }

    /// New track: keep the mode, rewire the analyser for the bound element and
    /// swap in the album art once it has loaded. If the host bound a different
    /// element, both loops stop before the old context closes; they restart on
    /// the next tick if that element is playing, otherwise on `on_play`.
    pub fn on_track_changed(&mut self, art: Option<&str>) -> VisResult<()> {
        match art {
            Some(uri) => {
                self.art.request(uri);
            }
            None => {
                self.art.cancel();
                self.gpu.clear_album_art();
            }
        }
        if !self.initialized {
            return Ok(());
        }

        self.stop_loops_if_rebinding();
        self.analyzer.configure(self.modes.active().resolution)?;
        Ok(())
    }

    /// The next `configure` closes the current context when the bound element
    /// changed. Both loops stop before that happens; if they were running
    /// they restart on the next tick against the new context.
    fn stop_loops_if_rebinding(&mut self) -> bool {
        let rebinding = match (self.analyzer.graph(), self.analyzer.element()) {
            (Some(graph), Some(element)) => !graph.is_bound_to(element),
            _ => false,
        };
        if rebinding && (self.scheduler.is_running() || self.render.is_running()) {
            log::debug!("Element changed, stopping loops before closing the audio context");
            self.scheduler.stop();
            self.render.stop();
            self.resume_pending = true;
        }
        rebinding
    }

    /// Block up to `timeout` for the pending album art and apply it.
    pub fn await_art(&mut self, timeout: Duration) {
        if let Some(event) = self.art.wait(timeout) {
            self.apply_art(event);
        }
    }

    fn apply_art(&mut self, event: ArtEvent) {
        match event {
            ArtEvent::Loaded { uri, image } => {
                if let Err(e) = self.gpu.upload_album_art(&image) {
                    log::warn!("Album art from {} not uploaded: {}", uri, e);
                    self.gpu.clear_album_art();
                }
            }
            ArtEvent::Failed { uri, error } => {
                log::warn!("Album art unavailable for {}: {}", uri, error);
                self.gpu.clear_album_art();
            }
        }
    }

    /// Replace the element for a new track set. The old graph is closed, the
    /// mode resets to 0 and playback must signal `on_play` again.
    pub fn swap_playlist(&mut self, element: SharedElement) -> VisResult<()> {
        self.scheduler.stop();
        self.render.stop();
        self.analyzer.teardown();
        self.queued = None;
        self.analyzer.bind_element(element);
        if self.initialized {
            self.init()?;
        }
        self.resume_pending = false;
        Ok(())
    }

    /// One display refresh: apply finished art loads and queued mode
    /// requests, sample if the scheduler is due, then draw.
    pub fn tick(&mut self, now: Instant) -> VisResult<FrameOutcome> {
        if let Some(event) = self.art.poll() {
            self.apply_art(event);
        }

        if let Some(request) = self.queued.take() {
            let result = match request {
                ModeRequest::Next => self.change_mode().map(|_| ()),
                ModeRequest::Select(index) => self.set_mode(index),
            };
            if let Err(e) = result {
                log::error!("Queued mode change failed: {}", e);
            }
        }

        if self.resume_pending {
            self.resume_pending = false;
            if self.analyzer.element().is_some_and(|e| e.is_playing()) {
                self.on_play(now)?;
            }
        }

        let analyzer = &mut self.analyzer;
        self.scheduler.poll(now, || analyzer.sample_frame())?;
        self.render
            .tick(&mut self.gpu, self.analyzer.frame(), self.analyzer.loudness())
    }

    /// Stop both loops, close the audio context and release every GPU object
    /// but the placeholder. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.scheduler.stop();
        self.render.stop();
        self.analyzer.teardown();
        self.art.cancel();
        self.gpu.release_all();
        self.queued = None;
        self.resume_pending = false;
        if self.initialized {
            log::info!("Visualizer torn down");
        }
        self.initialized = false;
    }
}
