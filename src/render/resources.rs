use image::RgbaImage;

use super::backend::{
    GpuBackend, Sampling, TextureDesc, TextureFormat, TextureId, FULLSCREEN_TRIANGLE,
};
use super::program::{resolve_locations, ShaderProgramHandle};
use crate::audio::features::AnalysisFrame;
use crate::error::{VisError, VisResult};

const PLACEHOLDER_PIXEL: [u8; 4] = [255, 255, 255, 255];

/// Sampling for album art: mipmapped repeat when both sides are powers of
/// two, clamped nearest otherwise.
pub fn album_art_sampling(width: u32, height: u32) -> Sampling {
    if width.is_power_of_two() && height.is_power_of_two() {
        Sampling::MIPMAPPED_REPEAT
    } else {
        Sampling::NEAREST_CLAMP
    }
}

#[derive(Debug, Clone, Copy)]
struct AlbumArt {
    texture: TextureId,
    sampling: Sampling,
}

#[derive(Debug, Clone, Copy)]
struct AnalysisTextures {
    bins: usize,
    left: TextureId,
    right: TextureId,
    mono: TextureId,
}

/// Owns every GPU object the visualizer creates: the active program, the
/// album art texture (with its 1x1 placeholder) and the analysis textures.
pub struct GpuResourceManager<B: GpuBackend> {
    backend: B,
    active: Option<ShaderProgramHandle>,
    placeholder: TextureId,
    album_art: Option<AlbumArt>,
    analysis: Option<AnalysisTextures>,
}

impl<B: GpuBackend> GpuResourceManager<B> {
    pub fn new(mut backend: B) -> VisResult<Self> {
        let placeholder = backend.create_texture(&TextureDesc {
            label: "album_art_placeholder",
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
            sampling: Sampling::NEAREST_CLAMP,
            data: &PLACEHOLDER_PIXEL,
        })?;
        Ok(Self {
            backend,
            active: None,
            placeholder,
            album_art: None,
            analysis: None,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn active_program(&self) -> Option<&ShaderProgramHandle> {
        self.active.as_ref()
    }

    /// Compile and link a program with its own fullscreen vertex buffer.
    /// Nothing is created if either step fails.
    pub fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> VisResult<ShaderProgramHandle> {
        let program = self.backend.compile_program(label, vertex, fragment)?;
        let vertex_buffer = match self.backend.create_vertex_buffer(label, &FULLSCREEN_TRIANGLE) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.backend.delete_program(program);
                return Err(err);
            }
        };
        Ok(ShaderProgramHandle {
            label: label.to_string(),
            program,
            vertex_buffer,
            locations: resolve_locations(vertex, fragment),
        })
    }

    pub fn destroy_program(&mut self, handle: ShaderProgramHandle) {
        log::debug!("Destroying program '{}'", handle.label);
        self.backend.delete_program(handle.program);
        self.backend.delete_buffer(handle.vertex_buffer);
    }

    /// Replace the active program. On failure the previous program stays
    /// active and the error is returned.
    pub fn install_program(&mut self, label: &str, vertex: &str, fragment: &str) -> VisResult<()> {
        let handle = match self.compile_program(label, vertex, fragment) {
            Ok(handle) => handle,
            Err(err) => {
                log::error!(
                    "Keeping program '{}' after failed build of '{}': {}",
                    self.active.as_ref().map_or("<none>", |p| p.label()),
                    label,
                    err
                );
                return Err(err);
            }
        };
        if let Some(previous) = self.active.replace(handle) {
            self.destroy_program(previous);
        }
        log::info!("Active program: {}", label);
        Ok(())
    }

    pub fn release_program(&mut self) {
        if let Some(handle) = self.active.take() {
            self.destroy_program(handle);
        }
    }

    /// Upload decoded album art. Rows are flipped so the first row lands at
    /// the bottom, matching the shaders' y-up coordinates.
    pub fn upload_album_art(&mut self, image: &RgbaImage) -> VisResult<Sampling> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(VisError::Gpu(format!("album art has zero extent ({}x{})", width, height)));
        }
        let sampling = album_art_sampling(width, height);
        let flipped = image::imageops::flip_vertical(image);
        let texture = self.backend.create_texture(&TextureDesc {
            label: "album_art",
            width,
            height,
            format: TextureFormat::Rgba8,
            sampling,
            data: flipped.as_raw(),
        })?;
        if let Some(previous) = self.album_art.replace(AlbumArt { texture, sampling }) {
            self.backend.delete_texture(previous.texture);
        }
        log::info!("Album art uploaded: {}x{} ({:?})", width, height, sampling.min_filter);
        Ok(sampling)
    }

    pub fn clear_album_art(&mut self) {
        if let Some(art) = self.album_art.take() {
            self.backend.delete_texture(art.texture);
        }
    }

    /// Texture currently bound to the album art unit.
    pub fn album_art_texture(&self) -> TextureId {
        self.album_art.map_or(self.placeholder, |art| art.texture)
    }

    pub fn album_art_sampling(&self) -> Option<Sampling> {
        self.album_art.map(|art| art.sampling)
    }

    pub fn placeholder(&self) -> TextureId {
        self.placeholder
    }

    /// Upload the three analysis arrays as one-row textures. Existing textures
    /// are rewritten while the bin count is unchanged; returns whether they
    /// were reused.
    pub fn upload_analysis_textures(&mut self, frame: &AnalysisFrame) -> VisResult<bool> {
        let bins = frame.bins();
        if bins == 0 {
            return Ok(false);
        }
        let reused = match self.analysis {
            Some(textures) if textures.bins == bins => {
                self.backend.write_texture(textures.left, frame.left())?;
                self.backend.write_texture(textures.right, frame.right())?;
                self.backend.write_texture(textures.mono, frame.mono())?;
                true
            }
            _ => {
                self.release_analysis_textures();
                let mut created = Vec::with_capacity(3);
                for (label, data) in [
                    ("analyser_l", frame.left()),
                    ("analyser_r", frame.right()),
                    ("analyser_m", frame.mono()),
                ] {
                    match self.create_analysis_texture(label, data) {
                        Ok(texture) => created.push(texture),
                        Err(e) => {
                            for texture in created {
                                self.backend.delete_texture(texture);
                            }
                            return Err(e);
                        }
                    }
                }
                self.analysis = Some(AnalysisTextures {
                    bins,
                    left: created[0],
                    right: created[1],
                    mono: created[2],
                });
                false
            }
        };
        Ok(reused)
    }

    fn create_analysis_texture(&mut self, label: &str, data: &[u8]) -> VisResult<TextureId> {
        self.backend.create_texture(&TextureDesc {
            label,
            width: data.len() as u32,
            height: 1,
            format: TextureFormat::Luminance8,
            sampling: Sampling::NEAREST_CLAMP,
            data,
        })
    }

    /// Left, right and mono analysis textures; the placeholder stands in
    /// before the first upload.
    pub fn analysis_textures(&self) -> [TextureId; 3] {
        match self.analysis {
            Some(t) => [t.left, t.right, t.mono],
            None => [self.placeholder; 3],
        }
    }

    fn release_analysis_textures(&mut self) {
        if let Some(textures) = self.analysis.take() {
            self.backend.delete_texture(textures.left);
            self.backend.delete_texture(textures.right);
            self.backend.delete_texture(textures.mono);
        }
    }

    /// Release everything except the placeholder.
    pub fn release_all(&mut self) {
        self.release_program();
        self.clear_album_art();
        self.release_analysis_textures();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::program::UniformName;
    use crate::testing::CountingBackend;

    const VS: &str = "@vertex fn vs_main(@location(0) a_position: vec2<f32>) {}";
    const FS: &str = "@fragment fn fs_main() { let w = u.width; }";

    fn manager() -> GpuResourceManager<CountingBackend> {
        GpuResourceManager::new(CountingBackend::new(320, 200)).unwrap()
    }

    #[test]
    fn placeholder_exists_from_the_start() {
        let gpu = manager();
        assert_eq!(gpu.backend().live_textures(), 1);
        assert_eq!(gpu.album_art_texture(), gpu.placeholder());
    }

    #[test]
    fn compile_resolves_locations() {
        let mut gpu = manager();
        let handle = gpu.compile_program("test", VS, FS).unwrap();
        assert!(handle.location(UniformName::Width).is_some());
        assert!(handle.location(UniformName::Position).is_some());
        assert!(handle.location(UniformName::AlbumImage).is_none());
        gpu.destroy_program(handle);
        assert_eq!(gpu.backend().live_programs(), 0);
        assert_eq!(gpu.backend().live_buffers(), 0);
    }

    #[test]
    fn install_replaces_and_releases_previous() {
        let mut gpu = manager();
        for i in 0..5 {
            gpu.install_program(&format!("p{}", i), VS, FS).unwrap();
            assert_eq!(gpu.backend().live_programs(), 1);
            assert_eq!(gpu.backend().live_buffers(), 1);
        }
        assert_eq!(gpu.active_program().unwrap().label(), "p4");
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let mut gpu = manager();
        gpu.install_program("good", VS, FS).unwrap();
        gpu.backend_mut().reject("bad");
        let err = gpu.install_program("bad", VS, FS).unwrap_err();
        assert!(matches!(err, VisError::ShaderCompile { .. }));
        assert_eq!(gpu.active_program().unwrap().label(), "good");
        assert_eq!(gpu.backend().live_programs(), 1);
        assert_eq!(gpu.backend().live_buffers(), 1);
    }

    #[test]
    fn power_of_two_art_is_mipmapped() {
        assert_eq!(album_art_sampling(256, 256), Sampling::MIPMAPPED_REPEAT);
        assert_eq!(album_art_sampling(300, 200), Sampling::NEAREST_CLAMP);
        assert_eq!(album_art_sampling(256, 200), Sampling::NEAREST_CLAMP);
    }

    #[test]
    fn album_art_replaces_previous_texture() {
        let mut gpu = manager();
        let sampling = gpu.upload_album_art(&RgbaImage::new(256, 256)).unwrap();
        assert_eq!(sampling, Sampling::MIPMAPPED_REPEAT);
        let sampling = gpu.upload_album_art(&RgbaImage::new(300, 200)).unwrap();
        assert_eq!(sampling, Sampling::NEAREST_CLAMP);
        assert_eq!(gpu.backend().live_textures(), 2);
        assert_ne!(gpu.album_art_texture(), gpu.placeholder());
        assert_eq!(gpu.backend().texture_sampling(gpu.album_art_texture()), Some(Sampling::NEAREST_CLAMP));

        gpu.clear_album_art();
        assert_eq!(gpu.album_art_texture(), gpu.placeholder());
        assert_eq!(gpu.backend().live_textures(), 1);
    }

    #[test]
    fn empty_art_keeps_placeholder() {
        let mut gpu = manager();
        assert!(gpu.upload_album_art(&RgbaImage::new(0, 0)).is_err());
        assert_eq!(gpu.album_art_texture(), gpu.placeholder());
    }

    #[test]
    fn analysis_textures_reused_until_resize() {
        let mut gpu = manager();
        let frame = AnalysisFrame::with_bins(16);
        assert!(!gpu.upload_analysis_textures(&frame).unwrap());
        assert!(gpu.upload_analysis_textures(&frame).unwrap());
        assert_eq!(gpu.backend().live_textures(), 4);
        assert_eq!(gpu.backend().texture_width(gpu.analysis_textures()[2]), Some(16));

        let frame = AnalysisFrame::with_bins(1024);
        assert!(!gpu.upload_analysis_textures(&frame).unwrap());
        assert_eq!(gpu.backend().live_textures(), 4);
        assert_eq!(gpu.backend().texture_width(gpu.analysis_textures()[0]), Some(1024));
    }

    #[test]
    fn partial_analysis_upload_leaks_nothing() {
        let mut gpu = manager();
        gpu.backend_mut().reject("analyser_m");
        let frame = AnalysisFrame::with_bins(16);
        assert!(matches!(gpu.upload_analysis_textures(&frame), Err(VisError::Gpu(_))));
        assert_eq!(gpu.backend().live_textures(), 1);
        assert_eq!(gpu.analysis_textures(), [gpu.placeholder(); 3]);
    }

    #[test]
    fn release_all_returns_to_baseline() {
        let mut gpu = manager();
        gpu.install_program("p", VS, FS).unwrap();
        gpu.upload_album_art(&RgbaImage::new(4, 4)).unwrap();
        gpu.upload_analysis_textures(&AnalysisFrame::with_bins(8)).unwrap();
        gpu.release_all();
        assert_eq!(gpu.backend().live_programs(), 0);
        assert_eq!(gpu.backend().live_buffers(), 0);
        assert_eq!(gpu.backend().live_textures(), 1);
    }
}
