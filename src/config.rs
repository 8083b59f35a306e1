use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::features::LOUDNESS_ALPHA;
use crate::modes::VisualizationMode;
use crate::render::gpu::GpuOptions;
use crate::scheduler::DEFAULT_UPDATE_HZ;
use crate::vis::VisualizerConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub visualizer: VisualizerSection,
    #[serde(default)]
    pub gpu: GpuOptions,
    /// Replaces the built-in mode table when present
    #[serde(default)]
    pub modes: Vec<VisualizationMode>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
}

#[derive(Debug, Deserialize)]
pub struct VisualizerSection {
    #[serde(default = "default_update_hz")]
    pub update_hz: u32,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
        }
    }
}

impl Default for VisualizerSection {
    fn default() -> Self {
        Self {
            update_hz: default_update_hz(),
            smoothing: default_smoothing(),
            shader_dir: None,
        }
    }
}

impl VisualizerSection {
    pub fn visualizer_config(&self) -> VisualizerConfig {
        VisualizerConfig {
            update_hz: self.update_hz,
            smoothing: self.smoothing,
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 60 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_update_hz() -> u32 { DEFAULT_UPDATE_HZ }
fn default_smoothing() -> f32 { LOUDNESS_ALPHA }

/// Config file candidates, most specific first.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("asa-vis.toml")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config/asa-vis/config.toml"));
    }
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("asa-vis/config.toml"));
    }
    candidates
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.output.width, 1280);
        assert_eq!(config.output.fps, 60);
        assert_eq!(config.visualizer.update_hz, 30);
        assert_eq!(config.visualizer.smoothing, 0.1);
        assert!(config.modes.is_empty());
    }

    #[test]
    fn parses_mode_table() {
        let config: Config = toml::from_str(
            r#"
            [visualizer]
            update_hz = 20
            shader_dir = "/tmp/shaders"

            [gpu]
            power = "high_performance"

            [[modes]]
            name = "bars"
            resolution = 64
            shader = "stereo_bars"

            [[modes]]
            name = "ca"
            resolution = 32
            shader = "stereo_ca"
            params = { strength = "1.0" }
            "#,
        )
        .unwrap();
        assert_eq!(config.visualizer.update_hz, 20);
        assert_eq!(config.visualizer.shader_dir, Some(PathBuf::from("/tmp/shaders")));
        assert_eq!(config.modes.len(), 2);
        assert_eq!(config.modes[1].params["strength"], "1.0");
        assert_eq!(config.visualizer.visualizer_config().update_hz, 20);
        assert_eq!(config.gpu.power, crate::render::gpu::PowerMode::HighPerformance);
    }

    #[test]
    fn load_config_reads_file_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[output]\nwidth = 640\n").unwrap();
        assert_eq!(load_config(&good).unwrap().output.width, 640);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[output\nwidth = ").unwrap();
        assert!(load_config(&bad).is_none());
        assert!(load_config(&dir.path().join("missing.toml")).is_none());
    }

    #[test]
    fn local_config_is_checked_first() {
        assert_eq!(config_candidates()[0], PathBuf::from("asa-vis.toml"));
    }
}
