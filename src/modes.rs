use serde::Deserialize;
use std::collections::HashMap;

use crate::audio::analyser::is_valid_resolution;
use crate::error::{VisError, VisResult};
use crate::shaders::ShaderLibrary;

/// One entry of the mode table: analyser resolution plus the program to draw.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisualizationMode {
    pub name: String,
    pub resolution: usize,
    pub shader: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl VisualizationMode {
    pub fn new(name: &str, resolution: usize, shader: &str) -> Self {
        Self {
            name: name.to_string(),
            resolution,
            shader: shader.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// The built-in table: transparent, spectrum over art, chromatic aberration.
pub fn default_modes() -> Vec<VisualizationMode> {
    vec![
        VisualizationMode::new("none", 32, "nothing"),
        VisualizationMode::new("spectrum", 2048, "spectrum_analyzer"),
        VisualizationMode::new("aberration", 32, "stereo_ca").with_param("strength", "0.5"),
    ]
}

/// Fixed, ordered list of modes with a cyclic cursor.
#[derive(Debug, Clone)]
pub struct ModeTable {
    modes: Vec<VisualizationMode>,
    active: usize,
}

impl ModeTable {
    pub fn new(modes: Vec<VisualizationMode>) -> VisResult<Self> {
        if modes.is_empty() {
            return Err(VisError::EmptyModeTable);
        }
        if let Some(bad) = modes.iter().find(|m| !is_valid_resolution(m.resolution)) {
            return Err(VisError::InvalidResolution(bad.resolution));
        }
        Ok(Self { modes, active: 0 })
    }

    /// Check every mode names a program the library can build.
    pub fn validate(&self, library: &ShaderLibrary) -> VisResult<()> {
        match self.modes.iter().find(|m| !library.contains(&m.shader)) {
            Some(mode) => Err(VisError::UnknownShader(mode.shader.clone())),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn modes(&self) -> &[VisualizationMode] {
        &self.modes
    }

    pub fn get(&self, index: usize) -> Option<&VisualizationMode> {
        self.modes.get(index)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &VisualizationMode {
        &self.modes[self.active]
    }

    pub fn next_index(&self) -> usize {
        (self.active + 1) % self.modes.len()
    }

    /// Move the cursor to `index`. Out-of-range indices leave it untouched.
    pub fn select(&mut self, index: usize) -> VisResult<&VisualizationMode> {
        if index >= self.modes.len() {
            return Err(VisError::InvalidMode {
                index,
                count: self.modes.len(),
            });
        }
        self.active = index;
        Ok(&self.modes[index])
    }

    pub fn advance(&mut self) -> &VisualizationMode {
        self.active = self.next_index();
        &self.modes[self.active]
    }

    /// Index of the mode called `name`, if any.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modes.iter().position(|m| m.name == name)
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            modes: default_modes(),
            active: 0,
        }
    }
}
