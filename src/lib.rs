pub mod art;
pub mod audio;
pub mod config;
pub mod encode;
pub mod error;
pub mod modes;
pub mod render;
pub mod scheduler;
pub mod shaders;
pub mod vis;

#[cfg(test)]
mod testing;

pub use error::{VisError, VisResult};
pub use modes::{ModeTable, VisualizationMode};
pub use vis::{Visualizer, VisualizerConfig};
