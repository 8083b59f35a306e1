use thiserror::Error;

/// Visualizer errors
#[derive(Error, Debug)]
pub enum VisError {
    #[error("No audio element is bound to the visualizer")]
    NoAudioElement,
    #[error("Invalid visualization mode {index} (table has {count} modes)")]
    InvalidMode { index: usize, count: usize },
    #[error("Invalid analyser resolution {0}: must be a power of two between 32 and 16384")]
    InvalidResolution(usize),
    #[error("Visualizer is not initialized")]
    NotInitialized,
    #[error("Unknown shader program '{0}'")]
    UnknownShader(String),
    #[error("Mode table must contain at least one mode")]
    EmptyModeTable,
    #[error("Shader program '{program}' failed to compile: {message}")]
    ShaderCompile { program: String, message: String },
    #[error("GPU error: {0}")]
    Gpu(String),
    #[error("Album art load failed for '{uri}': {message}")]
    ArtLoad { uri: String, message: String },
    #[error("Album art decode failed: {0}")]
    ArtDecode(#[from] image::ImageError),
    #[error("Audio context is closed")]
    ContextClosed,
}

pub type VisResult<T> = Result<T, VisError>;
