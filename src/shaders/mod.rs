pub mod embedded;
pub mod loader;
pub mod manifest;

pub use loader::{inject_params, BuiltProgram, ShaderLibrary};
