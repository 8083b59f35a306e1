pub mod backend;
pub mod frame;
pub mod gpu;
pub mod program;
pub mod render_loop;
pub mod resources;
pub mod wgpu_backend;
