use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "asa-vis", about = "Audio-reactive album art visualizer")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Album art: http(s) URL, file:// URI or path
    #[arg(long)]
    pub art: Option<String>,

    /// Mode to start in (index or name)
    #[arg(short, long, default_value = "0")]
    pub mode: String,

    /// Advance to the next mode every N seconds
    #[arg(long)]
    pub cycle_every: Option<f32>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Display refresh rate (frames per second of the output)
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Directory of <name>.wgsl fragment programs overriding the built-ins
    #[arg(long)]
    pub shader_dir: Option<PathBuf>,

    /// Config file (default: ./asa-vis.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List shader programs and modes, then exit
    #[arg(long)]
    pub list_shaders: bool,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,
}
