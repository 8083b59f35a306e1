mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};

use asa_vis::audio::decode::decode_audio;
use asa_vis::audio::element::PcmElement;
use asa_vis::config;
use asa_vis::encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use asa_vis::render::gpu::GpuContext;
use asa_vis::render::wgpu_backend::WgpuBackend;
use asa_vis::shaders::ShaderLibrary;
use asa_vis::{ModeTable, Visualizer};
use cli::Cli;

const ART_TIMEOUT: Duration = Duration::from_secs(10);

/// Mode given on the command line, by index or by name.
fn resolve_mode(modes: &ModeTable, requested: &str) -> Result<usize> {
    if let Ok(index) = requested.parse::<usize>() {
        if index >= modes.len() {
            anyhow::bail!("Mode {} out of range (table has {} modes)", index, modes.len());
        }
        return Ok(index);
    }
    modes
        .position(requested)
        .with_context(|| format!("Unknown mode '{}'", requested))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Explicit --config path, or the first config file that exists
    let config_path = cli
        .config
        .clone()
        .or_else(|| config::config_candidates().into_iter().find(|p| p.exists()));
    let mut cfg = config::Config::default();
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Some(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            None => log::warn!("Failed to load config from {}", path.display()),
        }
    }
    // Merge: config values apply only when CLI is at its default
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.shader_dir.is_none() { cli.shader_dir = cfg.visualizer.shader_dir.clone(); }

    let mut library = ShaderLibrary::embedded()?;
    if let Some(ref dir) = cli.shader_dir {
        let loaded = library.load_dir(dir)?;
        log::info!("Loaded {} shader(s) from {}", loaded, dir.display());
    }

    let modes = if cfg.modes.is_empty() {
        ModeTable::default()
    } else {
        ModeTable::new(std::mem::take(&mut cfg.modes)).context("Invalid mode table in config")?
    };

    if cli.list_shaders {
        println!("Shader programs:");
        for name in library.names() {
            if let Some(program) = library.get(name) {
                println!(
                    "  {:<26} {:<22} {}",
                    name, program.manifest.display_name, program.manifest.description
                );
            }
        }
        println!("Modes:");
        for (i, mode) in modes.modes().iter().enumerate() {
            println!("  {} {:<12} {} @ {}", i, mode.name, mode.shader, mode.resolution);
        }
        return Ok(());
    }

    let start_mode = resolve_mode(&modes, &cli.mode)?;

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("asa-vis - audio-reactive visualizer");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    log::info!("Decoding audio...");
    let pcm = decode_audio(input)?;
    let duration = pcm.duration();
    let element = Arc::new(PcmElement::new(pcm));

    log::info!("Initializing GPU...");
    let gpu = GpuContext::new(cfg.gpu)?;
    let backend = WgpuBackend::new(gpu, cli.width, cli.height);
    let mut vis = Visualizer::new(backend, modes, library, cfg.visualizer.visualizer_config())?;
    vis.bind_element(element.clone());
    vis.init()?;
    if start_mode != 0 {
        vis.set_mode(start_mode)
            .with_context(|| format!("Failed to enter mode {}", start_mode))?;
    }
    if let Some(ref art) = cli.art {
        vis.on_track_changed(Some(art.as_str()))?;
        vis.await_art(ART_TIMEOUT);
    }

    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        input,
        &EncoderSettings {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
        },
    )?;

    let fps = cli.fps.max(1);
    let total_frames = (duration * fps as f32).ceil() as u64;
    let cycle_frames = cli
        .cycle_every
        .map(|secs| ((secs * fps as f32).round() as u64).max(1));
    log::info!("Total frames: {}, Duration: {:.1}s", total_frames, duration);

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    // Virtual display clock: one tick per output frame.
    let t0 = Instant::now();
    element.play();
    vis.on_play(t0)?;
    for frame_idx in 0..total_frames {
        let seconds = frame_idx as f64 / fps as f64;
        element.seek(seconds as f32);
        if let Some(every) = cycle_frames {
            if frame_idx > 0 && frame_idx % every == 0 {
                vis.queue_change_mode();
            }
        }

        vis.tick(t0 + Duration::from_secs_f64(seconds))?;
        let pixels = vis.backend().read_pixels()?;
        encoder.write_frame(&pixels)?;
        pb.set_position(frame_idx + 1);
    }
    pb.finish_with_message("Rendering complete");

    element.pause();
    vis.teardown();
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}
