use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

/// Arguments for muxing raw RGBA frames from stdin with the source audio.
pub fn ffmpeg_args(output_path: &Path, input_audio: &Path, settings: &EncoderSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgba",
        "-video_size",
        format!("{}x{}", settings.width, settings.height).as_str(),
        "-framerate",
        settings.fps.to_string().as_str(),
        "-i",
        "pipe:0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(input_audio.as_os_str().to_owned());
    args.extend(
        ["-c:v", settings.codec.as_str(), "-pix_fmt", settings.pix_fmt.as_str()]
            .iter()
            .map(OsString::from),
    );

    match &settings.bitrate {
        Some(br) => args.extend(["-b:v", br.as_str()].iter().map(OsString::from)),
        None => args.extend(
            ["-crf", settings.crf.to_string().as_str(), "-preset", "medium"]
                .iter()
                .map(OsString::from),
        ),
    }

    args.extend(["-c:a", "aac", "-b:a", "192k", "-shortest"].iter().map(OsString::from));
    args.push(output_path.as_os_str().to_owned());
    args
}

pub struct FfmpegEncoder {
    child: Child,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &EncoderSettings) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .args(ffmpeg_args(output_path, input_audio, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self { child })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}
