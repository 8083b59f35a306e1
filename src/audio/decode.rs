use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded track, split into left/right channels.
#[derive(Debug, Default)]
pub struct StereoPcm {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoPcm {
    pub fn with_capacity(sample_rate: u32, frames: usize) -> Self {
        Self {
            left: Vec::with_capacity(frames),
            right: Vec::with_capacity(frames),
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.left.len() as f32 / self.sample_rate as f32
    }

    /// Append interleaved frames. Mono is duplicated to both sides; channels
    /// past the second are ignored.
    pub fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        match channels {
            0 => {}
            1 => {
                self.left.extend_from_slice(samples);
                self.right.extend_from_slice(samples);
            }
            _ => {
                for frame in samples.chunks_exact(channels) {
                    self.left.push(frame[0]);
                    self.right.push(frame[1]);
                }
            }
        }
    }
}

struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    frames_hint: usize,
}

fn open_track(path: &Path) -> Result<OpenTrack> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported audio format: {}", path.display()))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found")?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    Ok(OpenTrack {
        track_id,
        channels: params.channels.map_or(1, |c| c.count()),
        sample_rate: params.sample_rate.context("Unknown sample rate")?,
        frames_hint: params.n_frames.unwrap_or(0) as usize,
        format: probed.format,
        decoder,
    })
}

/// Decode a whole file into memory, keeping stereo separation.
pub fn decode_audio(path: &Path) -> Result<StereoPcm> {
    let OpenTrack {
        mut format,
        mut decoder,
        track_id,
        channels,
        sample_rate,
        frames_hint,
    } = open_track(path)?;

    let mut pcm = StereoPcm::with_capacity(sample_rate, frames_hint);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        let needed = decoded.capacity() * spec.channels.count();
        // Reallocate only when a packet is larger than any seen so far.
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            pcm.push_interleaved(buf.samples(), spec.channels.count());
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} undecodable packet(s)", skipped);
    }
    log::info!(
        "Decoded audio: {} frames, {} channel(s), {}Hz, {:.1}s",
        pcm.frames(),
        channels,
        sample_rate,
        pcm.duration()
    );
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_stereo_frames() {
        let mut pcm = StereoPcm::with_capacity(48_000, 2);
        pcm.push_interleaved(&[0.1, -0.1, 0.2, -0.2], 2);
        assert_eq!(pcm.left, vec![0.1, 0.2]);
        assert_eq!(pcm.right, vec![-0.1, -0.2]);
    }

    #[test]
    fn duplicates_mono() {
        let mut pcm = StereoPcm::default();
        pcm.push_interleaved(&[0.5, 0.25], 1);
        assert_eq!(pcm.left, pcm.right);
        assert_eq!(pcm.frames(), 2);
    }

    #[test]
    fn drops_surround_channels() {
        let mut pcm = StereoPcm::default();
        pcm.push_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);
        assert_eq!(pcm.left, vec![1.0, 4.0]);
        assert_eq!(pcm.right, vec![2.0, 5.0]);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let mut pcm = StereoPcm::with_capacity(4, 8);
        pcm.push_interleaved(&[0.0; 16], 2);
        assert_eq!(pcm.duration(), 2.0);
        assert_eq!(StereoPcm::default().duration(), 0.0);
    }

    #[test]
    fn missing_and_garbage_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_audio(&dir.path().join("missing.wav")).is_err());

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"not audio at all").unwrap();
        assert!(decode_audio(&garbage).is_err());
    }
}
