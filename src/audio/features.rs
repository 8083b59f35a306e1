/// Smoothing factor for the loudness moving average.
pub const LOUDNESS_ALPHA: f32 = 0.1;

/// Per-tick analysis output, ready for texture upload.
#[derive(Clone, Debug, Default)]
pub struct AnalysisFrame {
    /// Byte magnitudes per frequency bin, left channel
    left: Vec<u8>,
    /// Byte magnitudes per frequency bin, right channel
    right: Vec<u8>,
    /// Integer mean of left and right
    mono: Vec<u8>,
    /// Instantaneous time-domain RMS (0.0-1.0)
    rms_left: f32,
    rms_right: f32,
    /// Mean of the channel RMS values
    rms_mono: f32,
}

impl AnalysisFrame {
    pub fn with_bins(bins: usize) -> Self {
        Self {
            left: vec![0; bins],
            right: vec![0; bins],
            mono: vec![0; bins],
            rms_left: 0.0,
            rms_right: 0.0,
            rms_mono: 0.0,
        }
    }

    pub fn bins(&self) -> usize {
        self.left.len()
    }

    pub fn left(&self) -> &[u8] {
        &self.left
    }

    pub fn right(&self) -> &[u8] {
        &self.right
    }

    pub fn mono(&self) -> &[u8] {
        &self.mono
    }

    pub fn rms_left(&self) -> f32 {
        self.rms_left
    }

    pub fn rms_right(&self) -> f32 {
        self.rms_right
    }

    pub fn rms_mono(&self) -> f32 {
        self.rms_mono
    }

    /// Resize all three arrays together, keeping their lengths equal.
    pub(crate) fn resize(&mut self, bins: usize) {
        self.left.resize(bins, 0);
        self.right.resize(bins, 0);
        self.mono.resize(bins, 0);
    }

    pub(crate) fn channels_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut self.left, &mut self.right)
    }

    /// Recompute mono data from the channel arrays and RMS values.
    pub(crate) fn derive_mono(&mut self, rms_left: f32, rms_right: f32) {
        for ((m, &l), &r) in self.mono.iter_mut().zip(&self.left).zip(&self.right) {
            *m = ((l as u16 + r as u16) / 2) as u8;
        }
        self.rms_left = rms_left;
        self.rms_right = rms_right;
        self.rms_mono = (rms_left + rms_right) / 2.0;
    }
}

/// Exponentially smoothed loudness, one value per channel plus mono.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SmoothedLoudness {
    pub left: f32,
    pub right: f32,
    pub mono: f32,
}

impl SmoothedLoudness {
    pub fn update(&mut self, frame: &AnalysisFrame) {
        self.update_with(frame, LOUDNESS_ALPHA);
    }

    /// Fold in one frame with smoothing factor `alpha` in (0, 1].
    pub fn update_with(&mut self, frame: &AnalysisFrame, alpha: f32) {
        self.left = ema(self.left, frame.rms_left, alpha);
        self.right = ema(self.right, frame.rms_right, alpha);
        self.mono = ema(self.mono, frame.rms_mono, alpha);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ema(smoothed: f32, raw: f32, alpha: f32) -> f32 {
    let raw = raw.clamp(0.0, 1.0);
    (smoothed * (1.0 - alpha) + raw * alpha).clamp(0.0, 1.0)
}

/// RMS of byte time-domain data, with 128 as the zero line.
pub fn byte_rms(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: f32 = data
        .iter()
        .map(|&b| {
            let v = (b as f32 - 128.0) / 128.0;
            v * v
        })
        .sum();
    (sum / data.len() as f32).sqrt()
}
