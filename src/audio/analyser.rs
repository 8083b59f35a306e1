use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

pub const DEFAULT_RESOLUTION: usize = 2048;
pub const MIN_RESOLUTION: usize = 32;
pub const MAX_RESOLUTION: usize = 16384;

const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

pub fn is_valid_resolution(resolution: usize) -> bool {
    resolution.is_power_of_two() && (MIN_RESOLUTION..=MAX_RESOLUTION).contains(&resolution)
}

/// Single-channel analyser over the most recent `resolution` samples.
///
/// Produces byte-scaled magnitude and time-domain data: magnitudes are
/// Blackman-windowed, smoothed over time and mapped from
/// [-100 dB, -30 dB] onto 0..=255; time-domain samples map [-1, 1] onto
/// 0..=255 with silence at 128.
pub struct AnalyserNode {
    resolution: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl AnalyserNode {
    pub fn new(planner: &mut FftPlanner<f32>, resolution: usize) -> Self {
        let fft = planner.plan_fft_forward(resolution);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            resolution,
            fft,
            window: blackman_window(resolution),
            samples: vec![0.0; resolution],
            spectrum: vec![Complex::new(0.0, 0.0); resolution],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; resolution / 2],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.resolution / 2
    }

    /// Window buffer the splitter writes this channel's samples into.
    pub fn input_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        for ((bin, &sample), &w) in self.spectrum.iter_mut().zip(&self.samples).zip(&self.window) {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / self.resolution as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (i, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.spectrum[i].norm() * scale;
            *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
            if let Some(byte) = out.get_mut(i) {
                let db = 20.0 * smoothed.log10();
                let scaled = (255.0 / range) * (db - MIN_DECIBELS);
                *byte = scaled.floor().clamp(0.0, 255.0) as u8;
            }
        }
    }

    /// Copies the first `out.len()` samples of the window.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (byte, &sample) in out.iter_mut().zip(&self.samples) {
            *byte = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(resolution: usize) -> AnalyserNode {
        AnalyserNode::new(&mut FftPlanner::new(), resolution)
    }

    #[test]
    fn validates_resolutions() {
        assert!(is_valid_resolution(32));
        assert!(is_valid_resolution(2048));
        assert!(is_valid_resolution(16384));
        assert!(!is_valid_resolution(16));
        assert!(!is_valid_resolution(48));
        assert!(!is_valid_resolution(32768));
    }

    #[test]
    fn silence_maps_to_floor_and_midpoint() {
        let mut analyser = node(64);
        let mut freq = [7u8; 32];
        let mut time = [0u8; 32];
        analyser.byte_frequency_data(&mut freq);
        analyser.byte_time_domain_data(&mut time);
        assert!(freq.iter().all(|&b| b == 0));
        assert!(time.iter().all(|&b| b == 128));
    }

    #[test]
    fn time_domain_clamps_full_scale() {
        let mut analyser = node(32);
        analyser.input_mut()[0] = 1.0;
        analyser.input_mut()[1] = -1.0;
        analyser.input_mut()[2] = 2.0;
        let mut time = [0u8; 3];
        analyser.byte_time_domain_data(&mut time);
        assert_eq!(time, [255, 0, 255]);
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let resolution = 256;
        let mut analyser = node(resolution);
        let bin = 16;
        for (i, s) in analyser.input_mut().iter_mut().enumerate() {
            *s = 0.01 * (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / resolution as f32).sin();
        }
        let mut freq = vec![0u8; resolution / 2];
        // Let the temporal smoothing settle.
        for _ in 0..30 {
            analyser.byte_frequency_data(&mut freq);
        }
        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|&(_, &b)| b)
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
        assert!(freq[bin] > 120);
        assert!(freq[bin + 10] < freq[bin]);
    }

    #[test]
    fn output_shorter_than_bins_is_allowed() {
        let mut analyser = node(64);
        let mut freq = [0u8; 4];
        analyser.byte_frequency_data(&mut freq);
        assert_eq!(freq, [0; 4]);
    }
}
