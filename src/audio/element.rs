use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::decode::StereoPcm;

/// The playback element the visualizer listens to.
///
/// Transport (play/pause/seek) belongs to the host; the visualizer only taps
/// the audio that is currently coming out of the element.
pub trait AudioElement: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn is_playing(&self) -> bool;

    /// Fill `left` and `right` with the most recent frames ending at the
    /// playhead. Frames before the start of the stream, and everything while
    /// paused, are silence.
    fn tap(&self, left: &mut [f32], right: &mut [f32]);
}

pub type SharedElement = Arc<dyn AudioElement>;

/// A fully decoded track played from memory. The host moves the playhead.
pub struct PcmElement {
    pcm: StereoPcm,
    position: AtomicUsize,
    playing: AtomicBool,
}

impl PcmElement {
    pub fn new(pcm: StereoPcm) -> Self {
        Self {
            pcm,
            position: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
        }
    }

    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn seek(&self, seconds: f32) {
        let frame = (seconds.max(0.0) * self.pcm.sample_rate as f32) as usize;
        self.position.store(frame.min(self.pcm.frames()), Ordering::Release);
    }

    pub fn position(&self) -> f32 {
        self.position.load(Ordering::Acquire) as f32 / self.pcm.sample_rate as f32
    }

    pub fn duration(&self) -> f32 {
        self.pcm.duration()
    }

    pub fn ended(&self) -> bool {
        self.position.load(Ordering::Acquire) >= self.pcm.frames()
    }
}

impl AudioElement for PcmElement {
    fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire) && !self.ended()
    }

    fn tap(&self, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);
        if !self.is_playing() {
            return;
        }
        let end = self.position.load(Ordering::Acquire).min(self.pcm.frames());
        let len = left.len().min(right.len());
        let start = end.saturating_sub(len);
        let available = end - start;
        let offset = len - available;
        left[offset..len].copy_from_slice(&self.pcm.left[start..end]);
        right[offset..len].copy_from_slice(&self.pcm.right[start..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> StereoPcm {
        StereoPcm {
            left: (0..frames).map(|i| i as f32).collect(),
            right: (0..frames).map(|i| -(i as f32)).collect(),
            sample_rate: 10,
        }
    }

    #[test]
    fn tap_is_silent_while_paused() {
        let element = PcmElement::new(ramp(100));
        element.seek(5.0);
        let mut l = [1.0f32; 4];
        let mut r = [1.0f32; 4];
        element.tap(&mut l, &mut r);
        assert_eq!(l, [0.0; 4]);
        assert_eq!(r, [0.0; 4]);
    }

    #[test]
    fn tap_ends_at_playhead() {
        let element = PcmElement::new(ramp(100));
        element.play();
        element.seek(5.0);
        let mut l = [0.0f32; 4];
        let mut r = [0.0f32; 4];
        element.tap(&mut l, &mut r);
        assert_eq!(l, [46.0, 47.0, 48.0, 49.0]);
        assert_eq!(r, [-46.0, -47.0, -48.0, -49.0]);
    }

    #[test]
    fn tap_pads_the_start_of_the_stream() {
        let element = PcmElement::new(ramp(100));
        element.play();
        element.seek(0.2);
        let mut l = [9.0f32; 4];
        let mut r = [9.0f32; 4];
        element.tap(&mut l, &mut r);
        assert_eq!(l, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let element = PcmElement::new(ramp(100));
        element.play();
        element.seek(60.0);
        assert!(element.ended());
        assert!(!element.is_playing());
    }
}
