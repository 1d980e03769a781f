//! Owned mono waveform plus fixed-length windowing.
//!
//! Every stage of the pipeline takes a [`WaveformBuffer`] by reference and
//! returns a fresh one, so a single decoded clip can feed several
//! augmentation branches without copies leaking state between them.
//!
//! # Segmentation policy
//!
//! [`WaveformBuffer::segments`] yields windows starting at `k * hop`.  A
//! window is produced only when it lies entirely inside the buffer; a
//! trailing partial window is **dropped**, never padded.
//!
//! ```rust
//! use aimusic_dataset::audio::WaveformBuffer;
//!
//! let buf = WaveformBuffer::new(vec![0.0; 25], 10);
//! let lens: Vec<usize> = buf.segments(10, 10).map(|s| s.len()).collect();
//! assert_eq!(lens, vec![10, 10]); // last 5 samples dropped
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WaveformBuffer
// ---------------------------------------------------------------------------

/// Mono `f32` samples tagged with their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl WaveformBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds; `0.0` when the sample rate is zero.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Maximum absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// Root-mean-square level, accumulated in `f64`.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }

    /// Build a new buffer at the same rate by mapping every sample.
    pub fn map_samples(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(self.samples.iter().map(|&s| f(s)).collect(), self.sample_rate)
    }

    /// Lazily iterate fixed-length windows of `segment_length` samples,
    /// advancing `hop` samples between window starts.
    ///
    /// # Panics
    ///
    /// Panics if `segment_length == 0` or `hop == 0`.
    pub fn segments(&self, segment_length: usize, hop: usize) -> Segments<'_> {
        assert!(segment_length > 0, "segment length must be > 0");
        assert!(hop > 0, "segment hop must be > 0");
        Segments {
            source: self,
            segment_length,
            hop,
            next_start: 0,
        }
    }

    /// Number of windows [`segments`](Self::segments) will yield.
    pub fn segment_count(&self, segment_length: usize, hop: usize) -> usize {
        if segment_length == 0 || hop == 0 || self.samples.len() < segment_length {
            return 0;
        }
        (self.samples.len() - segment_length) / hop + 1
    }
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Iterator returned by [`WaveformBuffer::segments`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    source: &'a WaveformBuffer,
    segment_length: usize,
    hop: usize,
    next_start: usize,
}

impl Iterator for Segments<'_> {
    type Item = WaveformBuffer;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.next_start.checked_add(self.segment_length)?;
        if end > self.source.len() {
            return None;
        }
        let window = self.source.samples[self.next_start..end].to_vec();
        self.next_start = self.next_start.saturating_add(self.hop);
        Some(WaveformBuffer::new(window, self.source.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// Length fitting
// ---------------------------------------------------------------------------

/// Which part of an over-long buffer survives [`fix_length`], and where the
/// zero padding of an under-long buffer goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPolicy {
    /// Keep the first `len` samples; pad zeros at the end.
    #[default]
    Head,
    /// Keep the middle `len` samples; split padding evenly, extra sample at
    /// the end.
    Center,
}

/// Crop or zero-pad `buffer` to exactly `len` samples.
pub fn fix_length(buffer: &WaveformBuffer, len: usize, policy: CropPolicy) -> WaveformBuffer {
    let src = buffer.samples();
    let out = match (policy, src.len().cmp(&len)) {
        (_, std::cmp::Ordering::Equal) => src.to_vec(),
        (CropPolicy::Head, std::cmp::Ordering::Greater) => src[..len].to_vec(),
        (CropPolicy::Head, std::cmp::Ordering::Less) => {
            let mut padded = src.to_vec();
            padded.resize(len, 0.0);
            padded
        }
        (CropPolicy::Center, std::cmp::Ordering::Greater) => {
            let start = (src.len() - len) / 2;
            src[start..start + len].to_vec()
        }
        (CropPolicy::Center, std::cmp::Ordering::Less) => {
            let before = (len - src.len()) / 2;
            let mut padded = vec![0.0; before];
            padded.extend_from_slice(src);
            padded.resize(len, 0.0);
            padded
        }
    };
    WaveformBuffer::new(out, buffer.sample_rate())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> WaveformBuffer {
        WaveformBuffer::new((0..n).map(|i| i as f32).collect(), 100)
    }

    // ---- Segmentation ------------------------------------------------------

    #[test]
    fn non_overlapping_segments_drop_partial_tail() {
        let buf = ramp(35);
        let segs: Vec<_> = buf.segments(10, 10).collect();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].samples()[0], 0.0);
        assert_eq!(segs[2].samples()[9], 29.0);
        assert_eq!(buf.segment_count(10, 10), 3);
    }

    #[test]
    fn overlapping_segments_follow_hop() {
        let buf = ramp(20);
        let starts: Vec<f32> = buf.segments(10, 5).map(|s| s.samples()[0]).collect();
        assert_eq!(starts, vec![0.0, 5.0, 10.0]);
        assert_eq!(buf.segment_count(10, 5), 3);
    }

    #[test]
    fn buffer_shorter_than_segment_yields_nothing() {
        let buf = ramp(9);
        assert_eq!(buf.segments(10, 10).count(), 0);
        assert_eq!(buf.segment_count(10, 10), 0);
    }

    #[test]
    fn segments_keep_sample_rate() {
        let buf = ramp(20);
        assert!(buf.segments(10, 10).all(|s| s.sample_rate() == 100));
    }

    #[test]
    #[should_panic(expected = "segment hop must be > 0")]
    fn zero_hop_panics() {
        let _ = ramp(10).segments(5, 0);
    }

    // ---- Level helpers -----------------------------------------------------

    #[test]
    fn peak_and_rms() {
        let buf = WaveformBuffer::new(vec![0.5, -1.0, 0.5, -1.0], 4);
        assert!((buf.peak() - 1.0).abs() < 1e-6);
        let expected = ((0.25 + 1.0) / 2.0_f32).sqrt();
        assert!((buf.rms() - expected).abs() < 1e-6);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-6);
    }

    // ---- fix_length --------------------------------------------------------

    #[test]
    fn head_policy_crops_tail_and_pads_end() {
        let cropped = fix_length(&ramp(6), 4, CropPolicy::Head);
        assert_eq!(cropped.samples(), &[0.0, 1.0, 2.0, 3.0]);

        let padded = fix_length(&ramp(2), 4, CropPolicy::Head);
        assert_eq!(padded.samples(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn center_policy_keeps_middle_and_pads_both_sides() {
        let cropped = fix_length(&ramp(6), 4, CropPolicy::Center);
        assert_eq!(cropped.samples(), &[1.0, 2.0, 3.0, 4.0]);

        let padded = fix_length(&WaveformBuffer::new(vec![1.0, 1.0], 100), 5, CropPolicy::Center);
        assert_eq!(padded.samples(), &[0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn exact_length_is_untouched() {
        let buf = ramp(4);
        assert_eq!(fix_length(&buf, 4, CropPolicy::Center), buf);
    }
}
