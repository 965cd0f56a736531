//! Slicer "spectrum" diagnostic string, recorded on each accepted DLQ
//! frame (§3 "Receive queue", §4.2 "Output").
//!
//! Not a full spectral analyzer: this is a cheap per-frame audio-quality
//! glance an operator can eyeball in a log line, rendered as a fixed-width
//! ASCII bar chart rather than returned as raw float bins.

use rustfft::{num_complex::Complex32, FftPlanner};

const FFT_SIZE: usize = 256;
const BAR_LEVELS: &[u8] = b" .-:=+*#%@";

/// Render a compact ASCII power-spectrum bar chart over the most recent
/// samples feeding a slicer at the moment its frame closed. Returns an
/// empty string if fewer than `FFT_SIZE` samples are available yet —
/// callers should prefer the most recent window of raw audio samples
/// leading up to frame close.
pub fn spectrum_string(samples: &[f32]) -> String {
    if samples.len() < FFT_SIZE {
        return String::new();
    }
    let window = &samples[samples.len() - FFT_SIZE..];

    let mut buffer: Vec<Complex32> = window
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let hamming =
                0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE as f32 - 1.0)).cos();
            Complex32::new(s * hamming, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    fft.process(&mut buffer);

    // Only the first half is meaningful for a real-valued input signal.
    let half = FFT_SIZE / 2;
    let magnitudes: Vec<f32> = buffer[..half].iter().map(|c| c.norm()).collect();
    let peak = magnitudes.iter().cloned().fold(0.0f32, f32::max).max(1e-6);

    // Downsample to a fixed number of columns for a terse log line.
    const COLUMNS: usize = 32;
    let bucket_size = half / COLUMNS;
    let mut out = String::with_capacity(COLUMNS);
    for col in 0..COLUMNS {
        let start = col * bucket_size;
        let end = (start + bucket_size).min(half);
        let bucket_peak = magnitudes[start..end].iter().cloned().fold(0.0f32, f32::max);
        let ratio = (bucket_peak / peak).clamp(0.0, 1.0);
        let level = ((ratio * (BAR_LEVELS.len() - 1) as f32).round() as usize).min(BAR_LEVELS.len() - 1);
        out.push(BAR_LEVELS[level] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_for_short_windows() {
        assert_eq!(spectrum_string(&[0.0; 10]), "");
    }

    #[test]
    fn produces_fixed_width_output() {
        let samples: Vec<f32> = (0..512)
            .map(|i| (i as f32 * 0.3).sin())
            .collect();
        let s = spectrum_string(&samples);
        assert_eq!(s.len(), 32);
    }

    #[test]
    fn tone_produces_a_peak_column() {
        let samples: Vec<f32> = (0..512).map(|i| (i as f32 * 0.3).sin()).collect();
        let s = spectrum_string(&samples);
        assert!(s.contains('@'), "expected a peak bar in {s:?}");
    }
}
