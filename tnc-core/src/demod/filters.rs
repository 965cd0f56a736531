//! FIR low-pass shaping for the 9600-baud baseband path, and a mark/space
//! tone correlator for AFSK.

/// A causal FIR filter over `f32` samples, holding its own ring of
/// history so it can be fed one sample at a time from the per-sample
/// demod loop.
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f32>,
    history: Vec<f32>,
    pos: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f32>) -> Self {
        let len = taps.len();
        Self {
            taps,
            history: vec![0.0; len],
            pos: 0,
        }
    }

    /// Windowed-sinc low-pass design, `cutoff` expressed as a fraction of
    /// the sample rate (e.g. `0.59 * baud_rate / sample_rate` per the 9600
    /// baseband shaping filter).
    pub fn lowpass(cutoff: f32, num_taps: usize) -> Self {
        let m = num_taps - 1;
        let taps: Vec<f32> = (0..num_taps)
            .map(|n| {
                let shifted = n as f32 - m as f32 / 2.0;
                let sinc = if shifted == 0.0 {
                    2.0 * cutoff
                } else {
                    (2.0 * std::f32::consts::PI * cutoff * shifted).sin() / (std::f32::consts::PI * shifted)
                };
                // Hamming window.
                let window = 0.54 - 0.46 * (2.0 * std::f32::consts::PI * n as f32 / m as f32).cos();
                sinc * window
            })
            .collect();
        let sum: f32 = taps.iter().sum();
        let normalized = taps.iter().map(|&t| t / sum).collect();
        Self::new(normalized)
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        self.history[self.pos] = sample;
        let n = self.taps.len();
        let mut acc = 0.0;
        for (i, &tap) in self.taps.iter().enumerate() {
            let idx = (self.pos + n - i) % n;
            acc += tap * self.history[idx];
        }
        self.pos = (self.pos + 1) % n;
        acc
    }
}

/// Mark/space correlator for AFSK: multiplies the incoming sample against
/// local sine/cosine oscillators at the mark and space frequencies, and
/// low-passes each product. The demodulated value is `space_energy -
/// mark_energy` (or the reverse convention — only the sign and zero
/// crossing matter to the slicer); positive means mark tone dominant.
#[derive(Debug, Clone)]
pub struct ToneCorrelator {
    mark_freq: f32,
    space_freq: f32,
    sample_rate: f32,
    sample_index: u32,
    mark_lp_i: FirFilter,
    mark_lp_q: FirFilter,
    space_lp_i: FirFilter,
    space_lp_q: FirFilter,
}

impl ToneCorrelator {
    pub fn new(mark_freq: f32, space_freq: f32, sample_rate: f32) -> Self {
        // Low-pass cutoff roughly half the baud rate is typical; a fixed,
        // modest-length smoothing filter keeps this correlator cheap per
        // sample while still rejecting the 2×tone-frequency component.
        let lp = || FirFilter::lowpass(0.08, 15);
        Self {
            mark_freq,
            space_freq,
            sample_rate,
            sample_index: 0,
            mark_lp_i: lp(),
            mark_lp_q: lp(),
            space_lp_i: lp(),
            space_lp_q: lp(),
        }
    }

    /// Feed one sample, return the mark-minus-space energy discriminant.
    pub fn process(&mut self, sample: f32) -> f32 {
        let n = self.sample_index as f32;
        let mark_angle = 2.0 * std::f32::consts::PI * self.mark_freq * n / self.sample_rate;
        let space_angle = 2.0 * std::f32::consts::PI * self.space_freq * n / self.sample_rate;
        // Wrap the counter at a whole number of cycles of both tones to
        // keep the angle computation numerically stable over long runs.
        self.sample_index = (self.sample_index + 1) % (self.sample_rate as u32);

        let mark_i = self.mark_lp_i.process(sample * mark_angle.cos());
        let mark_q = self.mark_lp_q.process(sample * mark_angle.sin());
        let space_i = self.space_lp_i.process(sample * space_angle.cos());
        let space_q = self.space_lp_q.process(sample * space_angle.sin());

        let mark_energy = mark_i * mark_i + mark_q * mark_q;
        let space_energy = space_i * space_i + space_q * space_q;
        mark_energy - space_energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_attenuates_high_frequency() {
        let mut filter = FirFilter::lowpass(0.05, 31);
        let mut out_energy = 0.0;
        for i in 0..500 {
            let hf = (2.0 * std::f32::consts::PI * 0.4 * i as f32).sin();
            out_energy += filter.process(hf).abs();
        }
        assert!(out_energy / 500.0 < 0.3);
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut filter = FirFilter::lowpass(0.1, 31);
        let mut last = 0.0;
        for _ in 0..200 {
            last = filter.process(1.0);
        }
        assert!((last - 1.0).abs() < 0.1);
    }

    #[test]
    fn correlator_favors_mark_on_mark_tone() {
        let sample_rate = 44_100.0;
        let mut corr = ToneCorrelator::new(1200.0, 2200.0, sample_rate);
        let mut total = 0.0;
        for i in 0..2000 {
            let t = i as f32 / sample_rate;
            let sample = (2.0 * std::f32::consts::PI * 1200.0 * t).sin();
            total += corr.process(sample);
        }
        assert!(total > 0.0);
    }
}
