use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::AudioError;

pub const DEFAULT_WINDOW_SIZE: usize = 1024;

/// Largest accepted analysis window.
pub const MAX_WINDOW_SIZE: usize = 16384;

/// Largest positive i16 amplitude, used to normalise RMS to [0, 1].
const MAX_AMPLITUDE: f32 = 32767.0;

/// One published analysis result. `rms` and `spectrum` always come from the
/// same window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    /// RMS level, normalised (0.0-1.0)
    pub rms: f32,
    /// |FFT| / window_size for the positive-frequency half (window_size / 2 bins)
    pub spectrum: Vec<f32>,
}

/// Cloneable read side of the analyzer. Readers only ever clone an `Arc`
/// under the lock, never wait on an FFT.
#[derive(Clone, Default)]
pub struct AnalysisReader {
    slot: Arc<Mutex<Arc<Analysis>>>,
}

impl AnalysisReader {
    pub fn snapshot(&self) -> Arc<Analysis> {
        Arc::clone(&self.slot.lock())
    }

    fn publish(&self, analysis: Analysis) {
        let analysis = Arc::new(analysis);
        *self.slot.lock() = analysis;
    }
}

/// Sliding-window RMS + magnitude spectrum over an i16 sample stream.
///
/// Owned and mutated by a single producer (the capture callback). Other
/// threads observe results through [`AnalysisReader`].
pub struct SpectralAnalyzer {
    window_size: usize,
    buffer: VecDeque<i16>,
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    published: AnalysisReader,
}

impl SpectralAnalyzer {
    #[cfg(test)]
    pub fn new(window_size: usize) -> Result<Self, AudioError> {
        Self::with_reader(window_size, AnalysisReader::default())
    }

    /// Build an analyzer that publishes into an existing slot, so readers
    /// handed out earlier keep working across stream restarts.
    pub fn with_reader(window_size: usize, published: AnalysisReader) -> Result<Self, AudioError> {
        if window_size < 2 || window_size % 2 != 0 || window_size > MAX_WINDOW_SIZE {
            return Err(AudioError::Configuration(format!(
                "analysis window must be an even number of samples in 2..={}, got {}",
                MAX_WINDOW_SIZE, window_size
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Ok(Self {
            window_size,
            buffer: VecDeque::with_capacity(window_size * 2),
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); window_size],
            scratch,
            published,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of samples queued but not yet consumed by a window.
    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn reader(&self) -> AnalysisReader {
        self.published.clone()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Arc<Analysis> {
        self.published.snapshot()
    }

    pub fn ingest(&mut self, samples: &[i16]) {
        self.buffer.extend(samples.iter().copied());

        while self.buffer.len() >= self.window_size {
            let analysis = self.analyze_front();
            self.buffer.drain(..self.window_size);
            self.published.publish(analysis);
        }
    }

    fn analyze_front(&mut self) -> Analysis {
        let n = self.window_size;

        let mut sum_sq = 0.0f64;
        for (slot, &sample) in self.fft_buffer.iter_mut().zip(self.buffer.iter()) {
            sum_sq += f64::from(sample) * f64::from(sample);
            *slot = Complex::new(f32::from(sample), 0.0);
        }
        let rms = ((sum_sq / n as f64).sqrt() as f32 / MAX_AMPLITUDE).min(1.0);

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        let spectrum = self.fft_buffer[..n / 2]
            .iter()
            .map(|c| c.norm() / n as f32)
            .collect();

        Analysis { rms, spectrum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn constant(value: i16, len: usize) -> Vec<i16> {
        vec![value; len]
    }

    #[test]
    fn snapshot_before_first_window() {
        let analyzer = SpectralAnalyzer::new(DEFAULT_WINDOW_SIZE).unwrap();
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.rms, 0.0);
        assert!(snapshot.spectrum.is_empty());
    }

    #[test]
    fn rejects_odd_or_tiny_windows() {
        assert!(SpectralAnalyzer::new(0).is_err());
        assert!(SpectralAnalyzer::new(1).is_err());
        assert!(SpectralAnalyzer::new(1023).is_err());
        assert!(SpectralAnalyzer::new(2).is_ok());
    }

    #[test]
    fn rejects_windows_past_the_limit() {
        assert!(SpectralAnalyzer::new(MAX_WINDOW_SIZE).is_ok());
        assert!(matches!(
            SpectralAnalyzer::new(MAX_WINDOW_SIZE + 2),
            Err(AudioError::Configuration(_))
        ));
        assert!(SpectralAnalyzer::new(u32::MAX as usize - 1).is_err());
    }

    #[test]
    fn partial_windows_accumulate_before_publish() {
        let mut analyzer = SpectralAnalyzer::new(256).unwrap();

        analyzer.ingest(&constant(1000, 100));
        assert!(analyzer.snapshot().spectrum.is_empty());
        analyzer.ingest(&constant(1000, 100));
        assert!(analyzer.snapshot().spectrum.is_empty());
        assert_eq!(analyzer.buffered(), 200);

        analyzer.ingest(&constant(1000, 100));
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.spectrum.len(), 128);
        assert_eq!(analyzer.buffered(), 44);
    }

    #[test]
    fn window_multiples_give_half_length_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_WINDOW_SIZE).unwrap();
        let block: Vec<i16> = (0..DEFAULT_WINDOW_SIZE)
            .map(|i| ((i as f32 * 0.37).sin() * 20000.0) as i16)
            .collect();

        for chunk in block.chunks(300).chain(block.chunks(724)) {
            analyzer.ingest(chunk);
        }

        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.spectrum.len(), DEFAULT_WINDOW_SIZE / 2);
        assert!(snapshot.rms >= 0.0 && snapshot.rms <= 1.0);
        assert_eq!(analyzer.buffered(), 0);
    }

    #[test]
    fn full_scale_negative_stays_in_range() {
        let mut analyzer = SpectralAnalyzer::new(64).unwrap();
        analyzer.ingest(&constant(i16::MIN, 64));
        let snapshot = analyzer.snapshot();
        assert!(snapshot.rms <= 1.0);
        assert!((snapshot.rms - 1.0).abs() < 1e-3);
    }

    #[test]
    fn dc_signal_lands_in_first_bin() {
        let mut analyzer = SpectralAnalyzer::new(512).unwrap();
        analyzer.ingest(&constant(4000, 512));

        let snapshot = analyzer.snapshot();
        assert!((snapshot.rms - 4000.0 / 32767.0).abs() < 1e-5);
        assert!((snapshot.spectrum[0] - 4000.0).abs() < 0.5);
        assert!(snapshot.spectrum[1..].iter().all(|&m| m < 0.5));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let n = 1024;
        let bin = 32;
        let amplitude = 16000.0f32;
        let samples: Vec<i16> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32;
                (phase.sin() * amplitude) as i16
            })
            .collect();

        let mut analyzer = SpectralAnalyzer::new(n).unwrap();
        analyzer.ingest(&samples);
        let snapshot = analyzer.snapshot();

        let (peak, magnitude) = snapshot
            .spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
        assert_eq!(peak, bin);
        // A real sine splits its energy between +f and -f
        assert!((magnitude - amplitude / 2.0).abs() < amplitude * 0.01);
        // RMS of a sine is A / sqrt(2)
        let expected_rms = amplitude / 2.0f32.sqrt() / 32767.0;
        assert!((snapshot.rms - expected_rms).abs() < 1e-3);
    }

    #[test]
    fn leftover_samples_slide_into_next_window() {
        let mut analyzer = SpectralAnalyzer::new(128).unwrap();

        let mut first = constant(1000, 128);
        first.extend(constant(2000, 64));
        analyzer.ingest(&first);
        assert!((analyzer.snapshot().rms - 1000.0 / 32767.0).abs() < 1e-5);
        assert_eq!(analyzer.buffered(), 64);

        analyzer.ingest(&constant(2000, 64));
        assert!((analyzer.snapshot().rms - 2000.0 / 32767.0).abs() < 1e-5);
        assert_eq!(analyzer.buffered(), 0);
    }

    #[test]
    fn reader_shares_published_slot() {
        let reader = AnalysisReader::default();
        let mut analyzer = SpectralAnalyzer::with_reader(64, reader.clone()).unwrap();
        analyzer.ingest(&constant(300, 64));
        assert_eq!(reader.snapshot().spectrum.len(), 32);

        // a new analyzer on the same slot keeps publishing where readers look
        let mut replacement = SpectralAnalyzer::with_reader(128, reader.clone()).unwrap();
        replacement.ingest(&constant(300, 128));
        assert_eq!(reader.snapshot().spectrum.len(), 64);
    }

    #[test]
    fn snapshot_pairs_are_never_mixed() {
        const WINDOW: usize = 1024;
        let mut analyzer = SpectralAnalyzer::new(WINDOW).unwrap();
        let reader = analyzer.reader();

        let writer = thread::spawn(move || {
            for round in 1..=200i16 {
                // every window is a distinct DC level, so rms and bin 0 identify it
                let level = round * 50;
                for chunk in constant(level, WINDOW).chunks(333) {
                    analyzer.ingest(chunk);
                }
            }
        });

        let mut observed = 0;
        while !writer.is_finished() || observed == 0 {
            let snapshot = reader.snapshot();
            if snapshot.spectrum.is_empty() {
                assert_eq!(snapshot.rms, 0.0);
                continue;
            }
            assert_eq!(snapshot.spectrum.len(), WINDOW / 2);
            let level_from_rms = snapshot.rms * 32767.0;
            let level_from_fft = snapshot.spectrum[0];
            assert!(
                (level_from_rms - level_from_fft).abs() < 1.0,
                "rms level {} does not match spectrum level {}",
                level_from_rms,
                level_from_fft
            );
            observed += 1;
        }

        writer.join().unwrap();
        let last = reader.snapshot();
        assert!((last.rms * 32767.0 - 10000.0).abs() < 1.0);
    }
}
