//! Live audio input: device enumeration, loopback lookup and the capture
//! stream that feeds the spectral analyzer.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use super::analysis::{
    Analysis, AnalysisReader, SpectralAnalyzer, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE,
};
use crate::error::AudioError;

/// Name fragments that identify an input mirroring system output.
const LOOPBACK_MARKERS: &[&str] = &["monitor", "loopback", "stereo mix", "what u hear"];

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Index into [`list_devices`]
    pub device: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per hardware block; also the analysis window size
    pub block_size: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: 0,
            sample_rate: 44100,
            channels: 2,
            block_size: DEFAULT_WINDOW_SIZE as u32,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::Configuration("sample rate must be non-zero".into()));
        }
        if self.channels == 0 {
            return Err(AudioError::Configuration("channel count must be non-zero".into()));
        }
        let block = self.block_size as usize;
        if block < 2 || block % 2 != 0 || block > MAX_WINDOW_SIZE {
            return Err(AudioError::Configuration(format!(
                "block size must be an even number in 2..={}, got {}",
                MAX_WINDOW_SIZE, self.block_size
            )));
        }
        Ok(())
    }

    /// Spectrum length produced by this configuration.
    pub fn spectrum_len(&self) -> usize {
        self.block_size as usize / 2
    }
}

fn input_devices(host: &cpal::Host) -> Result<Vec<cpal::Device>, AudioError> {
    host.input_devices()
        .map(|devices| devices.collect())
        .map_err(|e| AudioError::Host(format!("Failed to enumerate input devices: {}", e)))
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "<unnamed device>".to_string())
}

/// Names of all input devices, in host order. Indices match
/// [`CaptureConfig::device`].
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    Ok(input_devices(&host)?.iter().map(device_name).collect())
}

/// Index of the first loopback-capable input device.
pub fn default_loopback_device() -> Result<usize, AudioError> {
    let names = list_devices()?;
    find_loopback(&names).ok_or(AudioError::DeviceUnavailable)
}

pub fn find_loopback(names: &[String]) -> Option<usize> {
    names.iter().position(|name| {
        let name = name.to_lowercase();
        LOOPBACK_MARKERS.iter().any(|marker| name.contains(marker))
    })
}

/// Downmix interleaved frames to mono i16 by averaging channels.
fn downmix_into<T>(data: &[T], channels: usize, out: &mut Vec<i16>)
where
    T: Sample,
    i16: FromSample<T>,
{
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().map(|&s| i16::from_sample(s)));
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: i32 = frame.iter().map(|&s| i32::from(i16::from_sample(s))).sum();
        out.push((sum / channels as i32) as i16);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut analyzer: SpectralAnalyzer,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut mono: Vec<i16> = Vec::with_capacity(analyzer.window_size());

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                downmix_into(data, channels, &mut mono);
                analyzer.ingest(&mono);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Configuration(format!("Failed to open input stream: {}", e)))
}

/// Owns at most one open input stream. Restarting replaces the stream and
/// its analyzer; the slot read by [`AudioCaptureSource::snapshot`] survives.
pub struct AudioCaptureSource {
    host: cpal::Host,
    stream: Option<cpal::Stream>,
    config: Option<CaptureConfig>,
    reader: AnalysisReader,
}

impl AudioCaptureSource {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: None,
            config: None,
            reader: AnalysisReader::default(),
        }
    }

    pub fn start(&mut self, config: CaptureConfig) -> Result<(), AudioError> {
        self.close();
        config.validate()?;

        let devices = input_devices(&self.host)?;
        let device = devices.get(config.device).ok_or_else(|| {
            AudioError::Configuration(format!(
                "no input device at index {} ({} available)",
                config.device,
                devices.len()
            ))
        })?;

        let sample_format = device
            .default_input_config()
            .map_err(|e| {
                AudioError::Configuration(format!("Failed to query device config: {}", e))
            })?
            .sample_format();

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.block_size),
        };

        let analyzer =
            SpectralAnalyzer::with_reader(config.block_size as usize, self.reader.clone())?;

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(device, &stream_config, analyzer)?,
            SampleFormat::U16 => build_stream::<u16>(device, &stream_config, analyzer)?,
            SampleFormat::F32 => build_stream::<f32>(device, &stream_config, analyzer)?,
            other => {
                return Err(AudioError::Configuration(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };

        // dropping `stream` on failure releases the device
        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("Failed to start input stream: {}", e)))?;

        log::info!(
            "Audio: {} @ {}Hz, {} ch, block {} -> {} bins ({:?})",
            device_name(device),
            config.sample_rate,
            config.channels,
            config.block_size,
            config.spectrum_len(),
            sample_format
        );

        self.stream = Some(stream);
        self.config = Some(config);
        Ok(())
    }

    /// Stop and release the stream. Once this returns the callback no
    /// longer runs. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("Failed to pause input stream: {}", err);
            }
            drop(stream);
            log::info!("Audio capture closed");
        }
        self.config = None;
    }

    /// The running configuration, `None` while closed.
    pub fn config(&self) -> Option<&CaptureConfig> {
        self.config.as_ref()
    }

    pub fn snapshot(&self) -> Arc<Analysis> {
        self.reader.snapshot()
    }
}

impl Default for AudioCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioCaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_loopback_matches_monitor_names() {
        let names = vec![
            "Built-in Microphone".to_string(),
            "Monitor of Built-in Audio Analog Stereo".to_string(),
            "Stereo Mix (Realtek)".to_string(),
        ];
        assert_eq!(find_loopback(&names), Some(1));
        assert_eq!(find_loopback(&names[2..]), Some(0));
        assert_eq!(find_loopback(&names[..1]), None);
    }

    #[test]
    fn downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_into(&[100i16, 300, -200, 200, 50, 51], 2, &mut out);
        assert_eq!(out, vec![200, 0, 50]);

        downmix_into(&[1i16, 2, 3], 1, &mut out);
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn downmix_converts_float_samples() {
        let mut out = Vec::new();
        downmix_into(&[0.0f32, 1.0, -1.0], 1, &mut out);
        assert_eq!(out[0], 0);
        assert!(out[1] > 32000);
        assert!(out[2] < -32000);
    }

    #[test]
    fn config_validation() {
        assert!(CaptureConfig::default().validate().is_ok());
        assert_eq!(CaptureConfig::default().spectrum_len(), 512);

        let bad_block = CaptureConfig {
            block_size: 1023,
            ..Default::default()
        };
        assert!(matches!(bad_block.validate(), Err(AudioError::Configuration(_))));

        let huge_block = CaptureConfig {
            block_size: u32::MAX - 1,
            ..Default::default()
        };
        assert!(matches!(huge_block.validate(), Err(AudioError::Configuration(_))));

        let largest = CaptureConfig {
            block_size: MAX_WINDOW_SIZE as u32,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());

        let no_channels = CaptureConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(no_channels.validate().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let mut source = AudioCaptureSource::new();
        source.close();
        source.close();
        assert!(source.config().is_none());
    }

    #[test]
    fn invalid_config_is_reported_not_started() {
        let mut source = AudioCaptureSource::new();
        let err = source
            .start(CaptureConfig {
                block_size: 0,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AudioError::Configuration(_)));
        assert!(source.config().is_none());
    }

    #[test]
    fn oversized_block_is_reported_not_started() {
        let mut source = AudioCaptureSource::new();
        let err = source
            .start(CaptureConfig {
                block_size: u32::MAX - 1,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AudioError::Configuration(_)));
        assert!(source.config().is_none());
    }

    #[test]
    fn out_of_range_device_is_reported() {
        let mut source = AudioCaptureSource::new();
        let err = source
            .start(CaptureConfig {
                device: usize::MAX,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AudioError::Configuration(_) | AudioError::Host(_)));
        assert!(source.config().is_none());
        source.close();
    }

    #[test]
    fn snapshot_is_empty_without_stream() {
        let source = AudioCaptureSource::new();
        let snapshot = source.snapshot();
        assert_eq!(snapshot.rms, 0.0);
        assert!(snapshot.spectrum.is_empty());
    }
}
