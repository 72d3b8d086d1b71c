use crate::config::WAV_CHUNK_SAMPLES;
use rehearse_core::error::SessionError;
use rehearse_core::generic_types::MediaChunk;
use rehearse_core::realtime_api::MediaCapture;
use rehearse_core::session::MediaSender;
use rehearse_native_utils::audio::{
    INPUT_PCM16_SAMPLE_RATE, ToBinary, convert_f32_to_i16, downmix_to_mono, input_mime_type,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reads a WAV file into mono PCM16 at the provider's input rate.
pub fn load_wav(path: &Path) -> Result<Vec<i16>, SessionError> {
    let unavailable = |e: hound::Error| SessionError::MediaUnavailable(format!("{}: {e}", path.display()));
    let mut reader = hound::WavReader::open(path).map_err(unavailable)?;

    let spec = reader.spec();
    if spec.sample_rate != INPUT_PCM16_SAMPLE_RATE {
        return Err(SessionError::MediaUnavailable(format!(
            "{} must be {}Hz, got {}Hz",
            path.display(),
            INPUT_PCM16_SAMPLE_RATE,
            spec.sample_rate
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(unavailable)?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(unavailable)?,
    };

    Ok(convert_f32_to_i16(&downmix_to_mono(&samples, spec.channels as usize)))
}

/// Replays a recording as if it were a microphone, paced in real time.
pub struct WavCapture {
    path: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl WavCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            task: None,
        }
    }
}

async fn replay(samples: Vec<i16>, sink: MediaSender) {
    let pace = Duration::from_secs_f64(WAV_CHUNK_SAMPLES as f64 / INPUT_PCM16_SAMPLE_RATE as f64);
    let mut ticker = tokio::time::interval(pace);
    let mime_type = input_mime_type();
    for chunk in samples.chunks(WAV_CHUNK_SAMPLES) {
        ticker.tick().await;
        sink.send(MediaChunk {
            data: chunk.to_binary(),
            mime_type: mime_type.clone(),
        });
    }
    tracing::info!("recording finished");
}

impl MediaCapture for WavCapture {
    fn start(&mut self, sink: MediaSender) -> Result<(), SessionError> {
        let samples = load_wav(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            seconds = samples.len() as f64 / INPUT_PCM16_SAMPLE_RATE as f64,
            "replaying recording as participant audio"
        );
        self.task = Some(tokio::spawn(replay(samples, sink)));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Live microphone capture through the default (or named) input device.
#[cfg(feature = "device")]
pub struct DeviceCapture {
    device_name: Option<String>,
    stream: Option<rehearse_native_utils::device::CaptureStream>,
}

#[cfg(feature = "device")]
impl DeviceCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
        }
    }
}

#[cfg(feature = "device")]
impl MediaCapture for DeviceCapture {
    fn start(&mut self, sink: MediaSender) -> Result<(), SessionError> {
        let mime_type = input_mime_type();
        let stream = rehearse_native_utils::device::start_input_capture(self.device_name.clone(), move |pcm| {
            sink.send(MediaChunk {
                data: pcm.to_binary(),
                mime_type: mime_type.clone(),
            });
        })
        .map_err(|e| SessionError::MediaUnavailable(format!("{e:#}")))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_wav_downmixes_stereo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, INPUT_PCM16_SAMPLE_RATE, 2, &[16384, 0, 0, 0]);

        let samples = load_wav(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 8191).abs() <= 1);
        assert_eq!(samples[1], 0);
    }

    #[test]
    fn test_load_wav_rejects_other_rates_and_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44_100, 1, &[0; 8]);
        assert!(matches!(load_wav(&path), Err(SessionError::MediaUnavailable(_))));

        let mut capture = WavCapture::new(dir.path().join("missing.wav"));
        let err = capture.start(dummy_sender()).unwrap_err();
        assert!(matches!(err, SessionError::MediaUnavailable(_)));
    }

    fn dummy_sender() -> MediaSender {
        rehearse_core::session::StreamingSession::new(
            std::sync::Arc::new(NoProvider),
            Duration::ZERO,
        )
        .media_sender()
    }

    struct NoProvider;

    #[async_trait::async_trait]
    impl rehearse_core::realtime_api::SpeechProvider for NoProvider {
        async fn connect(
            &self,
            _config: rehearse_core::generic_types::LiveSessionConfig,
        ) -> anyhow::Result<rehearse_core::realtime_api::LiveConnection> {
            anyhow::bail!("offline")
        }
    }
}
