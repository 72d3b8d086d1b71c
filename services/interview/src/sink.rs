use rehearse_core::playback::{AudioSink, ScheduledChunk};
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for headless runs: records what would have been played.
#[derive(Default)]
pub struct LogSink {
    played: AtomicU64,
}

impl LogSink {
    pub fn chunks_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }
}

impl AudioSink for LogSink {
    fn play(&self, chunk: &ScheduledChunk) {
        self.played.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            start = chunk.start,
            duration = chunk.duration,
            generation = chunk.generation,
            "persona audio"
        );
    }

    fn stop(&self) {
        tracing::debug!("persona audio cut off");
    }
}

/// Speaker output through cpal.
#[cfg(feature = "device")]
pub struct DeviceSink {
    output: std::sync::Mutex<rehearse_native_utils::device::OutputStream>,
}

#[cfg(feature = "device")]
impl DeviceSink {
    pub fn open(device_name: Option<String>, source_rate: u32) -> anyhow::Result<Self> {
        let output = rehearse_native_utils::device::start_output_playback(device_name, source_rate)?;
        Ok(Self {
            output: std::sync::Mutex::new(output),
        })
    }
}

#[cfg(feature = "device")]
impl AudioSink for DeviceSink {
    fn play(&self, chunk: &ScheduledChunk) {
        match self.output.lock() {
            Ok(mut output) => output.push(&chunk.audio.samples),
            Err(_) => tracing::error!("output stream lock poisoned"),
        }
    }

    fn stop(&self) {
        if let Ok(output) = self.output.lock() {
            output.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehearse_core::playback::DecodedAudio;

    #[test]
    fn test_log_sink_counts_chunks() {
        let sink = LogSink::default();
        let chunk = ScheduledChunk {
            start: 0.0,
            duration: 0.5,
            audio: DecodedAudio {
                samples: vec![0.0; 12_000],
                sample_rate: 24_000,
            },
            generation: 0,
        };
        sink.play(&chunk);
        sink.play(&chunk);
        sink.stop();
        assert_eq!(sink.chunks_played(), 2);
    }
}
