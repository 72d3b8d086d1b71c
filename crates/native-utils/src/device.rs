use crate::audio::{self, INPUT_PCM16_SAMPLE_RATE};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FrameCount, StreamConfig};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

/// Frames per callback requested from the input device.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames per callback requested from the output device.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Output ring buffer length in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the named input device, or the host default when no name is given.
pub fn get_or_default_input(device_name: Option<&str>) -> Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device available"),
        Some(target) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("Input device '{target}' not found")),
    }
}

/// Finds the named output device, or the host default when no name is given.
pub fn get_or_default_output(device_name: Option<&str>) -> Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device available"),
        Some(target) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("Output device '{target}' not found")),
    }
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// A running microphone capture. The cpal stream lives on its own thread
/// because it cannot cross threads itself.
pub struct CaptureStream {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureStream {
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts capturing mono PCM16 at the provider's input rate. `on_chunk` runs on
/// the audio callback thread and must not block.
pub fn start_input_capture<F>(device_name: Option<String>, on_chunk: F) -> Result<CaptureStream>
where
    F: FnMut(Vec<i16>) + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let thread = std::thread::spawn(move || {
        let setup = || -> Result<cpal::Stream> {
            let input = get_or_default_input(device_name.as_deref())?;
            tracing::info!("Using input device: {:?}", input.name()?);
            let default = input
                .default_input_config()
                .context("Failed to get default input config")?;
            let config = StreamConfig {
                channels: default.channels(),
                sample_rate: default.sample_rate(),
                buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
            };
            let channels = config.channels as usize;
            let mut resampler = create_resampler(
                config.sample_rate.0 as f64,
                INPUT_PCM16_SAMPLE_RATE as f64,
                INPUT_CHUNK_SIZE,
            )?;
            let mut pending: Vec<f32> = Vec::with_capacity(INPUT_CHUNK_SIZE * 2);

            let data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
                pending.extend(audio::downmix_to_mono(data, channels));
                let mut resampled = Vec::new();
                while pending.len() >= INPUT_CHUNK_SIZE {
                    let chunk: Vec<f32> = pending.drain(..INPUT_CHUNK_SIZE).collect();
                    if let Ok(out) = resampler.process(&[chunk.as_slice()], None) {
                        if let Some(out) = out.first() {
                            resampled.extend_from_slice(out);
                        }
                    }
                }
                if !resampled.is_empty() {
                    on_chunk(audio::convert_f32_to_i16(&resampled));
                }
            };
            let stream = input.build_input_stream(
                &config,
                data_fn,
                move |err| tracing::error!("An error occurred on input stream: {}", err),
                None,
            )?;
            stream.play().context("Failed to start input stream")?;
            Ok(stream)
        };

        match setup() {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("input capture stopped");
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(CaptureStream {
            stop_tx,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => Err(anyhow::anyhow!("capture thread exited before reporting readiness")),
    }
}

/// Speaker output fed from a ring buffer. Samples pushed here play in order;
/// `flush` drops whatever has not been played yet.
pub struct OutputStream {
    producer: ringbuf::HeapProd<f32>,
    resampler: FastFixedIn<f32>,
    flush: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
}

impl OutputStream {
    pub fn push(&mut self, samples: &[f32]) {
        let chunk_size = self.resampler.input_frames_next();
        for chunk in samples.chunks(chunk_size) {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            if let Ok(out) = self.resampler.process(&[chunk.as_slice()], None) {
                if let Some(out) = out.first() {
                    for sample in out {
                        if self.producer.try_push(*sample).is_err() {
                            tracing::warn!("output buffer full, dropping samples");
                            return;
                        }
                    }
                }
            }
        }
    }

    pub fn flush(&self) {
        self.flush.store(true, Ordering::SeqCst);
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Opens the output device for speech arriving at `source_rate`.
pub fn start_output_playback(device_name: Option<String>, source_rate: u32) -> Result<OutputStream> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(ringbuf::HeapProd<f32>, f64)>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let flush = Arc::new(AtomicBool::new(false));
    let flush_flag = flush.clone();

    std::thread::spawn(move || {
        let setup = || -> Result<(cpal::Stream, ringbuf::HeapProd<f32>, f64)> {
            let output = get_or_default_output(device_name.as_deref())?;
            tracing::info!("Using output device: {:?}", output.name()?);
            let default = output
                .default_output_config()
                .context("Failed to get default output config")?;
            let config = StreamConfig {
                channels: default.channels(),
                sample_rate: default.sample_rate(),
                buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
            };
            let channels = config.channels as usize;
            let rate = config.sample_rate.0 as f64;
            let buffer = HeapRb::<f32>::new(rate as usize * OUTPUT_LATENCY_MS / 1000);
            let (producer, mut consumer) = buffer.split();

            let data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if flush_flag.swap(false, Ordering::SeqCst) {
                    while consumer.try_pop().is_some() {}
                }
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.try_pop().unwrap_or(0.0);
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }
            };
            let stream = output.build_output_stream(
                &config,
                data_fn,
                move |err| tracing::error!("An error occurred on output stream: {}", err),
                None,
            )?;
            stream.play().context("Failed to start output stream")?;
            Ok((stream, producer, rate))
        };

        match setup() {
            Ok((stream, producer, rate)) => {
                let _ = ready_tx.send(Ok((producer, rate)));
                let _ = stop_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    let (producer, device_rate) = ready_rx
        .recv()
        .map_err(|_| anyhow::anyhow!("output thread exited before reporting readiness"))??;
    let resampler = create_resampler(source_rate as f64, device_rate, 100)?;
    Ok(OutputStream {
        producer,
        resampler,
        flush,
        stop_tx,
    })
}
