//! Audio device output using cpal
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated
//! `bgm-audio-out` thread for the lifetime of the sink. The sink handle only
//! swaps the shared cursor and toggles the playing flag; the device callback
//! renders silence whenever nothing is playing.

use super::sink::{AudioSink, FaultHandler, LoopingCursor};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type SharedCursor = Arc<Mutex<Option<Arc<LoopingCursor>>>>;
type SharedFaultHandler = Arc<Mutex<Option<FaultHandler>>>;

/// Device negotiated by the output thread
struct OpenedDevice {
    name: String,
    sample_rate: u32,
    channels: u16,
}

/// Sink writing to a cpal output device
pub struct CpalSink {
    cursor: SharedCursor,
    playing: Arc<AtomicBool>,
    fault_handler: SharedFaultHandler,
    sample_rate: u32,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        Ok(devices)
    }

    /// Open an output device (None = default) and start its stream.
    ///
    /// A named device that cannot be found falls back to the default device.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let cursor: SharedCursor = Arc::new(Mutex::new(None));
        let playing = Arc::new(AtomicBool::new(false));
        let fault_handler: SharedFaultHandler = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<OpenedDevice>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_cursor = Arc::clone(&cursor);
        let thread_playing = Arc::clone(&playing);
        let thread_faults = Arc::clone(&fault_handler);
        let thread = thread::Builder::new()
            .name("bgm-audio-out".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name, thread_cursor, thread_playing, thread_faults) {
                    Ok((stream, opened)) => {
                        let _ = ready_tx.send(Ok(opened));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Hold the stream until the sink is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio output thread exiting");
            })?;

        let opened = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio output thread exited during startup".to_string()))??;

        info!(
            "Audio output ready: {} ({}Hz, {} channels)",
            opened.name, opened.sample_rate, opened.channels
        );

        Ok(Self {
            cursor,
            playing,
            fault_handler,
            sample_rate: opened.sample_rate,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

fn build_stream(
    device_name: Option<String>,
    cursor: SharedCursor,
    playing: Arc<AtomicBool>,
    faults: SharedFaultHandler,
) -> Result<(Stream, OpenedDevice)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name.as_deref())?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels;

    let fault_playing = Arc::clone(&playing);
    let err_fn = move |e: cpal::StreamError| report_fault(&faults, &fault_playing, e);

    let stream = match sample_format {
        SampleFormat::F32 => {
            let channel_count = channels as usize;
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&cursor, &playing, data, channel_count);
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let channel_count = channels as usize;
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    render(&cursor, &playing, &mut scratch, channel_count);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other)));
        }
    }
    .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((
        stream,
        OpenedDevice {
            name,
            sample_rate: config.sample_rate.0,
            channels,
        },
    ))
}

/// Stream error path: output stops and the installed handler hears about it
fn report_fault(faults: &SharedFaultHandler, playing: &AtomicBool, e: cpal::StreamError) {
    error!("Audio stream error: {}", e);
    playing.store(false, Ordering::Relaxed);
    let handler = faults.lock().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(handler) = handler {
        handler(format!("audio output: {}", e));
    }
}

/// Device callback body; never blocks on the cursor lock
fn render(cursor: &SharedCursor, playing: &AtomicBool, data: &mut [f32], channels: usize) {
    if !playing.load(Ordering::Relaxed) {
        data.fill(0.0);
        return;
    }
    match cursor.try_lock() {
        Ok(guard) => match guard.as_ref() {
            Some(cursor) => {
                cursor.fill(data, channels);
            }
            None => data.fill(0.0),
        },
        Err(_) => data.fill(0.0),
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load(&mut self, cursor: Arc<LoopingCursor>) -> Result<()> {
        self.playing.store(false, Ordering::Relaxed);
        let mut slot = self
            .cursor
            .lock()
            .map_err(|_| Error::AudioOutput("Cursor lock poisoned".to_string()))?;
        *slot = Some(cursor);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let loaded = self.cursor.lock().map(|slot| slot.is_some()).unwrap_or(false);
        if !loaded {
            return Err(Error::AudioOutput("No track loaded".to_string()));
        }
        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn unload(&mut self) {
        self.playing.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.cursor.lock() {
            *slot = None;
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    fn set_fault_handler(&mut self, handler: Option<FaultHandler>) {
        *self.fault_handler.lock().unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.unload();
        // Closing the channel releases the output thread
        self.shutdown_tx.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}
