// Audible alert sessions keyed by task id.
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type EndCallback = Box<dyn FnOnce() + Send + 'static>;

/// A live sound started by an `AlertBackend`.
pub trait Playback: Send {
    /// Halts playback and rewinds to the start.
    fn stop(&mut self);
}

/// Host side of the alert: sound output and, where available, vibration.
pub trait AlertBackend: Send + Sync {
    /// Starts the reminder sound. `on_end` runs once if the sound reaches its
    /// end on its own; it is not required to run after `Playback::stop`.
    fn play(&self, on_end: EndCallback) -> Result<Box<dyn Playback>>;

    fn supports_vibration(&self) -> bool {
        false
    }

    /// Vibrates with alternating on/off durations in milliseconds.
    fn vibrate(&self, _pattern: &[u64]) -> Result<()> {
        bail!("Vibration is not supported on this host")
    }
}

enum Slot {
    // Reserved while the backend is starting playback.
    Starting(u64),
    Playing(u64, Box<dyn Playback>),
}

impl Slot {
    fn session(&self) -> u64 {
        match self {
            Slot::Starting(s) | Slot::Playing(s, _) => *s,
        }
    }
}

#[derive(Default)]
struct PlayerState {
    next_session: AtomicU64,
    slots: Mutex<HashMap<String, Slot>>,
}

impl PlayerState {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the entry for `task_id` only if it still belongs to `session`.
    fn finish(&self, task_id: &str, session: u64) {
        let mut slots = self.slots();
        if slots.get(task_id).is_some_and(|s| s.session() == session) {
            slots.remove(task_id);
            log::debug!("Alert for task {} ended", task_id);
        }
    }
}

/// Plays at most one alert per task id.
///
/// Playbacks are always stopped outside the bookkeeping lock, so a backend
/// may invoke its end callback from inside `play` or `stop`.
#[derive(Clone)]
pub struct AlertPlayer {
    backend: Arc<dyn AlertBackend>,
    state: Arc<PlayerState>,
}

impl AlertPlayer {
    pub fn new(backend: Arc<dyn AlertBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(PlayerState::default()),
        }
    }

    /// Starts the alert for `task_id`, superseding any alert already sounding
    /// for it. Start failures are logged and leave no entry behind.
    pub fn start(&self, task_id: &str) {
        let session = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .state
            .slots()
            .insert(task_id.to_string(), Slot::Starting(session));
        if let Some(Slot::Playing(_, mut old)) = previous {
            old.stop();
        }

        let weak = Arc::downgrade(&self.state);
        let key = task_id.to_string();
        let on_end: EndCallback = Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.finish(&key, session);
            }
        });

        match self.backend.play(on_end) {
            Ok(mut playback) => {
                let mut slots = self.state.slots();
                let still_ours = matches!(
                    slots.get(task_id),
                    Some(Slot::Starting(s)) if *s == session
                );
                if still_ours {
                    slots.insert(task_id.to_string(), Slot::Playing(session, playback));
                } else {
                    // Ended, stopped or superseded while starting.
                    drop(slots);
                    playback.stop();
                }
            }
            Err(e) => {
                log::error!("Error playing sound for task {}: {:#}", task_id, e);
                self.state.finish(task_id, session);
            }
        }
    }

    /// Stops the alert for `task_id`. Returns whether one was active.
    pub fn stop(&self, task_id: &str) -> bool {
        let removed = self.state.slots().remove(task_id);
        match removed {
            Some(Slot::Playing(_, mut playback)) => {
                playback.stop();
                true
            }
            Some(Slot::Starting(_)) => true,
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<Slot> = self.state.slots().drain().map(|(_, s)| s).collect();
        for slot in drained {
            if let Slot::Playing(_, mut playback) = slot {
                playback.stop();
            }
        }
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.state.slots().contains_key(task_id)
    }

    pub fn active_count(&self) -> usize {
        self.state.slots().len()
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.slots().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn supports_vibration(&self) -> bool {
        self.backend.supports_vibration()
    }

    /// Best effort; failures are logged.
    pub fn vibrate(&self, pattern: &[u64]) {
        if !self.backend.supports_vibration() {
            return;
        }
        if let Err(e) = self.backend.vibrate(pattern) {
            log::warn!("Vibration failed: {:#}", e);
        }
    }
}

// --- Terminal bell ---

/// Rings the terminal bell. The sound is instantaneous, so every playback
/// ends as soon as it starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct BellBackend;

struct Rung;

impl Playback for Rung {
    fn stop(&mut self) {}
}

impl AlertBackend for BellBackend {
    fn play(&self, on_end: EndCallback) -> Result<Box<dyn Playback>> {
        let mut err = std::io::stderr();
        err.write_all(b"\x07")?;
        err.flush()?;
        on_end();
        Ok(Box::new(Rung))
    }
}

// --- WAV file through the default output device ---

#[cfg(feature = "sound")]
pub use wav::WavBackend;

#[cfg(feature = "sound")]
mod wav {
    use super::{AlertBackend, EndCallback, Playback};
    use anyhow::{Context, Result, anyhow};
    use cpal::StreamConfig;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    /// Decoded reminder sound, played through cpal.
    pub struct WavBackend {
        samples: Arc<Vec<f32>>,
        channels: u16,
        sample_rate: u32,
    }

    impl WavBackend {
        pub fn open(path: &Path) -> Result<Self> {
            let mut reader = hound::WavReader::open(path)
                .with_context(|| format!("Failed to open sound file {:?}", path))?;
            let spec = reader.spec();
            let samples: Vec<f32> = match spec.sample_format {
                hound::SampleFormat::Float => reader
                    .samples::<f32>()
                    .collect::<Result<_, _>>()
                    .context("Failed to decode sound file")?,
                hound::SampleFormat::Int => {
                    let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| v as f32 / scale))
                        .collect::<Result<_, _>>()
                        .context("Failed to decode sound file")?
                }
            };
            Ok(Self {
                samples: Arc::new(samples),
                channels: spec.channels,
                sample_rate: spec.sample_rate,
            })
        }
    }

    struct WavPlayback {
        stopped: Arc<AtomicBool>,
        position: Arc<AtomicUsize>,
    }

    impl Playback for WavPlayback {
        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.position.store(0, Ordering::SeqCst);
        }
    }

    impl AlertBackend for WavBackend {
        fn play(&self, on_end: EndCallback) -> Result<Box<dyn Playback>> {
            let samples = Arc::clone(&self.samples);
            let stopped = Arc::new(AtomicBool::new(false));
            let position = Arc::new(AtomicUsize::new(0));
            let config = StreamConfig {
                channels: self.channels,
                sample_rate: self.sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

            let thread_stopped = Arc::clone(&stopped);
            let thread_position = Arc::clone(&position);
            // cpal streams are not Send; the stream lives and dies on this thread.
            std::thread::spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(anyhow!("No default output device")));
                    return;
                };

                let cb_samples = Arc::clone(&samples);
                let cb_position = Arc::clone(&thread_position);
                let cb_stopped = Arc::clone(&thread_stopped);
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            let pos = cb_position.load(Ordering::Relaxed);
                            if cb_stopped.load(Ordering::Relaxed) || pos >= cb_samples.len() {
                                *sample = 0.0;
                            } else {
                                *sample = cb_samples[pos];
                                cb_position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    move |err| log::error!("Audio output stream error: {}", err),
                    None,
                );
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("Failed to build output stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(anyhow!("Failed to start output stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                loop {
                    std::thread::sleep(Duration::from_millis(10));
                    if thread_stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    if thread_position.load(Ordering::Relaxed) >= samples.len() {
                        break;
                    }
                }
                drop(stream);
                on_end();
            });

            ready_rx
                .recv()
                .map_err(|_| anyhow!("Audio thread exited before starting"))??;

            Ok(Box::new(WavPlayback { stopped, position }))
        }
    }
}
