//! External sinks (audio, haptics, telemetry logger)
//!
//! Fire-and-forget: тик только кладёт `SinkMessage` в unbounded канал,
//! вызовы sink'ов происходят на отдельном worker потоке.
//! Медленный sink никогда не тормозит симуляцию.

use std::thread::JoinHandle;

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};

use crate::ai::GhostId;
use crate::logger;
use crate::telemetry::TelemetrySample;

pub trait AudioSink: Send + 'static {
    fn on_ghost_detected(&mut self, _ghost: GhostId, _position: Vec3) {}
    fn on_heartbeat_toggle(&mut self, _chasing: bool) {}
    fn on_difficulty_changed(&mut self, _normalized: f32) {}
    fn on_item_collected(&mut self) {}
}

pub trait HapticsSink: Send + 'static {
    fn on_proximity(&mut self, _proximity: f32) {}
    fn on_grip_intensity(&mut self, _intensity: f32) {}
    fn on_difficulty_changed(&mut self, _normalized: f32) {}
}

pub trait TelemetryLogger: Send + 'static {
    fn record(&mut self, sample: TelemetrySample);
}

/// Все зарегистрированные sinks (статичны на сессию)
#[derive(Default)]
pub struct FeedbackSinks {
    pub audio: Vec<Box<dyn AudioSink>>,
    pub haptics: Vec<Box<dyn HapticsSink>>,
    pub loggers: Vec<Box<dyn TelemetryLogger>>,
}

impl FeedbackSinks {
    pub fn with_audio(mut self, sink: impl AudioSink) -> Self {
        self.audio.push(Box::new(sink));
        self
    }

    pub fn with_haptics(mut self, sink: impl HapticsSink) -> Self {
        self.haptics.push(Box::new(sink));
        self
    }

    pub fn with_logger(mut self, logger: impl TelemetryLogger) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    fn deliver(&mut self, message: SinkMessage) {
        match message {
            SinkMessage::GhostDetected { ghost, position } => {
                for sink in &mut self.audio {
                    sink.on_ghost_detected(ghost, position);
                }
            }
            SinkMessage::Heartbeat(chasing) => {
                for sink in &mut self.audio {
                    sink.on_heartbeat_toggle(chasing);
                }
            }
            SinkMessage::ItemCollected => {
                for sink in &mut self.audio {
                    sink.on_item_collected();
                }
            }
            SinkMessage::Difficulty(normalized) => {
                for sink in &mut self.audio {
                    sink.on_difficulty_changed(normalized);
                }
                for sink in &mut self.haptics {
                    sink.on_difficulty_changed(normalized);
                }
            }
            SinkMessage::Proximity(proximity) => {
                for sink in &mut self.haptics {
                    sink.on_proximity(proximity);
                }
            }
            SinkMessage::GripIntensity(intensity) => {
                for sink in &mut self.haptics {
                    sink.on_grip_intensity(intensity);
                }
            }
            SinkMessage::Telemetry(sample) => {
                for logger in &mut self.loggers {
                    logger.record(sample.clone());
                }
            }
        }
    }
}

/// Сообщение для sinks
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    GhostDetected { ghost: GhostId, position: Vec3 },
    Heartbeat(bool),
    ItemCollected,
    Difficulty(f32),
    Proximity(f32),
    GripIntensity(f32),
    Telemetry(TelemetrySample),
}

/// Resource: неблокирующая отправка в sinks
///
/// Drop закрывает канал и дожидается пока worker доставит остаток.
#[derive(Resource)]
pub struct SinkDispatcher {
    sender: Option<Sender<SinkMessage>>,
    worker: Option<JoinHandle<()>>,
}

impl SinkDispatcher {
    pub fn spawn(sinks: FeedbackSinks) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();

        let worker = std::thread::Builder::new()
            .name("haunt-sinks".into())
            .spawn(move || run_worker(sinks, receiver));

        match worker {
            Ok(handle) => Self {
                sender: Some(sender),
                worker: Some(handle),
            },
            Err(e) => {
                logger::log_error(&format!("SinkDispatcher: failed to spawn worker: {}", e));
                Self {
                    sender: None,
                    worker: None,
                }
            }
        }
    }

    /// Dispatcher без sinks (сообщения выбрасываются)
    pub fn disabled() -> Self {
        Self {
            sender: None,
            worker: None,
        }
    }

    pub fn send(&self, message: SinkMessage) {
        if let Some(sender) = &self.sender {
            // Unbounded: send не блокирует; ошибка только если worker уже умер
            let _ = sender.send(message);
        }
    }

    /// Закрыть канал и дождаться доставки всех сообщений
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                logger::log_error("SinkDispatcher: worker panicked");
            }
        }
    }
}

impl Default for SinkDispatcher {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Drop for SinkDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(mut sinks: FeedbackSinks, receiver: Receiver<SinkMessage>) {
    // recv() вернёт Err когда все Sender'ы дропнуты и очередь пуста
    while let Ok(message) = receiver.recv() {
        sinks.deliver(message);
    }
}
