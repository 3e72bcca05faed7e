use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use std::{
    mem,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use super::dispatch::{dispatch_event, status_text};
use crate::actions::{CaptureRecord, CaptureSink};
use crate::config::Profile;
use crate::input::{self, FrameReader};
use crate::trigger::{TriggerEvent, TriggerStateMachine};

pub const IDLE_STATUS: &str = "Show a gesture to take a screenshot";

/// The state machine plus its collaborators. One pipeline thread ticks it;
/// IPC clients lock it briefly to read status or change settings.
#[derive(Debug)]
pub struct Engine {
    pub machine: TriggerStateMachine,
    pub sink: CaptureSink,
    min_confidence: f32,
    status: String,
    last_event: Option<TriggerEvent>,
    last_t: Option<f64>,
    last_capture: Option<CaptureRecord>,
    frames: u64,
    rejected: u64,
}

impl Engine {
    pub fn from_profile(p: &Profile) -> Result<Self> {
        Ok(Self {
            machine: TriggerStateMachine::new(p.trigger_config())?,
            sink: CaptureSink::from_profile(p),
            min_confidence: p.thresholds.min_detection_confidence,
            status: IDLE_STATUS.to_string(),
            last_event: None,
            last_t: None,
            last_capture: None,
            frames: 0,
            rejected: 0,
        })
    }

    /// Swaps in a newly loaded profile. The running hold and cooldown survive.
    pub fn apply_profile(&mut self, p: &Profile) -> Result<()> {
        self.machine.apply(p.trigger_config())?;
        self.sink = CaptureSink::from_profile(p);
        self.min_confidence = p.thresholds.min_detection_confidence;
        Ok(())
    }

    /// Feeds one detector line. `clock` stamps frames that carry no `t`.
    /// Undecodable or malformed frames are logged and do not tick.
    pub fn process_line(&mut self, line: &str, clock: f64) -> Option<(f64, TriggerEvent)> {
        self.frames += 1;
        let frame = match input::decode_frame(line, self.min_confidence) {
            Ok(f) => f,
            Err(e) => {
                self.rejected += 1;
                warn!("skipping frame {}: {e:#}", self.frames);
                return None;
            }
        };
        let now = frame.t.unwrap_or(clock);
        if self.last_t.is_some_and(|last| now < last) {
            warn!("frame {} goes back in time ({now:.3}s)", self.frames);
        }

        let ev = match self.machine.tick_landmarks(now, frame.hand.as_deref()) {
            Ok(ev) => ev,
            Err(e) => {
                self.rejected += 1;
                warn!("rejected frame {}: {e}", self.frames);
                return None;
            }
        };
        self.last_t = Some(now);
        self.on_event(ev);
        Some((now, ev))
    }

    fn on_event(&mut self, ev: TriggerEvent) {
        let changed = self
            .last_event
            .is_none_or(|prev| mem::discriminant(&prev) != mem::discriminant(&ev));
        self.last_event = Some(ev);

        let capture = match dispatch_event(&ev, &mut self.sink) {
            Ok(rec) => rec,
            Err(e) => {
                error!("capture failed: {e:#}");
                None
            }
        };
        self.status = status_text(&ev, self.machine.gesture(), capture.as_ref());

        match ev {
            TriggerEvent::Fire => {
                info!("{}", self.status);
                if let Some(rec) = capture {
                    info!("{}", rec.feedback);
                    if rec.grabbed {
                        self.last_capture = Some(rec);
                    }
                }
            }
            TriggerEvent::Holding(_) if changed => {
                debug!("holding {}", self.machine.gesture())
            }
            _ if changed => debug!("{}", self.status),
            _ => {}
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn status_json(&self) -> serde_json::Value {
        let cfg = self.machine.config();
        let now = self.last_t.unwrap_or(0.0);
        serde_json::json!({
            "status": self.status,
            "phase": self.machine.phase().as_str(),
            "gesture": cfg.gesture.as_str(),
            "hold_secs": cfg.hold_secs,
            "cooldown_secs": cfg.cooldown_secs,
            "min_detection_confidence": self.min_confidence,
            "hold_elapsed": self.machine.hold_elapsed(now),
            "last_event": self.last_event.map(|e| e.as_str()),
            "captures": self.machine.fire_count(),
            "last_fire_at": self.machine.last_fire_at(),
            "last_capture": self.last_capture.as_ref().map(|r| &r.path),
            "frames": self.frames,
            "rejected_frames": self.rejected,
        })
    }
}

/// Drives `engine` from `reader` until the stream ends or `stop` is set.
pub fn run_pipeline(
    engine: Arc<Mutex<Engine>>,
    reader: FrameReader,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let clock = Instant::now();
    for line in reader {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("detector stream error: {e}");
                break;
            }
        };
        let mut eng = engine
            .lock()
            .map_err(|_| anyhow!("engine lock poisoned"))?;
        eng.process_line(&line, clock.elapsed().as_secs_f64());
    }
    warn!("detector stream ended; pipeline stopped");
    Ok(())
}
