//! Turns a stream of per-frame gesture detections into debounced capture
//! triggers.
//!
//! Each tick feeds one observation (or none) with a monotonic timestamp in
//! seconds. A gesture must be held continuously for the hold threshold
//! before it fires, and a fire is followed by a cooldown during which
//! qualifying holds only report [`TriggerEvent::Cooling`].

use crate::error::{ConfigError, ObservationError};
use crate::gestures::{GestureKind, GestureSelector, classify};
use crate::landmarks::{HandObservation, Landmark};

pub const DEFAULT_HOLD_SECS: f64 = 1.0;
pub const DEFAULT_COOLDOWN_SECS: f64 = 3.0;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerEvent {
    /// No hand in frame.
    NoHand,
    /// A hand is visible but not making the active gesture.
    GestureLost,
    /// Gesture held for this many seconds, not long enough yet.
    Holding(f64),
    /// Held long enough but still inside the cooldown window.
    Cooling,
    /// Take the capture.
    Fire,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHand => "no-hand",
            Self::GestureLost => "gesture-lost",
            Self::Holding(_) => "holding",
            Self::Cooling => "cooling",
            Self::Fire => "fire",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Holding,
    /// Hold satisfied, waiting on the cooldown.
    Ready,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Holding => "holding",
            Self::Ready => "ready",
        }
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositiveThreshold { name, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub hold_secs: f64,
    pub cooldown_secs: f64,
    pub gesture: GestureKind,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            hold_secs: DEFAULT_HOLD_SECS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            gesture: GestureKind::default(),
        }
    }
}

impl TriggerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threshold("hold_secs", self.hold_secs)?;
        check_threshold("cooldown_secs", self.cooldown_secs)?;
        Ok(())
    }
}

/// Continuous-hold stopwatch. `started_at` is only set while held.
#[derive(Debug, Clone, Default)]
struct HoldTimer {
    started_at: Option<f64>,
}

impl HoldTimer {
    fn update(&mut self, detected: bool, now: f64) -> f64 {
        if !detected {
            self.reset();
            return 0.0;
        }
        let started = *self.started_at.get_or_insert(now);
        // a clock that steps backwards must not produce a negative hold
        (now - started).max(0.0)
    }

    fn reset(&mut self) {
        self.started_at = None;
    }

    fn elapsed(&self, now: f64) -> f64 {
        self.started_at.map_or(0.0, |s| (now - s).max(0.0))
    }
}

/// Minimum spacing between fires. The window is closed: a tick exactly
/// `threshold` seconds after the last fire is still blocked.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    threshold: f64,
    last_fire_at: Option<f64>,
}

impl CooldownGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_fire_at: None,
        }
    }

    pub fn allow(&self, now: f64) -> bool {
        match self.last_fire_at {
            None => true,
            Some(last) => now - last > self.threshold,
        }
    }

    pub fn record(&mut self, now: f64) {
        self.last_fire_at = Some(now);
    }

    pub fn last_fire_at(&self) -> Option<f64> {
        self.last_fire_at
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }
}

/// Single-writer state machine; drive it from one observation stream.
#[derive(Debug, Clone)]
pub struct TriggerStateMachine {
    hold_threshold: f64,
    hold: HoldTimer,
    cooldown: CooldownGate,
    selector: GestureSelector,
    phase: Phase,
    fires: u64,
}

impl Default for TriggerStateMachine {
    fn default() -> Self {
        Self {
            hold_threshold: DEFAULT_HOLD_SECS,
            hold: HoldTimer::default(),
            cooldown: CooldownGate::new(DEFAULT_COOLDOWN_SECS),
            selector: GestureSelector::default(),
            phase: Phase::Idle,
            fires: 0,
        }
    }
}

impl TriggerStateMachine {
    pub fn new(cfg: TriggerConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            hold_threshold: cfg.hold_secs,
            cooldown: CooldownGate::new(cfg.cooldown_secs),
            selector: GestureSelector::new(cfg.gesture),
            ..Self::default()
        })
    }

    pub fn tick(&mut self, now: f64, hand: Option<&HandObservation>) -> TriggerEvent {
        let Some(hand) = hand else {
            self.hold.reset();
            self.phase = Phase::Idle;
            return TriggerEvent::NoHand;
        };

        let detected = classify(self.selector.get(), hand);
        let elapsed = self.hold.update(detected, now);
        if !detected {
            self.phase = Phase::Idle;
            return TriggerEvent::GestureLost;
        }

        if elapsed < self.hold_threshold {
            self.phase = Phase::Holding;
            return TriggerEvent::Holding(elapsed);
        }

        if !self.cooldown.allow(now) {
            // keep the timer running so the hold fires once the window opens
            self.phase = Phase::Ready;
            return TriggerEvent::Cooling;
        }

        self.cooldown.record(now);
        self.hold.reset();
        self.phase = Phase::Idle;
        self.fires += 1;
        TriggerEvent::Fire
    }

    /// Validating entry point for raw landmark sets. A malformed hand rejects
    /// the whole tick and leaves the machine untouched.
    pub fn tick_landmarks(
        &mut self,
        now: f64,
        landmarks: Option<&[Landmark]>,
    ) -> Result<TriggerEvent, ObservationError> {
        let hand = landmarks.map(HandObservation::new).transpose()?;
        Ok(self.tick(now, hand.as_ref()))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current continuous-hold duration, 0 when nothing is held.
    pub fn hold_elapsed(&self, now: f64) -> f64 {
        self.hold.elapsed(now)
    }

    pub fn last_fire_at(&self) -> Option<f64> {
        self.cooldown.last_fire_at()
    }

    pub fn fire_count(&self) -> u64 {
        self.fires
    }

    pub fn gesture(&self) -> GestureKind {
        self.selector.get()
    }

    /// Takes effect on the next tick; an in-progress hold keeps its start time.
    pub fn set_gesture(&mut self, kind: GestureKind) {
        self.selector.set(kind);
    }

    pub fn config(&self) -> TriggerConfig {
        TriggerConfig {
            hold_secs: self.hold_threshold,
            cooldown_secs: self.cooldown.threshold(),
            gesture: self.selector.get(),
        }
    }

    pub fn set_hold_threshold(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.hold_threshold = check_threshold("hold_secs", secs)?;
        Ok(())
    }

    pub fn set_cooldown_threshold(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.cooldown.set_threshold(check_threshold("cooldown_secs", secs)?);
        Ok(())
    }

    /// Applies all of `cfg` or nothing.
    pub fn apply(&mut self, cfg: TriggerConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        self.hold_threshold = cfg.hold_secs;
        self.cooldown.set_threshold(cfg.cooldown_secs);
        self.selector.set(cfg.gesture);
        Ok(())
    }
}
