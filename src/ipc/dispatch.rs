use anyhow::Result;

use crate::actions::{CaptureRecord, CaptureSink};
use crate::gestures::GestureKind;
use crate::trigger::TriggerEvent;

/// Runs the capture for a fire; every other event is a no-op.
pub fn dispatch_event(
    ev: &TriggerEvent,
    sink: &mut CaptureSink,
) -> Result<Option<CaptureRecord>> {
    match ev {
        TriggerEvent::Fire => sink.capture().map(Some),
        _ => Ok(None),
    }
}

/// User-facing status line for an event.
pub fn status_text(
    ev: &TriggerEvent,
    gesture: GestureKind,
    capture: Option<&CaptureRecord>,
) -> String {
    match ev {
        TriggerEvent::NoHand => "No hand detected, please show your hand.".to_string(),
        TriggerEvent::GestureLost => {
            format!("Show a {} to take a screenshot", gesture.label())
        }
        TriggerEvent::Holding(elapsed) => format!("Hold it... {elapsed:.1}s"),
        TriggerEvent::Cooling => "Hold on, cooling down before the next screenshot".to_string(),
        TriggerEvent::Fire => match capture {
            Some(rec) => {
                let name = rec
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if rec.grabbed {
                    format!("Screenshot taken: {name}")
                } else {
                    format!("Capture triggered: {name}")
                }
            }
            None => "Screenshot failed".to_string(),
        },
    }
}
