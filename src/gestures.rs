use serde::Deserialize;
use std::{fmt, str::FromStr};

use crate::error::ConfigError;
use crate::landmarks::{
    HandObservation, INDEX_PIP, INDEX_TIP, MIDDLE_PIP, MIDDLE_TIP, PINKY_PIP, PINKY_TIP,
    RING_PIP, RING_TIP, THUMB_IP, THUMB_MCP, THUMB_TIP,
};

/// (tip, pip) for index, middle, ring and pinky.
const FINGERS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

/// Open palm still counts with one finger occluded.
const OPEN_PALM_MIN_EXTENDED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum GestureKind {
    #[default]
    OpenPalm,
    PeaceSign,
}

impl GestureKind {
    pub const ALL: [GestureKind; 2] = [GestureKind::OpenPalm, GestureKind::PeaceSign];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenPalm => "open-palm",
            Self::PeaceSign => "peace-sign",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenPalm => "Open Palm",
            Self::PeaceSign => "Peace Sign",
        }
    }

    /// Is this gesture present on `hand`?
    pub fn classify(&self, hand: &HandObservation) -> bool {
        match self {
            Self::OpenPalm => is_open_palm(hand),
            Self::PeaceSign => is_peace_sign(hand),
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for GestureKind {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for GestureKind {
    type Err = ConfigError;

    /// Accepts "open-palm", "open_palm" and "Open Palm" spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '_' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == norm)
            .ok_or_else(|| ConfigError::UnknownGesture(s.to_string()))
    }
}

pub fn classify(kind: GestureKind, hand: &HandObservation) -> bool {
    kind.classify(hand)
}

fn is_open_palm(hand: &HandObservation) -> bool {
    let extended = FINGERS
        .iter()
        .filter(|(tip, pip)| hand.finger_extended(*tip, *pip))
        .count();
    extended >= OPEN_PALM_MIN_EXTENDED
}

fn is_peace_sign(hand: &HandObservation) -> bool {
    let index_open = hand.finger_extended(INDEX_TIP, INDEX_PIP);
    let middle_open = hand.finger_extended(MIDDLE_TIP, MIDDLE_PIP);
    let ring_closed = hand.finger_curled(RING_TIP, RING_PIP);
    let pinky_closed = hand.finger_curled(PINKY_TIP, PINKY_PIP);
    index_open && middle_open && ring_closed && pinky_closed && thumb_closed(hand)
}

// The lateral direction of the thumb (tip vs MCP) picks which way "past the
// IP joint" means curled, so either palm orientation works.
fn thumb_closed(hand: &HandObservation) -> bool {
    let tip = hand.point(THUMB_TIP);
    let ip = hand.point(THUMB_IP);
    let mcp = hand.point(THUMB_MCP);
    if tip.x > mcp.x {
        tip.x > ip.x
    } else {
        tip.x < ip.x
    }
}

/// The gesture currently armed for capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureSelector {
    kind: GestureKind,
}

impl GestureSelector {
    pub fn new(kind: GestureKind) -> Self {
        Self { kind }
    }

    pub fn get(&self) -> GestureKind {
        self.kind
    }

    pub fn set(&mut self, kind: GestureKind) {
        self.kind = kind;
    }
}
