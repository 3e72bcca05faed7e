//! Hand landmarks in the 21-point hand-pose convention.

use crate::error::ObservationError;

pub const LANDMARK_COUNT: usize = 21;

pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// Normalized point, (0,0) is the top-left of the frame and y grows downwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One detected hand. Only constructible from exactly 21 finite points.
#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandObservation {
    pub fn new(points: &[Landmark]) -> Result<Self, ObservationError> {
        let points: [Landmark; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| ObservationError::LandmarkCount(points.len()))?;
        if let Some((index, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(ObservationError::NonFinite {
                index,
                x: p.x,
                y: p.y,
            });
        }
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Landmark {
        self.points[index]
    }

    /// Tip above pip in image coordinates.
    pub fn finger_extended(&self, tip: usize, pip: usize) -> bool {
        self.points[tip].y < self.points[pip].y
    }

    /// Tip below pip in image coordinates.
    pub fn finger_curled(&self, tip: usize, pip: usize) -> bool {
        self.points[tip].y > self.points[pip].y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_landmark_count() {
        let pts = vec![Landmark::default(); 20];
        assert_eq!(
            HandObservation::new(&pts),
            Err(ObservationError::LandmarkCount(20))
        );
        let pts = vec![Landmark::default(); 22];
        assert_eq!(
            HandObservation::new(&pts),
            Err(ObservationError::LandmarkCount(22))
        );
    }

    #[test]
    fn rejects_nan_coordinates() {
        let mut pts = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        pts[7].y = f32::NAN;
        match HandObservation::new(&pts) {
            Err(ObservationError::NonFinite { index, .. }) => assert_eq!(index, 7),
            other => panic!("expected NonFinite, got {other:?}"),
        }
    }

    #[test]
    fn extension_uses_image_coordinates() {
        let mut pts = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        pts[INDEX_TIP].y = 0.2;
        pts[INDEX_PIP].y = 0.4;
        let hand = HandObservation::new(&pts).unwrap();
        assert!(hand.finger_extended(INDEX_TIP, INDEX_PIP));
        assert!(!hand.finger_curled(INDEX_TIP, INDEX_PIP));
        // equal height is neither extended nor curled
        assert!(!hand.finger_extended(MIDDLE_TIP, MIDDLE_PIP));
        assert!(!hand.finger_curled(MIDDLE_TIP, MIDDLE_PIP));
    }
}
