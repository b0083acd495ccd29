use crate::types::GestureState;

/// MediaPipe hand landmark indices, wrist first, then four joints per
/// finger from base to tip.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    pub const COUNT: usize = 21;

    pub const FINGERTIPS: [usize; 5] =
        [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
}

/// (tip, pip) pairs for the four non-thumb fingers. The thumb never
/// votes; its tip-above-knuckle axis is sideways for most hand poses.
const FINGER_JOINTS: [(usize, usize); 4] = [
    (landmark::INDEX_TIP, landmark::INDEX_PIP),
    (landmark::MIDDLE_TIP, landmark::MIDDLE_PIP),
    (landmark::RING_TIP, landmark::RING_PIP),
    (landmark::PINKY_TIP, landmark::PINKY_PIP),
];

const OPEN_FINGER_MIN: usize = 3;

/// Counts non-thumb fingers whose tip sits above (smaller y than) its
/// PIP knuckle. Coordinates are image pixels, y growing downward.
pub fn raised_fingers(landmarks: &[(f32, f32)]) -> usize {
    FINGER_JOINTS
        .iter()
        .filter(|&&(tip, pip)| landmarks[tip].1 < landmarks[pip].1)
        .count()
}

/// The tri-state decision: at least 3 of 4 fingers raised is OPEN,
/// anything else with a hand present is CLOSED, and no (or an
/// incomplete) landmark set is NO_HAND.
pub fn classify(landmarks: Option<&[(f32, f32)]>) -> GestureState {
    match landmarks {
        Some(lms) if lms.len() >= landmark::COUNT => {
            if raised_fingers(lms) >= OPEN_FINGER_MIN {
                GestureState::Open
            } else {
                GestureState::Closed
            }
        }
        _ => GestureState::NoHand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A flat synthetic hand at y=100 with `raised` of the four
    /// non-thumb fingertips lifted above their PIP joints.
    fn synthetic_hand(raised: usize) -> Vec<(f32, f32)> {
        let mut lms = vec![(100.0, 100.0); landmark::COUNT];
        for (i, &(tip, pip)) in FINGER_JOINTS.iter().enumerate() {
            lms[pip] = (100.0, 80.0);
            lms[tip] = if i < raised { (100.0, 60.0) } else { (100.0, 95.0) };
        }
        lms
    }

    #[test]
    fn test_all_fingers_raised_is_open() {
        assert_eq!(classify(Some(&synthetic_hand(4))), GestureState::Open);
    }

    #[test]
    fn test_exactly_three_raised_is_open() {
        assert_eq!(classify(Some(&synthetic_hand(3))), GestureState::Open);
    }

    #[test]
    fn test_two_raised_is_closed() {
        assert_eq!(classify(Some(&synthetic_hand(2))), GestureState::Closed);
    }

    #[test]
    fn test_fist_is_closed() {
        assert_eq!(classify(Some(&synthetic_hand(0))), GestureState::Closed);
    }

    #[test]
    fn test_no_landmarks_is_no_hand() {
        assert_eq!(classify(None), GestureState::NoHand);
    }

    #[test]
    fn test_incomplete_landmark_set_is_no_hand() {
        let lms = vec![(0.0, 0.0); 5];
        assert_eq!(classify(Some(&lms)), GestureState::NoHand);
    }

    #[test]
    fn test_tip_level_with_pip_does_not_count() {
        let mut lms = synthetic_hand(3);
        // Lift the fourth tip to exactly its PIP height; the strict
        // comparison must leave the count at three.
        lms[landmark::PINKY_TIP] = lms[landmark::PINKY_PIP];
        assert_eq!(raised_fingers(&lms), 3);
        assert_eq!(classify(Some(&lms)), GestureState::Open);
    }

    #[test]
    fn test_thumb_does_not_vote() {
        let mut lms = synthetic_hand(2);
        lms[landmark::THUMB_TIP] = (100.0, 0.0);
        assert_eq!(classify(Some(&lms)), GestureState::Closed);
    }
}
