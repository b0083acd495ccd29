pub mod common;
mod ort;
pub mod palm;

use std::thread;

use crossbeam_channel::{Receiver, Sender};

use self::common::HandInference;
use crate::gesture::{self, landmark};
use crate::pipeline::annotate;
use crate::types::{AppEvent, Frame, LatestFrame, TrackedFrame};

/// Estimator confidence below which a frame counts as NO_HAND.
const PRESENCE_THRESHOLD: f32 = 0.5;

pub(crate) trait TrackerEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<HandInference>;
}

/// Spawns the tracking worker: waits for models, then consumes capture
/// frames until the camera channel closes. Results fan out to the UI
/// channel (drop-on-busy) and the shared latest-frame slot the video
/// streamer samples.
pub fn start_tracker(
    frame_rx: Receiver<Frame>,
    tracked_tx: Sender<TrackedFrame>,
    latest: LatestFrame,
    events: Sender<AppEvent>,
) -> thread::JoinHandle<()> {
    ort::start_worker(frame_rx, tracked_tx, latest, events)
}

fn run_worker_loop<E: TrackerEngine>(
    mut engine: E,
    frame_rx: Receiver<Frame>,
    tracked_tx: Sender<TrackedFrame>,
    latest: LatestFrame,
) {
    while let Some(frame) = recv_latest_frame(&frame_rx) {
        match engine.infer(&frame) {
            Ok(output) => {
                let tracked = build_tracked_frame(frame, output);
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(tracked.clone());
                }
                let _ = tracked_tx.try_send(tracked);
            }
            Err(err) => {
                log::warn!("hand inference failed: {err:?}");
            }
        }
    }
}

/// Blocks for one frame, then drains anything newer so a slow
/// inference pass never works on stale captures.
fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

fn build_tracked_frame(mut frame: Frame, output: HandInference) -> TrackedFrame {
    let landmarks = (output.confidence >= PRESENCE_THRESHOLD
        && output.projected.len() == landmark::COUNT)
        .then_some(output.projected);
    let state = gesture::classify(landmarks.as_deref());

    if let Some(lms) = &landmarks {
        annotate::draw_landmarks(&mut frame.rgb, frame.width, frame.height, lms);
    }

    TrackedFrame {
        frame,
        state,
        confidence: output.confidence,
        landmarks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GestureState;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn test_frame(tag: u8) -> Frame {
        let mut rgb = vec![0u8; 64 * 64 * 3];
        rgb[0] = tag;
        Frame {
            rgb,
            width: 64,
            height: 64,
            timestamp: Instant::now(),
        }
    }

    fn synthetic_projection(raised: usize) -> Vec<(f32, f32)> {
        let tips = [
            landmark::INDEX_TIP,
            landmark::MIDDLE_TIP,
            landmark::RING_TIP,
            landmark::PINKY_TIP,
        ];
        let pips = [
            landmark::INDEX_PIP,
            landmark::MIDDLE_PIP,
            landmark::RING_PIP,
            landmark::PINKY_PIP,
        ];
        let mut lms = vec![(32.0, 40.0); landmark::COUNT];
        for i in 0..4 {
            lms[pips[i]] = (32.0, 30.0);
            lms[tips[i]] = if i < raised { (32.0, 20.0) } else { (32.0, 38.0) };
        }
        lms
    }

    struct FakeEngine {
        confidence: f32,
        raised: usize,
    }

    impl TrackerEngine for FakeEngine {
        fn infer(&mut self, _frame: &Frame) -> anyhow::Result<HandInference> {
            Ok(HandInference {
                landmarks: vec![[0.0; 3]; landmark::COUNT],
                projected: synthetic_projection(self.raised),
                confidence: self.confidence,
            })
        }
    }

    fn run_fake_worker(engine: FakeEngine, frame: Frame) -> (TrackedFrame, LatestFrame) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let (tracked_tx, tracked_rx) = crossbeam_channel::bounded(1);
        let latest: LatestFrame = Arc::new(Mutex::new(None));
        let latest_clone = latest.clone();

        let handle =
            thread::spawn(move || run_worker_loop(engine, frame_rx, tracked_tx, latest_clone));

        frame_tx.send(frame).unwrap();
        let tracked = tracked_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(frame_tx);
        handle.join().unwrap();
        (tracked, latest)
    }

    #[test]
    fn test_worker_classifies_open_hand_and_fills_latest_slot() {
        let engine = FakeEngine {
            confidence: 0.9,
            raised: 4,
        };
        let (tracked, latest) = run_fake_worker(engine, test_frame(7));

        assert_eq!(tracked.state, GestureState::Open);
        assert!(tracked.landmarks.is_some());
        assert!(latest.lock().unwrap().is_some());
    }

    #[test]
    fn test_low_confidence_is_no_hand_without_annotation() {
        let engine = FakeEngine {
            confidence: 0.1,
            raised: 4,
        };
        let (tracked, _latest) = run_fake_worker(engine, test_frame(7));

        assert_eq!(tracked.state, GestureState::NoHand);
        assert!(tracked.landmarks.is_none());
        // Untouched pixels apart from the tag byte.
        assert_eq!(tracked.frame.rgb[0], 7);
        assert!(tracked.frame.rgb[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fist_classifies_closed() {
        let engine = FakeEngine {
            confidence: 0.9,
            raised: 0,
        };
        let (tracked, _latest) = run_fake_worker(engine, test_frame(1));
        assert_eq!(tracked.state, GestureState::Closed);
    }

    #[test]
    fn test_recv_latest_frame_drains_backlog() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        tx.send(test_frame(1)).unwrap();
        tx.send(test_frame(2)).unwrap();
        tx.send(test_frame(3)).unwrap();

        let frame = recv_latest_frame(&rx).unwrap();
        assert_eq!(frame.rgb[0], 3);
        assert!(rx.is_empty());
    }
}
