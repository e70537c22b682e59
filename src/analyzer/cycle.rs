use super::detectors::{BodyPose, DetectorSet, FaceLandmarks, PoseLandmark};
use crate::config::AnalyzerConfig;
use crate::error::DetectorError;
use crate::frame::FrameData;
use crate::warning::ViolationKind;
use tracing::{debug, trace, warn};

/// Result of analysing one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleFindings {
    /// Violations in detection order
    pub violations: Vec<ViolationKind>,
    /// Detector failures absorbed during the cycle
    pub detector_errors: Vec<DetectorError>,
    /// People counted by the presence detector, if it succeeded
    pub people: Option<usize>,
}

/// Per-frame violation rules.
///
/// Holds the previous cycle's landmarks so head movement can be measured
/// between consecutive analysed frames.
#[derive(Debug)]
pub struct CycleAnalyzer {
    config: AnalyzerConfig,
    previous_landmarks: Option<FaceLandmarks>,
}

impl CycleAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            previous_landmarks: None,
        }
    }

    pub fn previous_landmarks(&self) -> Option<&FaceLandmarks> {
        self.previous_landmarks.as_ref()
    }

    /// Run every detector against `frame` and derive violations.
    ///
    /// A failing detector only removes its own contribution.
    pub fn analyze(&mut self, frame: &FrameData, detectors: &mut DetectorSet) -> CycleFindings {
        let mut findings = CycleFindings::default();

        match detectors.presence.detect_people(frame) {
            Ok(people) => {
                trace!("Frame {}: {} people", frame.id, people.len());
                findings.people = Some(people.len());
                match people.len() {
                    0 => findings.violations.push(ViolationKind::NoFace),
                    1 => self.check_movement(frame, detectors, &mut findings),
                    _ => findings.violations.push(ViolationKind::MultipleFaces),
                }
            }
            Err(e) => {
                warn!("Presence detection failed on frame {}: {}", frame.id, e);
                findings.detector_errors.push(e);
            }
        }

        match detectors.pose.estimate_pose(frame) {
            Ok(Some(pose)) => {
                if pose_is_suspicious(
                    &pose,
                    self.config.head_rotation_threshold,
                    self.config.gaze_down_threshold,
                ) {
                    findings.violations.push(ViolationKind::SuspiciousPose);
                }
            }
            Ok(None) => trace!("Frame {}: no pose", frame.id),
            Err(e) => {
                warn!("Pose estimation failed on frame {}: {}", frame.id, e);
                findings.detector_errors.push(e);
            }
        }

        findings
    }

    fn check_movement(
        &mut self,
        frame: &FrameData,
        detectors: &mut DetectorSet,
        findings: &mut CycleFindings,
    ) {
        let current = match detectors.geometry.track_face(frame) {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                trace!("Frame {}: no face geometry", frame.id);
                return;
            }
            Err(e) => {
                warn!("Face tracking failed on frame {}: {}", frame.id, e);
                findings.detector_errors.push(e);
                return;
            }
        };

        if let Some(previous) = &self.previous_landmarks {
            match mean_displacement(previous, &current) {
                Some(displacement) if displacement > self.config.movement_threshold => {
                    debug!(
                        "Frame {}: head moved {:.3} (threshold {:.3})",
                        frame.id, displacement, self.config.movement_threshold
                    );
                    findings.violations.push(ViolationKind::ExcessiveMovement);
                }
                Some(_) => {}
                None => debug!(
                    "Landmark count changed ({} -> {}), skipping movement check",
                    previous.len(),
                    current.len()
                ),
            }
        }

        self.previous_landmarks = Some(current);
    }
}

/// Mean per-landmark L1 displacement between two meshes.
///
/// `None` when the meshes are empty or differ in size.
pub fn mean_displacement(previous: &FaceLandmarks, current: &FaceLandmarks) -> Option<f32> {
    if previous.is_empty() || previous.len() != current.len() {
        return None;
    }

    let total: f32 = previous
        .points
        .iter()
        .zip(&current.points)
        .map(|(a, b)| a.l1_distance(b))
        .sum();

    Some(total / previous.len() as f32)
}

/// Head turned away (ears far apart horizontally) or gaze dropped (nose low)
pub fn pose_is_suspicious(pose: &BodyPose, head_rotation_threshold: f32, gaze_down_threshold: f32) -> bool {
    let (Some(nose), Some(left_ear), Some(right_ear)) = (
        pose.get(PoseLandmark::Nose),
        pose.get(PoseLandmark::LeftEar),
        pose.get(PoseLandmark::RightEar),
    ) else {
        return false;
    };

    let head_rotation = (left_ear.x - right_ear.x).abs();
    head_rotation > head_rotation_threshold || nose.y > gaze_down_threshold
}
