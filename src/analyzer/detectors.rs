//! Capability interfaces for the vision models the analyzer depends on.
//!
//! Every detector consumes a single frame and reports coordinates normalized
//! to the frame, `0.0..=1.0` on both axes with the origin at the top left.
//! Implementations may keep per-stream state, hence `&mut self`.

use crate::error::DetectorError;
use crate::frame::FrameData;
use serde::{Deserialize, Serialize};

/// Normalized axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One person found in a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Normalized 2D point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// `|dx| + |dy|`
    pub fn l1_distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Facial landmark mesh for the single tracked face
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Same mesh moved by `(dx, dy)`
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| Landmark::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }
}

/// Body keypoints used by the pose checks.
///
/// Discriminants follow the common 33-point body landmark layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Single body keypoint
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// Keypoints of one body, indexed by [`PoseLandmark`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyPose {
    pub keypoints: Vec<Keypoint>,
}

impl BodyPose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// Build a pose holding only nose and ears, the points the checks read
    pub fn from_head(nose: Keypoint, left_ear: Keypoint, right_ear: Keypoint) -> Self {
        let mut keypoints = vec![Keypoint::default(); PoseLandmark::RightEar.index() + 1];
        keypoints[PoseLandmark::Nose.index()] = nose;
        keypoints[PoseLandmark::LeftEar.index()] = left_ear;
        keypoints[PoseLandmark::RightEar.index()] = right_ear;
        Self { keypoints }
    }

    pub fn get(&self, landmark: PoseLandmark) -> Option<&Keypoint> {
        self.keypoints.get(landmark.index())
    }
}

/// Counts the people visible in a frame
pub trait PersonPresenceDetector: Send {
    fn detect_people(&mut self, frame: &FrameData) -> Result<Vec<PersonDetection>, DetectorError>;
}

/// Tracks facial landmarks. `None` means no face was found.
pub trait FaceGeometryTracker: Send {
    fn track_face(&mut self, frame: &FrameData) -> Result<Option<FaceLandmarks>, DetectorError>;
}

/// Estimates body pose. `None` means no body was found.
pub trait BodyPoseEstimator: Send {
    fn estimate_pose(&mut self, frame: &FrameData) -> Result<Option<BodyPose>, DetectorError>;
}

/// The three detectors one analysis loop runs
pub struct DetectorSet {
    pub presence: Box<dyn PersonPresenceDetector>,
    pub geometry: Box<dyn FaceGeometryTracker>,
    pub pose: Box<dyn BodyPoseEstimator>,
}

impl DetectorSet {
    pub fn new(
        presence: Box<dyn PersonPresenceDetector>,
        geometry: Box<dyn FaceGeometryTracker>,
        pose: Box<dyn BodyPoseEstimator>,
    ) -> Self {
        Self {
            presence,
            geometry,
            pose,
        }
    }
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSet").finish_non_exhaustive()
    }
}
