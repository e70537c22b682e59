use super::detectors::{
    BodyPose, BoundingBox, BodyPoseEstimator, DetectorSet, FaceGeometryTracker, FaceLandmarks,
    Keypoint, Landmark, PersonDetection, PersonPresenceDetector,
};
use crate::error::DetectorError;
use crate::frame::FrameData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the scripted detectors currently "see"
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub people: usize,
    pub landmarks: Option<FaceLandmarks>,
    pub pose: Option<BodyPose>,
    pub fail_presence: bool,
    pub fail_geometry: bool,
    pub fail_pose: bool,
}

impl Scene {
    /// One candidate, centred, facing the camera
    pub fn calm() -> Self {
        Self {
            people: 1,
            landmarks: Some(centred_face()),
            pose: Some(upright_pose()),
            fail_presence: false,
            fail_geometry: false,
            fail_pose: false,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::calm()
    }
}

/// Detector backend answering from a shared, mutable [`Scene`].
///
/// Clones share the scene, so a test (or the demo binary) can keep one
/// handle and change what the running analysis loop observes.
#[derive(Debug, Clone)]
pub struct ScriptedScene {
    scene: Arc<Mutex<Scene>>,
    presence_calls: Arc<AtomicU64>,
}

impl ScriptedScene {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Arc::new(Mutex::new(scene)),
            presence_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn calm() -> Self {
        Self::new(Scene::calm())
    }

    /// Detector set backed by this scene
    pub fn detectors(&self) -> DetectorSet {
        DetectorSet::new(
            Box::new(self.clone()),
            Box::new(self.clone()),
            Box::new(self.clone()),
        )
    }

    pub fn scene(&self) -> Scene {
        self.scene.lock().clone()
    }

    pub fn update<F: FnOnce(&mut Scene)>(&self, f: F) {
        f(&mut *self.scene.lock());
    }

    pub fn set_people(&self, people: usize) {
        self.scene.lock().people = people;
    }

    pub fn set_landmarks(&self, landmarks: Option<FaceLandmarks>) {
        self.scene.lock().landmarks = landmarks;
    }

    pub fn set_pose(&self, pose: Option<BodyPose>) {
        self.scene.lock().pose = pose;
    }

    /// Shift the tracked face by `(dx, dy)`
    pub fn move_face(&self, dx: f32, dy: f32) {
        let mut scene = self.scene.lock();
        if let Some(landmarks) = scene.landmarks.as_mut() {
            *landmarks = landmarks.translated(dx, dy);
        }
    }

    pub fn set_presence_failure(&self, fail: bool) {
        self.scene.lock().fail_presence = fail;
    }

    pub fn set_geometry_failure(&self, fail: bool) {
        self.scene.lock().fail_geometry = fail;
    }

    pub fn set_pose_failure(&self, fail: bool) {
        self.scene.lock().fail_pose = fail;
    }

    /// Number of frames the presence detector has been run on
    pub fn presence_calls(&self) -> u64 {
        self.presence_calls.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedScene {
    fn default() -> Self {
        Self::calm()
    }
}

impl PersonPresenceDetector for ScriptedScene {
    fn detect_people(&mut self, _frame: &FrameData) -> Result<Vec<PersonDetection>, DetectorError> {
        self.presence_calls.fetch_add(1, Ordering::Relaxed);
        let scene = self.scene.lock();
        if scene.fail_presence {
            return Err(scripted_failure("presence"));
        }

        let width = 1.0 / scene.people.max(1) as f32;
        Ok((0..scene.people)
            .map(|i| PersonDetection {
                bbox: BoundingBox {
                    x: i as f32 * width,
                    y: 0.1,
                    width,
                    height: 0.8,
                },
                confidence: 0.9,
            })
            .collect())
    }
}

impl FaceGeometryTracker for ScriptedScene {
    fn track_face(&mut self, _frame: &FrameData) -> Result<Option<FaceLandmarks>, DetectorError> {
        let scene = self.scene.lock();
        if scene.fail_geometry {
            return Err(scripted_failure("geometry"));
        }
        Ok(scene.landmarks.clone())
    }
}

impl BodyPoseEstimator for ScriptedScene {
    fn estimate_pose(&mut self, _frame: &FrameData) -> Result<Option<BodyPose>, DetectorError> {
        let scene = self.scene.lock();
        if scene.fail_pose {
            return Err(scripted_failure("pose"));
        }
        Ok(scene.pose.clone())
    }
}

fn scripted_failure(detector: &'static str) -> DetectorError {
    DetectorError::Inference {
        detector,
        details: "scripted failure".to_string(),
    }
}

/// Small face mesh around the centre of the frame
pub fn centred_face() -> FaceLandmarks {
    FaceLandmarks::new(vec![
        Landmark::new(0.42, 0.35),
        Landmark::new(0.58, 0.35),
        Landmark::new(0.50, 0.45),
        Landmark::new(0.45, 0.55),
        Landmark::new(0.55, 0.55),
        Landmark::new(0.50, 0.62),
    ])
}

/// Head upright, facing the camera
pub fn upright_pose() -> BodyPose {
    BodyPose::from_head(
        Keypoint::new(0.50, 0.40, 0.95),
        Keypoint::new(0.58, 0.38, 0.9),
        Keypoint::new(0.42, 0.38, 0.9),
    )
}

/// Head tilted down towards the desk
pub fn looking_down_pose() -> BodyPose {
    BodyPose::from_head(
        Keypoint::new(0.50, 0.80, 0.95),
        Keypoint::new(0.58, 0.60, 0.9),
        Keypoint::new(0.42, 0.60, 0.9),
    )
}

/// Head turned to the side
pub fn turned_pose() -> BodyPose {
    BodyPose::from_head(
        Keypoint::new(0.30, 0.40, 0.95),
        Keypoint::new(0.75, 0.38, 0.9),
        Keypoint::new(0.35, 0.38, 0.4),
    )
}
