mod cycle;
mod detectors;
mod orchestrator;
mod scripted;
#[cfg(test)]
mod tests;

pub use cycle::{mean_displacement, pose_is_suspicious, CycleAnalyzer, CycleFindings};
pub use detectors::{
    BodyPose, BodyPoseEstimator, BoundingBox, DetectorSet, FaceGeometryTracker, FaceLandmarks,
    Keypoint, Landmark, PersonDetection, PersonPresenceDetector, PoseLandmark,
};
pub use orchestrator::{AnalysisLoop, AnalysisReport};
pub use scripted::{
    centred_face, looking_down_pose, turned_pose, upright_pose, Scene, ScriptedScene,
};
