mod cadence;
mod core;

pub use cadence::SnapshotCadence;
pub use core::{CaptureExit, CaptureLoop, CaptureReport};
