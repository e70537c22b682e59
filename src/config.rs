use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProctorConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub analyzer: AnalyzerConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Number of cameras watched per session
    #[serde(default = "default_camera_count")]
    pub count: u32,

    /// Explicit device indices; empty means `0..count`
    #[serde(default)]
    pub indices: Vec<u32>,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the driver
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Upper bound on a single frame acquisition
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Pacing of the capture loop
    #[serde(default = "default_capture_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Seconds of capture time between persisted snapshots
    #[serde(default = "default_snapshot_interval_seconds")]
    pub snapshot_interval_seconds: u64,

    /// Directory for snapshot images
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Timezone used for the timestamp part of snapshot names
    #[serde(default = "default_snapshot_timezone")]
    pub snapshot_timezone: String,

    /// JPEG quality for frames that need encoding (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzerConfig {
    /// Sleep between analysis cycles
    #[serde(default = "default_analyzer_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Mean per-landmark L1 displacement above which movement is excessive
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,

    /// Ear-to-ear horizontal distance above which the head counts as turned
    #[serde(default = "default_head_rotation_threshold")]
    pub head_rotation_threshold: f32,

    /// Nose vertical position above which the gaze counts as downward
    #[serde(default = "default_gaze_down_threshold")]
    pub gaze_down_threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// How long stop() waits for each loop before abandoning it
    #[serde(default = "default_stop_timeout_seconds")]
    pub stop_timeout_seconds: u64,
}

impl CameraConfig {
    /// Device indices to open, in primary-first order
    pub fn device_indices(&self) -> Vec<u32> {
        if self.indices.is_empty() {
            (0..self.count).collect()
        } else {
            self.indices.clone()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl CaptureConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_seconds)
    }
}

impl AnalyzerConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

impl SystemConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}

impl ProctorConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("proctorcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.count", default_camera_count())?
            .set_default("camera.indices", Vec::<u32>::new())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.read_timeout_ms", default_read_timeout_ms())?
            .set_default(
                "capture.cycle_interval_ms",
                default_capture_cycle_interval_ms(),
            )?
            .set_default(
                "capture.snapshot_interval_seconds",
                default_snapshot_interval_seconds(),
            )?
            .set_default("capture.snapshot_path", default_snapshot_path())?
            .set_default("capture.snapshot_timezone", default_snapshot_timezone())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as u32)?
            .set_default(
                "analyzer.cycle_interval_ms",
                default_analyzer_cycle_interval_ms(),
            )?
            .set_default(
                "analyzer.movement_threshold",
                default_movement_threshold() as f64,
            )?
            .set_default(
                "analyzer.head_rotation_threshold",
                default_head_rotation_threshold() as f64,
            )?
            .set_default(
                "analyzer.gaze_down_threshold",
                default_gaze_down_threshold() as f64,
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.stop_timeout_seconds",
                default_stop_timeout_seconds(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // PROCTORCAM__CAMERA__COUNT=3 style overrides
            .add_source(
                Environment::with_prefix("PROCTORCAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ProctorConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.count == 0 {
            return Err(ConfigError::Message(
                "Camera count must be greater than 0".to_string(),
            ));
        }

        if !self.camera.indices.is_empty() && self.camera.indices.len() != self.camera.count as usize
        {
            return Err(ConfigError::Message(format!(
                "Camera indices list has {} entries but count is {}",
                self.camera.indices.len(),
                self.camera.count
            )));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.capture.snapshot_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Capture snapshot_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be within 1..=100".to_string(),
            ));
        }

        if self.analyzer.cycle_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Analyzer cycle_interval_ms must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("movement_threshold", self.analyzer.movement_threshold),
            (
                "head_rotation_threshold",
                self.analyzer.head_rotation_threshold,
            ),
            ("gaze_down_threshold", self.analyzer.gaze_down_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Message(format!(
                    "Analyzer {} must be within (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                count: default_camera_count(),
                indices: Vec::new(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                read_timeout_ms: default_read_timeout_ms(),
            },
            capture: CaptureConfig {
                cycle_interval_ms: default_capture_cycle_interval_ms(),
                snapshot_interval_seconds: default_snapshot_interval_seconds(),
                snapshot_path: default_snapshot_path(),
                snapshot_timezone: default_snapshot_timezone(),
                jpeg_quality: default_jpeg_quality(),
            },
            analyzer: AnalyzerConfig {
                cycle_interval_ms: default_analyzer_cycle_interval_ms(),
                movement_threshold: default_movement_threshold(),
                head_rotation_threshold: default_head_rotation_threshold(),
                gaze_down_threshold: default_gaze_down_threshold(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                stop_timeout_seconds: default_stop_timeout_seconds(),
            },
        }
    }
}

// Default value functions
fn default_camera_count() -> u32 {
    2
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_capture_cycle_interval_ms() -> u64 {
    33
}
fn default_snapshot_interval_seconds() -> u64 {
    30
}
fn default_snapshot_path() -> String {
    "uploads/snapshots".to_string()
}
fn default_snapshot_timezone() -> String {
    "UTC".to_string()
}
fn default_jpeg_quality() -> u8 {
    85
}

fn default_analyzer_cycle_interval_ms() -> u64 {
    100
}
fn default_movement_threshold() -> f32 {
    0.1
}
fn default_head_rotation_threshold() -> f32 {
    0.3
}
fn default_gaze_down_threshold() -> f32 {
    0.7
}

fn default_event_bus_capacity() -> usize {
    64
}
fn default_stop_timeout_seconds() -> u64 {
    5
}
