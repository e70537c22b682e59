use crate::error::StorageError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Durable blob store for snapshot images
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `bytes` under `key`. Keys are written once.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Snapshot store writing one file per key under a base directory
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    base_path: PathBuf,
}

impl FsSnapshotStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path a key would be stored at
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn validate_key(key: &str) -> Result<(), StorageError> {
        let invalid = key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.starts_with('.');

        if invalid {
            return Err(StorageError::Write {
                key: key.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "snapshot key must be a plain file name",
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        Self::validate_key(key)?;

        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            fs::create_dir_all(&self.base_path).await.map_err(|e| {
                StorageError::DirectoryCreation {
                    path: self.base_path.display().to_string(),
                    source: e,
                }
            })?;
            info!("Created snapshot directory: {}", self.base_path.display());
        }

        let path = self.path_for(key);
        let write_err = |source: std::io::Error| StorageError::Write {
            key: key.to_string(),
            source,
        };

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(&bytes).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        debug!("Wrote snapshot {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// In-memory snapshot store, mainly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn keys(&self) -> Vec<String> {
        self.blobs.lock().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let write_err = |kind, message: &str| StorageError::Write {
            key: key.to_string(),
            source: std::io::Error::new(kind, message.to_string()),
        };

        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(write_err(
                std::io::ErrorKind::Other,
                "memory store configured to fail",
            ));
        }

        let mut blobs = self.blobs.lock();
        if blobs.contains_key(key) {
            return Err(write_err(
                std::io::ErrorKind::AlreadyExists,
                "snapshot already stored",
            ));
        }
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }
}

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid snapshot timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Storage key for a snapshot: `{candidate_id}_{YYYYMMDD_HHMMSS}.jpg`
pub fn snapshot_key(candidate_id: &str, timestamp: SystemTime, tz: &Tz) -> String {
    let datetime: DateTime<Utc> = timestamp.into();
    let local = datetime.with_timezone(tz);
    format!("{}_{}.jpg", candidate_id, local.format("%Y%m%d_%H%M%S"))
}

/// JPEG bytes for a frame, encoding raw formats at `quality`
pub fn encode_snapshot(frame: &FrameData, key: &str, quality: u8) -> Result<Vec<u8>, StorageError> {
    let encode_err = |details: String| StorageError::Encode {
        key: key.to_string(),
        details,
    };

    if !frame.validate_size() {
        return Err(encode_err(format!(
            "frame {} has {} bytes, unexpected for {:?} {}x{}",
            frame.id,
            frame.data.len(),
            frame.format,
            frame.width,
            frame.height
        )));
    }

    let rgb = match frame.format {
        FrameFormat::Mjpeg => return Ok(frame.data.as_ref().clone()),
        FrameFormat::Rgb24 => frame.data.as_ref().clone(),
        FrameFormat::Yuyv => yuyv_to_rgb24(&frame.data),
    };

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder
        .encode(&rgb, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| encode_err(e.to_string()))?;

    Ok(jpeg)
}

/// Convert packed YUYV 4:2:2 to RGB24 (BT.601)
fn yuyv_to_rgb24(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

    for chunk in yuyv.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;
            rgb.push(r.clamp(0.0, 255.0) as u8);
            rgb.push(g.clamp(0.0, 255.0) as u8);
            rgb.push(b.clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}
