use serde::{Deserialize, Serialize};

use super::device::{AdapterInfo, OutputInfo};
use super::geometry::CropRect;

/// Counters kept by the capture loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureDiagnostics {
    pub frames_published: u64,
    pub timeouts: u64,
    /// Acquired frames without a new presentation timestamp.
    pub duplicate_frames: u64,
    pub decode_failures: u64,
    pub fatal_acquire_failures: u64,
    pub reopen_attempts: u64,
    /// Running average of the acquire→publish time, in milliseconds.
    pub average_frame_ms: Option<f64>,
    /// Last computed pacing budget in milliseconds (may be negative).
    pub last_sleep_budget_ms: Option<f64>,
}

/// Snapshot of everything the controller exposes, for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub adapters: Vec<AdapterInfo>,
    pub outputs: Vec<OutputInfo>,
    pub adapter_index: usize,
    pub output_index: usize,
    pub crop: CropRect,
    pub frame_rate: u32,
    pub timeout_ms: u32,
    pub capture_enabled: bool,
    pub state: String,
    pub last_error: Option<String>,
    pub diagnostics: CaptureDiagnostics,
}

impl CaptureStatus {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
