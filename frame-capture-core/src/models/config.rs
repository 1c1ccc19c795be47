use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::Selection;
use super::geometry::{CropRect, Size};

/// Default target capture rate in frames per second.
pub const DEFAULT_FRAME_RATE: u32 = 120;

/// Default wait for the next frame, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 50;

/// How the capture loop re-opens a session after a fatal acquire failure.
///
/// The default retries forever with no pause between attempts. A backoff
/// or an attempt cap can be set by hosts that prefer not to spin on
/// permanently lost hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Pause between failed re-open attempts.
    pub backoff_ms: Option<u64>,
    /// Give up (and disable capture) after this many failed attempts.
    pub max_attempts: Option<u32>,
}

impl RecoveryPolicy {
    pub fn backoff(&self) -> Option<Duration> {
        self.backoff_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    pub fn gives_up_after(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Capture configuration shared between the controller and the capture thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Adapter to duplicate from (default: 0).
    pub adapter_index: usize,

    /// Output of that adapter to duplicate (default: 0).
    pub output_index: usize,

    /// Target capture rate in frames per second (default: 120).
    pub frame_rate: u32,

    /// Wait for the next frame in milliseconds (default: 50).
    pub timeout_ms: u32,

    /// Region kept from each captured frame (default: full virtual desktop).
    pub crop: CropRect,

    /// Whether the capture loop should be running.
    pub capture_enabled: bool,

    pub recovery: RecoveryPolicy,
}

impl CaptureConfig {
    /// Defaults with the crop covering the whole virtual desktop.
    pub fn for_desktop(bounds: Size) -> Self {
        Self {
            crop: CropRect::full(bounds),
            ..Self::default()
        }
    }

    pub fn selection(&self) -> Selection {
        Selection::new(self.adapter_index, self.output_index)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 {
            return Err("frame rate must be positive".into());
        }
        if self.timeout_ms == 0 {
            return Err("timeout must be positive".into());
        }
        if self.crop.is_empty() {
            return Err(format!(
                "crop rectangle is empty: {}x{}",
                self.crop.width, self.crop.height
            ));
        }
        Ok(())
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            output_index: 0,
            frame_rate: DEFAULT_FRAME_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            crop: CropRect::default(),
            capture_enabled: false,
            recovery: RecoveryPolicy::default(),
        }
    }
}
