use super::error::CaptureError;

/// Capture controller state machine.
///
/// State transitions:
/// ```text
/// idle ⇄ ready → capturing ⇄ recovering
///          ↑         ↓           ↓
///          └──── (stop)      failed (capped recovery only)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    /// No session is open.
    Idle,
    /// A session is open and capture is disabled.
    Ready,
    Capturing,
    /// The loop is re-opening the session after a fatal acquire failure.
    Recovering { attempts: u32 },
    /// A capped recovery policy gave up; capture was disabled.
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self, Self::Recovering { .. })
    }

    /// Whether the capture loop is currently active on the capture thread.
    pub fn is_running(&self) -> bool {
        self.is_capturing() || self.is_recovering()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Capturing => "capturing",
            Self::Recovering { .. } => "recovering",
            Self::Failed(_) => "failed",
        }
    }
}
