use thiserror::Error;

/// Errors that can occur while opening a duplication session or capturing frames.
///
/// Status codes are the raw HRESULT (or backend equivalent) and are rendered in hex.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("failed to enumerate {what}: error code {code:#x}")]
    EnumerationFailed { what: &'static str, code: u32 },

    #[error("failed to create capture device: error code {0:#x}")]
    DeviceCreationFailed(u32),

    #[error("no device found (adapter index {0})")]
    AdapterNotFound(usize),

    #[error("no screen found (output index {0})")]
    OutputNotFound(usize),

    #[error("output duplication interface unsupported: error code {0:#x}")]
    InterfaceUnsupported(u32),

    #[error("failed to duplicate output: error code {0:#x}")]
    DuplicationFailed(u32),

    #[error("timed out waiting for the next frame")]
    AcquireTimeout,

    #[error("failed to acquire next frame: error code {0:#x}")]
    AcquireFailed(u32),

    #[error("failed to decode frame: {0}")]
    FrameDecodeFailed(String),

    #[error("capture session is not open")]
    SessionClosed,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("capture worker is not running")]
    WorkerUnavailable,
}

impl CaptureError {
    /// The acquire call returned without a new frame inside its wait window.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout)
    }

    /// The requested adapter or output index was not in the enumerated list.
    pub fn is_selection_out_of_range(&self) -> bool {
        matches!(self, Self::AdapterNotFound(_) | Self::OutputNotFound(_))
    }
}
